use clap::Parser;
use llm_notepad::api::ApiServer;
use llm_notepad::app::App;
use llm_notepad::cli::{
    format_stored_ids, parse_interactive_line, Cli, Commands, ConfigAction, InteractiveCommand,
};
use llm_notepad::config::{validate_config_object, Config};
use llm_notepad::logging;
use llm_notepad::memory::Metadata;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if let Commands::Version = cli.command {
        println!("llm-notepad {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = Config::load(cli.config.as_deref())?;
    logging::init(&config.logging);
    if let Some(source) = &config.source {
        info!("Loaded configuration from {}", source.display());
    }

    if let Commands::Config(opts) = &cli.command {
        match opts.action {
            ConfigAction::Show => {
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
            ConfigAction::Validate => {
                validate_config_object(&config)?;
                println!("Configuration is valid");
            }
            ConfigAction::Init => {
                let path = cli.config.as_deref().unwrap_or("notepad.json");
                Config::write_default(path)?;
                println!("Configuration file created at {path}");
            }
        }
        return Ok(());
    }

    validate_config_object(&config)?;

    match cli.command {
        Commands::Serve(opts) => {
            info!("Starting LLM Notepad API server");
            let server = ApiServer::start(config, &opts).await?;
            server.run_until_shutdown().await?;
        }
        Commands::Store(opts) => {
            let app = App::open(&config)?;
            let metadata = tags_metadata(&opts.tags);
            let ids = app.store.store_memory(&opts.text, metadata.as_ref()).await?;
            println!("{}", format_stored_ids(&ids));
        }
        Commands::Query(opts) => {
            let app = App::open(&config)?;
            if opts.raw {
                let k = opts.max_memories.unwrap_or(app.search_results);
                let memories = app.store.search_memories(&opts.query, k).await?;
                println!("Relevant memories:");
                for (i, memory) in memories.iter().enumerate() {
                    println!("\n{}. {}", i + 1, memory.content);
                    let tags = memory.tags();
                    if !tags.is_empty() {
                        println!("   Tags: {}", tags.join(", "));
                    }
                }
            } else {
                let k = opts.max_memories.unwrap_or(app.context_memories);
                let answer = app.assistant()?.query_with_context(&opts.query, k).await?;
                println!("{answer}");
            }
        }
        Commands::Search(opts) => {
            let app = App::open(&config)?;
            let k = opts.n_results.unwrap_or(app.search_results);
            let memories = app.store.search_memories(&opts.query, k).await?;
            println!("{}", serde_json::to_string_pretty(&memories)?);
        }
        Commands::Count => {
            let app = App::open(&config)?;
            println!("{}", app.store.count().await?);
        }
        Commands::Interactive => {
            let app = App::open(&config)?;
            run_interactive(&app).await?;
        }
        Commands::Config(_) | Commands::Version => {}
    }

    Ok(())
}

/// `{"tags": [...]}` when any tags were given.
fn tags_metadata(tags: &[String]) -> Option<Metadata> {
    if tags.is_empty() {
        return None;
    }
    let mut metadata = Metadata::new();
    metadata.insert(
        "tags".into(),
        Value::Array(tags.iter().cloned().map(Value::String).collect()),
    );
    Some(metadata)
}

async fn run_interactive(app: &App) -> anyhow::Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("LLM Notepad Interactive Mode");
    println!("Commands: /store <text>, /quit");
    println!("{}", "-".repeat(40));

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_interactive_line(&line) {
            InteractiveCommand::Quit => break,
            InteractiveCommand::Empty => {}
            InteractiveCommand::Store(text) => match app.store.store_memory(text, None).await {
                Ok(ids) => println!("Stored memory ({} chunks)", ids.len()),
                Err(e) => error!("Failed to store memory: {e}"),
            },
            InteractiveCommand::Query(query) => {
                let answer = match app.assistant() {
                    Ok(assistant) => assistant
                        .query_with_context(query, app.context_memories)
                        .await
                        .map_err(anyhow::Error::from),
                    Err(e) => Err(e),
                };
                match answer {
                    Ok(answer) => println!("\n{answer}\n"),
                    Err(e) => error!("Query failed: {e:#}"),
                }
            }
        }
    }

    Ok(())
}
