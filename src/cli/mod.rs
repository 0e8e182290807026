use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "llm-notepad", version, about = "Personal memory notepad backed by an LLM")]
pub struct Cli {
    /// Path to a configuration file.
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API server.
    Serve(ServeOpts),
    /// Store a piece of text as one or more memories.
    Store(StoreOpts),
    /// Ask a question answered from stored memories.
    Query(QueryOpts),
    /// Print the memories most similar to a query.
    Search(SearchOpts),
    /// Print the number of stored memories.
    Count,
    /// Read queries and `/store` commands from stdin.
    Interactive,
    /// Inspect or create configuration.
    Config(ConfigOpts),
    Version,
}

#[derive(clap::Args)]
pub struct ServeOpts {
    #[arg(long)]
    pub host: Option<String>,
    #[arg(short, long)]
    pub port: Option<u16>,
}

#[derive(clap::Args)]
pub struct StoreOpts {
    pub text: String,
    /// Tag to attach; repeatable.
    #[arg(short, long = "tag")]
    pub tags: Vec<String>,
}

#[derive(clap::Args)]
pub struct QueryOpts {
    pub query: String,
    /// Print the retrieved memories instead of asking the model.
    #[arg(long)]
    pub raw: bool,
    /// Number of memories to use as context.
    #[arg(short = 'k', long)]
    pub max_memories: Option<usize>,
}

#[derive(clap::Args)]
pub struct SearchOpts {
    pub query: String,
    #[arg(short = 'k', long)]
    pub n_results: Option<usize>,
}

#[derive(clap::Args)]
pub struct ConfigOpts {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    Show,
    Validate,
    Init,
}

/// What a line typed in interactive mode asks for.
#[derive(Debug, PartialEq, Eq)]
pub enum InteractiveCommand<'a> {
    Store(&'a str),
    Query(&'a str),
    Quit,
    Empty,
}

pub fn parse_interactive_line(line: &str) -> InteractiveCommand<'_> {
    let line = line.trim();
    if line.is_empty() {
        return InteractiveCommand::Empty;
    }
    if matches!(
        line.to_ascii_lowercase().as_str(),
        "/quit" | "/exit" | "quit" | "exit"
    ) {
        return InteractiveCommand::Quit;
    }
    match line.strip_prefix("/store") {
        Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => {
            InteractiveCommand::Store(rest.trim())
        }
        _ => InteractiveCommand::Query(line),
    }
}

/// One-line summary of a store: the count plus the first three IDs.
pub fn format_stored_ids(ids: &[String]) -> String {
    let shown = ids.iter().take(3).cloned().collect::<Vec<_>>().join(", ");
    let more = if ids.len() > 3 { "..." } else { "" };
    format!("Stored memory in {} chunks with IDs: {shown}{more}", ids.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_store_command() {
        let cli = Cli::try_parse_from([
            "llm-notepad",
            "store",
            "buy milk",
            "--tag",
            "errand",
            "-t",
            "home",
        ])
        .unwrap();
        match cli.command {
            Commands::Store(opts) => {
                assert_eq!(opts.text, "buy milk");
                assert_eq!(opts.tags, vec!["errand", "home"]);
            }
            _ => panic!("expected store"),
        }
    }

    #[test]
    fn test_parse_query_with_global_config() {
        let cli = Cli::try_parse_from([
            "llm-notepad",
            "query",
            "what to buy?",
            "-k",
            "2",
            "--raw",
            "--config",
            "notepad.toml",
        ])
        .unwrap();
        assert_eq!(cli.config.as_deref(), Some("notepad.toml"));
        match cli.command {
            Commands::Query(opts) => {
                assert!(opts.raw);
                assert_eq!(opts.max_memories, Some(2));
            }
            _ => panic!("expected query"),
        }
    }

    #[test]
    fn test_interactive_lines() {
        assert_eq!(
            parse_interactive_line("/store  remember this "),
            InteractiveCommand::Store("remember this")
        );
        assert_eq!(parse_interactive_line("/exit"), InteractiveCommand::Quit);
        assert_eq!(parse_interactive_line("/quit"), InteractiveCommand::Quit);
        assert_eq!(parse_interactive_line("EXIT"), InteractiveCommand::Quit);
        assert_eq!(parse_interactive_line("   "), InteractiveCommand::Empty);
        assert_eq!(
            parse_interactive_line("/storefront hours?"),
            InteractiveCommand::Query("/storefront hours?")
        );
        assert_eq!(
            parse_interactive_line("what did I store?"),
            InteractiveCommand::Query("what did I store?")
        );
    }

    #[test]
    fn test_format_stored_ids() {
        let ids: Vec<String> = (1..=5).map(|i| format!("id{i}")).collect();
        assert_eq!(
            format_stored_ids(&ids),
            "Stored memory in 5 chunks with IDs: id1, id2, id3..."
        );
        assert_eq!(
            format_stored_ids(&ids[..2]),
            "Stored memory in 2 chunks with IDs: id1, id2"
        );
        assert_eq!(format_stored_ids(&[]), "Stored memory in 0 chunks with IDs: ");
    }
}
