use crate::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured level. Output goes to stderr so CLI
/// results on stdout stay machine-readable; `NOTEPAD_LOG_FORMAT=json` or
/// `logging.json` switches to JSON lines.
pub fn init(config: &LoggingConfig) {
    let default_directive = format!("llm_notepad={}", config.level.as_str());
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let json = config.json
        || std::env::var("NOTEPAD_LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
