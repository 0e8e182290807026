mod defaults;
mod types;
mod validation;

pub use defaults::*;
pub use types::*;
pub use validation::*;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level LLM Notepad configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub transcription: TranscriptionConfig,
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,

    /// State directory for persistent data.
    #[serde(skip)]
    pub state_dir: PathBuf,

    /// File the configuration was read from, if any.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Config {
    /// Load configuration from file, environment, and defaults.
    ///
    /// An explicit `path` must exist; otherwise the standard locations are
    /// searched and defaults are used when none is found.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_path = match path {
            Some(p) => {
                let p = PathBuf::from(p);
                if !p.exists() {
                    anyhow::bail!("Config file '{}' does not exist", p.display());
                }
                Some(p)
            }
            None => find_config_file(),
        };

        let mut config = match &config_path {
            Some(p) => load_config_file(p)?,
            None => Config::default(),
        };
        config.source = config_path;

        // Apply environment variable overrides
        config.apply_env_overrides();

        // Resolve state directory
        config.state_dir = resolve_state_dir();

        Ok(config)
    }

    /// Write default configuration to a file.
    pub fn write_default(path: &str) -> Result<()> {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write config to '{path}'"))?;
        Ok(())
    }

    /// Location of the vector database.
    pub fn db_path(&self) -> PathBuf {
        self.memory
            .db_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.state_dir.join(DEFAULT_DB_FILE))
    }

    /// Apply environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(key) = var("OPENAI_API_KEY").filter(|k| !k.is_empty()) {
            self.openai.api_key = Some(key);
        }

        if let Some(url) = var("OPENAI_BASE_URL").filter(|u| !u.is_empty()) {
            self.openai.base_url = url;
        }

        if let Some(host) = var("NOTEPAD_HOST") {
            self.server.host = host;
        }

        if let Some(port) = var("NOTEPAD_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }

        if let Some(path) = var("NOTEPAD_DB_PATH") {
            self.memory.db_path = Some(path);
        }

        if let Some(kind) = var("NOTEPAD_EMBEDDING_PROVIDER").and_then(|k| k.parse().ok()) {
            self.memory.embedding.provider = kind;
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            memory: MemoryConfig::default(),
            generation: GenerationConfig::default(),
            transcription: TranscriptionConfig::default(),
            openai: OpenAiConfig::default(),
            logging: LoggingConfig::default(),
            state_dir: resolve_state_dir(),
            source: None,
        }
    }
}

/// Find the configuration file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    let candidates = [
        PathBuf::from("notepad.json"),
        PathBuf::from("notepad.yaml"),
        PathBuf::from("notepad.yml"),
        PathBuf::from("notepad.toml"),
    ];

    for path in &candidates {
        if path.exists() {
            return Some(path.clone());
        }
    }

    // Check home directory
    if let Some(home) = dirs::home_dir() {
        let home_config = home.join(".llm-notepad").join("config.json");
        if home_config.exists() {
            return Some(home_config);
        }
    }

    None
}

/// Resolve the state directory for persistent data.
fn resolve_state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("NOTEPAD_STATE_DIR") {
        return PathBuf::from(dir);
    }

    dirs::home_dir()
        .map(|h| h.join(".llm-notepad"))
        .unwrap_or_else(|| PathBuf::from(".llm-notepad"))
}

/// Load configuration from a file path.
fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config(&content, path.extension().and_then(|e| e.to_str()))
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

/// Parse configuration text; the extension picks the format (JSON5 default).
fn parse_config(content: &str, extension: Option<&str>) -> Result<Config> {
    let config = match extension {
        Some("yaml") | Some("yml") => serde_yaml::from_str(content)?,
        Some("toml") => toml::from_str(content)?,
        _ => {
            // Try JSON5 first, then regular JSON
            json5::from_str(content).or_else(|_| {
                serde_json::from_str(content).map_err(|e| json5::Error::Message {
                    msg: e.to_string(),
                    location: None,
                })
            })?
        }
    };

    Ok(config)
}
