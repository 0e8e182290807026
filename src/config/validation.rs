use super::{Config, EmbeddingProviderKind};
use anyhow::Result;
use tracing::warn;

/// Validation errors for configuration.
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

fn error(path: &str, message: &str) -> ConfigValidationError {
    ConfigValidationError {
        path: path.to_string(),
        message: message.to_string(),
    }
}

/// Validate a configuration object.
pub fn validate_config(config: &Config) -> Vec<ConfigValidationError> {
    let mut errors = Vec::new();

    if config.server.port == 0 {
        errors.push(error("server.port", "Port must be greater than 0"));
    }

    if config.memory.chunk_tokens == 0 {
        errors.push(error(
            "memory.chunkTokens",
            "Chunk size must be at least one token",
        ));
    }

    if config.memory.context_memories == 0 {
        errors.push(error(
            "memory.contextMemories",
            "At least one context memory is required",
        ));
    }

    if config.memory.embedding.dimensions == Some(0) {
        errors.push(error(
            "memory.embedding.dimensions",
            "Embedding dimensions must be greater than 0",
        ));
    }

    if config.generation.max_tokens == 0 {
        errors.push(error(
            "generation.maxTokens",
            "Answer length limit must be greater than 0",
        ));
    }

    if !(0.0..=2.0).contains(&config.generation.temperature) {
        errors.push(error(
            "generation.temperature",
            "Temperature must be between 0 and 2",
        ));
    }

    if config.openai.base_url.trim().is_empty() {
        errors.push(error("openai.baseUrl", "OpenAI base URL is required"));
    }

    // Missing credentials only warn here: `store` with local embeddings works
    // without them, and the commands that need them fail on first use.
    if config.openai.api_key.is_none() {
        if config.memory.embedding.provider == EmbeddingProviderKind::Openai {
            warn!("OpenAI embeddings selected but OPENAI_API_KEY is not set");
        } else {
            warn!("OPENAI_API_KEY is not set; queries and transcription are unavailable");
        }
    }

    errors
}

/// Validate configuration and return Result.
pub fn validate_config_object(config: &Config) -> Result<()> {
    let errors = validate_config(config);
    if errors.is_empty() {
        Ok(())
    } else {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        anyhow::bail!("Configuration validation failed:\n{}", messages.join("\n"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&Config::default()).is_empty());
    }

    #[test]
    fn test_reports_every_invalid_field() {
        let mut config = Config::default();
        config.server.port = 0;
        config.memory.chunk_tokens = 0;
        config.memory.context_memories = 0;
        config.memory.embedding.dimensions = Some(0);
        config.generation.max_tokens = 0;
        config.generation.temperature = 3.5;
        config.openai.base_url = " ".into();

        let paths: Vec<String> = validate_config(&config).into_iter().map(|e| e.path).collect();
        assert_eq!(
            paths,
            vec![
                "server.port",
                "memory.chunkTokens",
                "memory.contextMemories",
                "memory.embedding.dimensions",
                "generation.maxTokens",
                "generation.temperature",
                "openai.baseUrl",
            ]
        );
    }

    #[test]
    fn test_validate_config_object_joins_messages() {
        let mut config = Config::default();
        config.memory.chunk_tokens = 0;
        let err = validate_config_object(&config).unwrap_err().to_string();
        assert!(err.contains("memory.chunkTokens: Chunk size must be at least one token"));
    }
}
