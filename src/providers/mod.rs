mod openai;

pub use openai::OpenAiProvider;

use crate::config::Config;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ============================================================================
// Provider Types
// ============================================================================

/// A message in a prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderMessage {
    pub role: String,
    pub content: String,
}

impl ProviderMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// A request to a model provider.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub model: String,
    pub messages: Vec<ProviderMessage>,
    pub max_tokens: Option<u64>,
    pub temperature: Option<f64>,
}

/// Token accounting reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

/// A response from a model provider.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub content: Vec<String>,
    pub stop_reason: Option<String>,
    pub usage: TokenUsage,
}

impl ProviderResponse {
    pub fn content_text(&self) -> String {
        self.content.join("")
    }
}

// ============================================================================
// Provider Trait
// ============================================================================

/// A chat-completion backend. One call, no retries.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn chat(&self, request: ProviderRequest) -> Result<ProviderResponse>;
    fn name(&self) -> &str;
}

// ============================================================================
// Provider Resolution
// ============================================================================

/// Build the chat provider described by the configuration.
pub fn resolve_provider(config: &Config) -> Result<Box<dyn ModelProvider>> {
    let api_key = config
        .openai
        .api_key
        .clone()
        .ok_or_else(|| anyhow::anyhow!("No OpenAI API key configured"))?;

    Ok(Box::new(OpenAiProvider::new(
        api_key,
        config.openai.base_url.clone(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_requires_api_key() {
        let mut config = Config::default();
        config.openai.api_key = None;
        let err = resolve_provider(&config).err().unwrap();
        assert!(err.to_string().contains("API key"));

        config.openai.api_key = Some("sk-test".into());
        assert_eq!(resolve_provider(&config).unwrap().name(), "openai");
    }

    #[test]
    fn test_content_text_joins_parts() {
        let resp = ProviderResponse {
            content: vec!["The sky ".into(), "is blue.".into()],
            stop_reason: Some("stop".into()),
            usage: TokenUsage::default(),
        };
        assert_eq!(resp.content_text(), "The sky is blue.");
    }
}
