use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::{Config, EmbeddingProviderKind};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A provider that turns text into dense vector embeddings.
///
/// The vector store owns its provider; callers never choose embeddings.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Compute embeddings for a batch of texts.
    ///
    /// Returns one vector per input text, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// The model identifier used by this provider (e.g. `text-embedding-3-small`).
    fn model_name(&self) -> String;
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Create the embedding provider selected by `memory.embedding.provider`.
///
/// The OpenAI provider needs an API key; its absence is a configuration
/// error.
pub fn create_provider(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedding = &config.memory.embedding;
    match embedding.provider {
        EmbeddingProviderKind::Openai => {
            let api_key = config
                .openai
                .api_key
                .clone()
                .context("OpenAI embeddings selected but no OpenAI API key is configured")?;
            Ok(Arc::new(
                OpenAiEmbeddingProvider::new(api_key, Some(embedding.model.clone()))
                    .with_base_url(config.openai.base_url.clone())
                    .with_dimensions(embedding.dimensions),
            ))
        }
        EmbeddingProviderKind::Local => {
            Ok(Arc::new(HashingEmbeddingProvider::new(embedding.dimensions)))
        }
    }
}

// ---------------------------------------------------------------------------
// OpenAI
// ---------------------------------------------------------------------------

/// Calls the OpenAI `/embeddings` endpoint.
pub struct OpenAiEmbeddingProvider {
    api_key: String,
    base_url: String,
    model: String,
    dimensions: Option<usize>,
    client: reqwest::Client,
}

impl OpenAiEmbeddingProvider {
    pub fn new(api_key: String, model: Option<String>) -> Self {
        Self {
            api_key,
            base_url: "https://api.openai.com/v1".to_string(),
            model: model.unwrap_or_else(|| "text-embedding-3-small".to_string()),
            dimensions: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Request shortened vectors (supported by the `text-embedding-3` models).
    pub fn with_dimensions(mut self, dimensions: Option<usize>) -> Self {
        self.dimensions = dimensions;
        self
    }
}

#[derive(Serialize)]
struct OpenAiEmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingData>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = OpenAiEmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.dimensions,
        };

        let resp = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI embeddings error ({}): {}", status, text);
        }

        let mut data = resp.json::<OpenAiEmbeddingResponse>().await?.data;
        if data.len() != texts.len() {
            anyhow::bail!(
                "OpenAI returned {} embeddings for {} inputs",
                data.len(),
                texts.len()
            );
        }
        data.sort_by_key(|d| d.index);

        Ok(data.into_iter().map(|d| d.embedding).collect())
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }
}

// ---------------------------------------------------------------------------
// Local
// ---------------------------------------------------------------------------

/// Offline provider based on the hashing trick.
///
/// Each lowercase word is hashed into one of `dimensions` buckets with a
/// hash-derived sign and the result is L2-normalised. Texts sharing words
/// end up close under cosine distance. No model, no network, fully
/// deterministic across runs.
pub struct HashingEmbeddingProvider {
    dimensions: usize,
}

impl HashingEmbeddingProvider {
    pub fn new(dimensions: Option<usize>) -> Self {
        Self {
            dimensions: dimensions.unwrap_or(384).max(1),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let digest = Sha256::digest(word.to_lowercase().as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let index = (u64::from_le_bytes(bucket) % self.dimensions as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn model_name(&self) -> String {
        format!("local-hashing-{}", self.dimensions)
    }
}
