//! Wiring of the memory core and its external services from configuration.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::Config;
use crate::media::{OpenAiTranscriber, Transcriber};
use crate::memory::{
    create_provider, Chunker, GenerationSettings, MemoryAssistant, MemoryStore, SqliteVectorStore,
};
use crate::providers::resolve_provider;

/// Everything a command or the API server needs, built once.
///
/// Generation and transcription are optional: without an OpenAI key the
/// notepad can still store and search with local embeddings.
#[derive(Clone)]
pub struct App {
    pub store: MemoryStore,
    pub assistant: Option<MemoryAssistant>,
    pub transcriber: Option<Arc<dyn Transcriber>>,
    pub search_results: usize,
    pub context_memories: usize,
}

impl App {
    pub fn open(config: &Config) -> Result<Self> {
        let embedder = create_provider(config)?;
        let db_path = config.db_path();
        let vectors = SqliteVectorStore::open(&db_path, embedder)
            .with_context(|| format!("Failed to open memory database '{}'", db_path.display()))?;
        let chunker = Chunker::new(config.memory.chunk_tokens)?;
        let store = MemoryStore::new(chunker, Arc::new(vectors));

        let assistant = match resolve_provider(config) {
            Ok(provider) => Some(MemoryAssistant::new(
                store.clone(),
                Arc::from(provider),
                GenerationSettings {
                    model: config.generation.model.clone(),
                    max_tokens: config.generation.max_tokens,
                    temperature: config.generation.temperature,
                },
            )),
            Err(e) => {
                warn!(error = %e, "answer generation disabled");
                None
            }
        };

        let transcriber = match OpenAiTranscriber::from_config(config) {
            Ok(t) => Some(Arc::new(t) as Arc<dyn Transcriber>),
            Err(e) => {
                warn!(error = %e, "audio transcription disabled");
                None
            }
        };

        info!(
            db = %db_path.display(),
            chunk_tokens = config.memory.chunk_tokens,
            generation = assistant.is_some(),
            transcription = transcriber.is_some(),
            "notepad ready"
        );

        Ok(Self {
            store,
            assistant,
            transcriber,
            search_results: config.memory.search_results,
            context_memories: config.memory.context_memories,
        })
    }

    /// The assistant, or an error explaining why queries are unavailable.
    pub fn assistant(&self) -> Result<&MemoryAssistant> {
        self.assistant
            .as_ref()
            .context("Answer generation requires an OpenAI API key (OPENAI_API_KEY)")
    }
}
