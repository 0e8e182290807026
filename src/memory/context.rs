use std::fmt::Write as _;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::providers::{ModelProvider, ProviderMessage, ProviderRequest};

use super::error::{MemoryError, Result};
use super::store::MemoryStore;
use super::types::MemoryRecord;

/// First line of every context block.
pub const CONTEXT_HEADER: &str = "Relevant memories:";

/// Shown in place of a memory's timestamp when it has none.
pub const UNKNOWN_TIME: &str = "Unknown time";

/// Instruction that keeps answers grounded in the supplied memories.
pub const SYSTEM_PROMPT: &str = "You are the user's personal AI memory assistant. \
Answer questions directly and factually using the provided context. \
Don't be overly conversational or mention that you're using memories - \
just provide the information requested. \
If you don't have enough information to answer the question, say so clearly.";

/// Render retrieved memories as the context block of the prompt.
pub fn build_context(memories: &[MemoryRecord]) -> String {
    let mut context = format!("{CONTEXT_HEADER}\n");
    for memory in memories {
        let timestamp = memory.timestamp().unwrap_or(UNKNOWN_TIME);
        let _ = writeln!(context, "- {} (stored at {})", memory.content, timestamp);
    }
    context
}

/// The two-message prompt: fixed system instruction, then context and query.
pub fn build_messages(context: &str, query: &str) -> Vec<ProviderMessage> {
    vec![
        ProviderMessage::system(SYSTEM_PROMPT),
        ProviderMessage::user(format!("{context}\n\nUser query: {query}")),
    ]
}

/// Sampling parameters for the grounded answer.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub model: String,
    pub max_tokens: u64,
    pub temperature: f64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo".to_string(),
            max_tokens: 500,
            temperature: 0.7,
        }
    }
}

/// An answer together with the memories it was grounded on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundedAnswer {
    pub answer: String,
    pub memories: Vec<MemoryRecord>,
}

/// Answers questions from stored memories through a language model.
#[derive(Clone)]
pub struct MemoryAssistant {
    store: MemoryStore,
    provider: Arc<dyn ModelProvider>,
    settings: GenerationSettings,
}

impl MemoryAssistant {
    pub fn new(
        store: MemoryStore,
        provider: Arc<dyn ModelProvider>,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            store,
            provider,
            settings,
        }
    }

    /// Answer `query` using at most `max_context_memories` retrieved memories.
    ///
    /// The model's text is returned as is. With no relevant memories the
    /// prompt carries only the context header and the model is expected to
    /// say it lacks the information.
    pub async fn query_with_context(
        &self,
        query: &str,
        max_context_memories: usize,
    ) -> Result<String> {
        Ok(self.answer(query, max_context_memories).await?.answer)
    }

    /// Like [`MemoryAssistant::query_with_context`], also returning the
    /// memories placed in the prompt.
    pub async fn answer(&self, query: &str, max_context_memories: usize) -> Result<GroundedAnswer> {
        let memories = self
            .store
            .search_memories(query, max_context_memories)
            .await?;

        let context = build_context(&memories);
        debug!(memories = memories.len(), context_chars = context.len(), "assembled context");

        let request = ProviderRequest {
            model: self.settings.model.clone(),
            messages: build_messages(&context, query),
            max_tokens: Some(self.settings.max_tokens),
            temperature: Some(self.settings.temperature),
        };

        let response = self
            .provider
            .chat(request)
            .await
            .map_err(MemoryError::Generation)?;

        info!(
            provider = self.provider.name(),
            model = %self.settings.model,
            memories = memories.len(),
            output_tokens = ?response.usage.output_tokens,
            "answered query"
        );

        Ok(GroundedAnswer {
            answer: response.content_text(),
            memories,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::chunking::Chunker;
    use crate::memory::embeddings::HashingEmbeddingProvider;
    use crate::memory::types::Metadata;
    use crate::memory::vector_store::SqliteVectorStore;
    use crate::providers::{ProviderResponse, TokenUsage};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    /// Replies with a canned answer and keeps the last request.
    struct ScriptedProvider {
        reply: std::result::Result<String, String>,
        last: Mutex<Option<ProviderRequest>>,
    }

    impl ScriptedProvider {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                last: Mutex::new(None),
            })
        }

        fn failing(error: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(error.to_string()),
                last: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl ModelProvider for ScriptedProvider {
        async fn chat(&self, request: ProviderRequest) -> anyhow::Result<ProviderResponse> {
            *self.last.lock() = Some(request);
            match &self.reply {
                Ok(text) => Ok(ProviderResponse {
                    content: vec![text.clone()],
                    stop_reason: Some("stop".into()),
                    usage: TokenUsage::default(),
                }),
                Err(e) => Err(anyhow::anyhow!(e.clone())),
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn record(content: &str, metadata: serde_json::Value) -> MemoryRecord {
        MemoryRecord {
            id: "id".into(),
            content: content.into(),
            metadata: metadata.as_object().cloned().unwrap(),
            distance: Some(0.2),
        }
    }

    fn memory_store() -> MemoryStore {
        let vectors =
            SqliteVectorStore::open_in_memory(Arc::new(HashingEmbeddingProvider::new(None)))
                .unwrap();
        MemoryStore::new(Chunker::new(500).unwrap(), Arc::new(vectors))
    }

    #[test]
    fn test_build_context_lines() {
        let memories = vec![
            record("The sky is blue.", json!({"timestamp": "2024-06-01T09:00:00+00:00"})),
            record("Milk is in the fridge.", json!({})),
        ];
        assert_eq!(
            build_context(&memories),
            "Relevant memories:\n\
             - The sky is blue. (stored at 2024-06-01T09:00:00+00:00)\n\
             - Milk is in the fridge. (stored at Unknown time)\n"
        );
    }

    #[test]
    fn test_build_context_without_memories_is_header_only() {
        assert_eq!(build_context(&[]), "Relevant memories:\n");
    }

    #[test]
    fn test_build_messages_shape() {
        let messages = build_messages("Relevant memories:\n", "what colour is the sky?");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[0].content, SYSTEM_PROMPT);
        assert_eq!(messages[1].role, "user");
        assert_eq!(
            messages[1].content,
            "Relevant memories:\n\n\nUser query: what colour is the sky?"
        );
    }

    #[tokio::test]
    async fn test_query_with_context_grounds_prompt() {
        let store = memory_store();
        let tags = json!({"tags": ["fact"]}).as_object().cloned().unwrap();
        store.store_memory("The sky is blue.", Some(&tags)).await.unwrap();
        store
            .store_memory("The parking spot is B12.", Some(&Metadata::new()))
            .await
            .unwrap();

        let provider = ScriptedProvider::replying("The sky is blue.");
        let assistant = MemoryAssistant::new(
            store,
            provider.clone(),
            GenerationSettings::default(),
        );

        let answer = assistant
            .answer("What colour is the sky?", 1)
            .await
            .unwrap();
        assert_eq!(answer.answer, "The sky is blue.");
        assert_eq!(answer.memories.len(), 1);
        assert_eq!(answer.memories[0].content, "The sky is blue.");

        let sent = provider.last.lock().clone().unwrap();
        assert_eq!(sent.model, "gpt-3.5-turbo");
        assert_eq!(sent.max_tokens, Some(500));
        assert_eq!(sent.temperature, Some(0.7));
        assert!(sent.messages[1].content.contains("- The sky is blue. (stored at "));
        assert!(sent.messages[1]
            .content
            .ends_with("User query: What colour is the sky?"));
    }

    #[tokio::test]
    async fn test_empty_store_still_answers() {
        let provider = ScriptedProvider::replying("I don't have enough information to answer that.");
        let assistant =
            MemoryAssistant::new(memory_store(), provider.clone(), GenerationSettings::default());

        let answer = assistant
            .query_with_context("Where did I park?", 3)
            .await
            .unwrap();
        assert!(answer.contains("enough information"));

        let sent = provider.last.lock().clone().unwrap();
        assert!(sent.messages[1].content.starts_with("Relevant memories:\n\n\nUser query:"));
    }

    #[tokio::test]
    async fn test_generation_failure_propagates() {
        let assistant = MemoryAssistant::new(
            memory_store(),
            ScriptedProvider::failing("quota exceeded"),
            GenerationSettings::default(),
        );
        let err = assistant.query_with_context("anything", 3).await.unwrap_err();
        assert!(matches!(err, MemoryError::Generation(_)));
        assert!(err.to_string().contains("quota exceeded"));
    }
}
