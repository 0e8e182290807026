use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::chunking::Chunker;
use super::error::{MemoryError, Result};
use super::types::{
    validate_caller_metadata, MemoryRecord, Metadata, KEY_CHUNK_INDEX, KEY_ORIGINAL_LENGTH,
    KEY_TIMESTAMP, KEY_TOTAL_CHUNKS,
};
use super::vector_store::VectorStore;

/// Chunks notes into the vector store and reads them back by similarity.
///
/// Holds handles only; the vector store's lifetime belongs to whoever built
/// it. Cheap to clone.
#[derive(Clone)]
pub struct MemoryStore {
    chunker: Chunker,
    vectors: Arc<dyn VectorStore>,
}

impl MemoryStore {
    pub fn new(chunker: Chunker, vectors: Arc<dyn VectorStore>) -> Self {
        Self { chunker, vectors }
    }

    pub fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    /// Chunk `text` and persist every chunk, returning the new ids in chunk
    /// order.
    ///
    /// Blank text stores nothing and returns no ids. Inside other text, a
    /// window holding only whitespace is stored as an empty chunk, so there is
    /// always one id per chunker window. Chunks are written one by
    /// one without a transaction: if a write fails, the chunks before it stay
    /// stored and the error is [`MemoryError::PartialWrite`] listing their ids.
    pub async fn store_memory(
        &self,
        text: &str,
        metadata: Option<&Metadata>,
    ) -> Result<Vec<String>> {
        if text.trim().is_empty() {
            debug!("ignoring blank memory");
            return Ok(Vec::new());
        }
        if let Some(metadata) = metadata {
            validate_caller_metadata(metadata)?;
        }

        let chunks = self.chunker.chunk(text)?;
        let total = chunks.len();
        let original_length = text.chars().count();
        let timestamp = chrono::Local::now().to_rfc3339();

        let mut ids = Vec::with_capacity(total);
        for (index, chunk) in chunks.iter().enumerate() {
            let id = uuid::Uuid::new_v4().to_string();
            let chunk_metadata =
                build_chunk_metadata(&timestamp, index, total, original_length, metadata);

            if let Err(e) = self.vectors.add(&id, chunk, &chunk_metadata).await {
                if ids.is_empty() {
                    return Err(e);
                }
                warn!(
                    stored = ids.len(),
                    total,
                    error = %e,
                    "memory only partially stored"
                );
                return Err(MemoryError::PartialWrite {
                    stored: ids,
                    total,
                    source: Box::new(e),
                });
            }
            ids.push(id);
        }

        info!(chunks = total, chars = original_length, "stored memory");
        Ok(ids)
    }

    /// The `n_results` stored chunks closest to `query`, closest first.
    ///
    /// Each chunk is an independent hit; sibling chunks are not merged.
    pub async fn search_memories(&self, query: &str, n_results: usize) -> Result<Vec<MemoryRecord>> {
        if query.trim().is_empty() {
            return Err(MemoryError::EmptyQuery);
        }
        let records = self.vectors.search(query, n_results).await?;
        debug!(n_results, found = records.len(), "searched memories");
        Ok(records)
    }

    /// Number of stored chunks.
    pub async fn count(&self) -> Result<usize> {
        self.vectors.count().await
    }
}

/// System keys first, caller keys over them, lineage keys last so they can
/// never be shadowed.
fn build_chunk_metadata(
    timestamp: &str,
    index: usize,
    total: usize,
    original_length: usize,
    caller: Option<&Metadata>,
) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert(KEY_TIMESTAMP.into(), Value::from(timestamp));
    if let Some(caller) = caller {
        for (key, value) in caller {
            metadata.insert(key.clone(), value.clone());
        }
    }
    metadata.insert(KEY_CHUNK_INDEX.into(), Value::from(index));
    metadata.insert(KEY_TOTAL_CHUNKS.into(), Value::from(total));
    metadata.insert(KEY_ORIGINAL_LENGTH.into(), Value::from(original_length));
    metadata
}
