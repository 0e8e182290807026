//! The retrieval-augmented memory core.
//!
//! Text is split into token windows ([`Chunker`]), each window is embedded and
//! persisted by a [`VectorStore`], and [`MemoryStore`] ties the two together.
//! [`MemoryAssistant`] turns search hits into a grounded prompt for a
//! [`crate::providers::ModelProvider`].

mod chunking;
mod context;
mod embeddings;
mod error;
mod schema;
mod store;
mod types;
mod vector_store;

pub use chunking::{chunk_text, Chunker, TextChunk};
pub use context::{
    build_context, build_messages, GenerationSettings, GroundedAnswer, MemoryAssistant,
    CONTEXT_HEADER, SYSTEM_PROMPT, UNKNOWN_TIME,
};
pub use embeddings::{
    create_provider, EmbeddingProvider, HashingEmbeddingProvider, OpenAiEmbeddingProvider,
};
pub use error::{MemoryError, Result};
pub use store::MemoryStore;
pub use types::{
    validate_caller_metadata, MemoryRecord, Metadata, KEY_CHUNK_INDEX, KEY_ORIGINAL_LENGTH,
    KEY_TIMESTAMP, KEY_TOTAL_CHUNKS, LINEAGE_KEYS,
};
pub use vector_store::{cosine_distance, SqliteVectorStore, VectorStore};
