use thiserror::Error;

/// Errors raised by the memory core.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("chunk size must be at least one token (got {0})")]
    InvalidChunkSize(usize),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("query must not be empty")]
    EmptyQuery,

    #[error("memory id {0} already exists")]
    DuplicateId(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("embedding failed: {0}")]
    Embedding(#[source] anyhow::Error),

    #[error("generation failed: {0}")]
    Generation(#[source] anyhow::Error),

    /// A chunk write failed after `stored` earlier chunks were persisted.
    /// Those chunks are not rolled back.
    #[error("stored {} of {total} chunks before failure: {source}", stored.len())]
    PartialWrite {
        stored: Vec<String>,
        total: usize,
        #[source]
        source: Box<MemoryError>,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl MemoryError {
    /// Whether the error was caused by the caller's input rather than a
    /// collaborator or the environment.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            MemoryError::InvalidMetadata(_) | MemoryError::EmptyQuery
        )
    }
}

pub type Result<T> = std::result::Result<T, MemoryError>;
