//! Default configuration constants used across the system.

/// Default API server port.
pub const DEFAULT_SERVER_PORT: u16 = 8000;

/// Default API server bind host.
pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";

/// Browser origins allowed by default (a local web UI).
pub const DEFAULT_CORS_ORIGINS: [&str; 2] = ["http://localhost:3000", "http://127.0.0.1:3000"];

/// Default chunk size in tokens.
pub const DEFAULT_CHUNK_TOKENS: usize = 500;

/// Default number of results for raw searches.
pub const DEFAULT_SEARCH_RESULTS: usize = 5;

/// Default number of memories placed in a query's context.
pub const DEFAULT_CONTEXT_MEMORIES: usize = 3;

/// Default embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default chat model.
pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";

/// Default answer length limit in tokens.
pub const DEFAULT_MAX_OUTPUT_TOKENS: u64 = 500;

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

/// Default transcription model.
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";

/// Default OpenAI API base URL.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// File name of the vector database inside the state directory.
pub const DEFAULT_DB_FILE: &str = "memory.db";

/// Largest accepted audio upload (25 MB, the transcription API's own limit).
pub const MAX_AUDIO_UPLOAD_BYTES: usize = 25 * 1024 * 1024;
