use serde::{Deserialize, Serialize};

use crate::memory::{MemoryRecord, Metadata};

/// Largest multipart body accepted on the audio routes; the file plus a
/// little room for the other form fields.
pub const MAX_AUDIO_BODY_BYTES: usize = crate::config::MAX_AUDIO_UPLOAD_BYTES + 64 * 1024;

// ============================================================================
// Service
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub uptime: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountResponse {
    pub total_memories: usize,
}

// ============================================================================
// Text
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMemoryRequest {
    pub text: String,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

/// Reply for both text and audio stores; `transcription` only for audio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMemoryResponse {
    pub memory_ids: Vec<String>,
    pub chunks_created: usize,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcription: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryParams {
    #[serde(default)]
    pub query: String,
    pub max_context_memories: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub response: String,
    pub relevant_memories: Vec<MemoryRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcription: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub n_results: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub memories: Vec<MemoryRecord>,
}

/// Body of every error reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}
