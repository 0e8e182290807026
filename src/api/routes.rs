use crate::api::error::ApiError;
use crate::api::protocol::*;
use crate::api::server::ApiState;
use crate::media::{audio_metadata, parse_metadata_field, validate_audio, AudioUpload};
use crate::memory::{GroundedAnswer, MemoryAssistant};

use axum::{
    extract::{
        multipart::{Field, Multipart, MultipartRejection},
        rejection::{JsonRejection, QueryRejection},
        DefaultBodyLimit, Json, Query, State,
    },
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

const ROOT_MESSAGE: &str = "LLM Notepad API - Your AI-powered second brain (text and audio)";

/// Build all routes of the notepad API.
pub fn build_routes(state: ApiState, cors_origins: &[String]) -> Router {
    let origins: Vec<HeaderValue> = cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        // Text
        .route("/text/store", post(text_store_handler))
        .route("/text/query", get(text_query_handler))
        .route("/text/search", post(text_search_handler))
        // Audio
        .route(
            "/audio/store",
            post(audio_store_handler).layer(DefaultBodyLimit::max(MAX_AUDIO_BODY_BYTES)),
        )
        .route(
            "/audio/query",
            post(audio_query_handler).layer(DefaultBodyLimit::max(MAX_AUDIO_BODY_BYTES)),
        )
        .route("/memories/count", get(count_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Service
// ============================================================================

async fn root_handler() -> Json<RootResponse> {
    Json(RootResponse {
        message: ROOT_MESSAGE.to_string(),
    })
}

async fn health_handler(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "llm-notepad".to_string(),
        version: state.version.clone(),
        uptime: state.start_time.elapsed().as_secs(),
    })
}

async fn count_handler(State(state): State<ApiState>) -> Result<Json<CountResponse>, ApiError> {
    let total_memories = state
        .app
        .store
        .count()
        .await
        .map_err(|e| ApiError::memory(e, "Failed to get memory count"))?;
    Ok(Json(CountResponse { total_memories }))
}

// ============================================================================
// Text
// ============================================================================

async fn text_store_handler(
    State(state): State<ApiState>,
    body: Result<Json<StoreMemoryRequest>, JsonRejection>,
) -> Result<Json<StoreMemoryResponse>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let memory_ids = state
        .app
        .store
        .store_memory(&request.text, request.metadata.as_ref())
        .await
        .map_err(|e| ApiError::memory(e, "Failed to store text memory"))?;

    Ok(Json(StoreMemoryResponse {
        chunks_created: memory_ids.len(),
        message: format!(
            "Successfully stored text memory in {} chunks",
            memory_ids.len()
        ),
        memory_ids,
        transcription: None,
    }))
}

async fn text_query_handler(
    State(state): State<ApiState>,
    params: Result<Query<QueryParams>, QueryRejection>,
) -> Result<Json<QueryResponse>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let k = params
        .max_context_memories
        .unwrap_or(state.app.context_memories);

    let answer = grounded_answer(&state, &params.query, k, "Failed to query text memories").await?;
    Ok(Json(QueryResponse {
        response: answer.answer,
        relevant_memories: answer.memories,
        transcription: None,
    }))
}

async fn text_search_handler(
    State(state): State<ApiState>,
    body: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let n_results = request.n_results.unwrap_or(state.app.search_results);

    let memories = state
        .app
        .store
        .search_memories(&request.query, n_results)
        .await
        .map_err(|e| ApiError::memory(e, "Failed to search text memories"))?;
    debug!(query = %request.query, hits = memories.len(), "raw search");

    Ok(Json(SearchResponse { memories }))
}

// ============================================================================
// Audio
// ============================================================================

async fn audio_store_handler(
    State(state): State<ApiState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<StoreMemoryResponse>, ApiError> {
    let form = read_audio_form(multipart).await?;
    let transcription = transcribe(&state, &form.audio).await?;

    let caller = form.metadata.as_deref().map(parse_metadata_field);
    let metadata = audio_metadata(caller, &form.audio.filename, &form.audio.content_type);

    let memory_ids = state
        .app
        .store
        .store_memory(&transcription, Some(&metadata))
        .await
        .map_err(|e| ApiError::memory(e, "Failed to store audio memory"))?;

    info!(
        filename = %form.audio.filename,
        chunks = memory_ids.len(),
        transcription = %preview(&transcription),
        "stored audio memory"
    );

    Ok(Json(StoreMemoryResponse {
        chunks_created: memory_ids.len(),
        message: format!(
            "Successfully transcribed and stored audio memory in {} chunks",
            memory_ids.len()
        ),
        memory_ids,
        transcription: Some(transcription),
    }))
}

async fn audio_query_handler(
    State(state): State<ApiState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<QueryResponse>, ApiError> {
    let form = read_audio_form(multipart).await?;
    let k = match form.max_context_memories.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => raw.parse::<usize>().map_err(|_| {
            ApiError::BadRequest(format!("Invalid max_context_memories: {raw}"))
        })?,
        _ => state.app.context_memories,
    };

    // Checked before transcribing.
    state.app.assistant.as_ref().ok_or_else(generation_unavailable)?;

    let query = transcribe(&state, &form.audio).await?;
    info!(
        filename = %form.audio.filename,
        query = %preview(&query),
        "received audio query"
    );

    let answer = grounded_answer(&state, &query, k, "Failed to query audio memories").await?;
    Ok(Json(QueryResponse {
        response: answer.answer,
        relevant_memories: answer.memories,
        transcription: Some(query),
    }))
}

/// Fields of an audio form, in any order.
struct AudioForm {
    audio: AudioUpload,
    metadata: Option<String>,
    max_context_memories: Option<String>,
}

async fn read_audio_form(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<AudioForm, ApiError> {
    let mut multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let mut audio = None;
    let mut metadata = None;
    let mut max_context_memories = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "audio_file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(|e| {
                    ApiError::BadRequest(format!("Failed to read audio_file: {e}"))
                })?;
                audio = Some(AudioUpload {
                    filename,
                    content_type,
                    bytes,
                });
            }
            "metadata" => metadata = Some(read_text_field(field).await?),
            "max_context_memories" => max_context_memories = Some(read_text_field(field).await?),
            other => debug!(field = other, "ignoring unknown form field"),
        }
    }

    let audio = audio.ok_or_else(|| ApiError::BadRequest("Missing audio_file".to_string()))?;
    if !validate_audio(&audio.filename, &audio.content_type) {
        return Err(ApiError::BadRequest(
            "Only audio files (webm, mp3, wav, m4a, flac) are supported".to_string(),
        ));
    }

    Ok(AudioForm {
        audio,
        metadata,
        max_context_memories,
    })
}

async fn read_text_field(field: Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid form field: {e}")))
}

/// Transcribe an upload, treating silence as a client error.
async fn transcribe(state: &ApiState, audio: &AudioUpload) -> Result<String, ApiError> {
    let transcriber = state.app.transcriber.as_ref().ok_or_else(|| {
        ApiError::Unavailable(
            "Audio transcription is not configured (set OPENAI_API_KEY)".to_string(),
        )
    })?;

    let text = transcriber
        .transcribe(audio)
        .await
        .map_err(|e| ApiError::Internal(format!("Transcription failed: {e}")))?;

    if text.is_empty() {
        return Err(ApiError::BadRequest(
            "No speech detected in audio file".to_string(),
        ));
    }
    Ok(text)
}

async fn grounded_answer(
    state: &ApiState,
    query: &str,
    k: usize,
    action: &str,
) -> Result<GroundedAnswer, ApiError> {
    let assistant: &MemoryAssistant = state
        .app
        .assistant
        .as_ref()
        .ok_or_else(generation_unavailable)?;
    assistant
        .answer(query, k)
        .await
        .map_err(|e| ApiError::memory(e, action))
}

fn generation_unavailable() -> ApiError {
    ApiError::Unavailable("Answer generation is not configured (set OPENAI_API_KEY)".to_string())
}

/// First 100 characters of a transcription, for logs.
fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(100).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
