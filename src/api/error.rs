use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

use super::protocol::ErrorBody;
use crate::memory::MemoryError;

/// Error reply of the HTTP API, rendered as `{"detail": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request itself is unusable.
    #[error("{0}")]
    BadRequest(String),

    /// A service the route needs is not configured.
    #[error("{0}")]
    Unavailable(String),

    /// A collaborator failed while serving a valid request.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Map a core error: caller mistakes become 400, anything else 500 with
    /// `action` as the prefix of the detail.
    pub fn memory(err: MemoryError, action: &str) -> Self {
        if err.is_client_error() {
            ApiError::BadRequest(err.to_string())
        } else {
            ApiError::Internal(format!("{action}: {err}"))
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), detail = %self, "request failed");
        }
        (
            status,
            Json(ErrorBody {
                detail: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_error_mapping() {
        let bad = ApiError::memory(MemoryError::EmptyQuery, "Failed to search text memories");
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
        assert_eq!(bad.to_string(), "query must not be empty");

        let internal = ApiError::memory(
            MemoryError::Embedding(anyhow::anyhow!("connection refused")),
            "Failed to store text memory",
        );
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            internal.to_string(),
            "Failed to store text memory: embedding failed: connection refused"
        );
    }

    #[tokio::test]
    async fn test_into_response_renders_detail() {
        let response = ApiError::Unavailable("no key".into()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, serde_json::json!({"detail": "no key"}));
    }
}
