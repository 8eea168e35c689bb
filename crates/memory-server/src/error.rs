//! Maps engine errors onto the HTTP error taxonomy (spec §7): `StoreError`
//! and unexpected failures become 5xx, bad input becomes 4xx, every body
//! is `{ error, kind }`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use memory_core::engine::EngineError;
use memory_core::store::StoreError;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("request exceeded its soft deadline")]
    Timeout,
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "deadline_exceeded"),
            ApiError::Engine(EngineError::Store(_)) => (StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
            ApiError::Engine(EngineError::Embedder(_)) => (StatusCode::INTERNAL_SERVER_ERROR, "embedder_error"),
            ApiError::Engine(EngineError::Lifecycle(_)) => (StatusCode::INTERNAL_SERVER_ERROR, "lifecycle_error"),
            ApiError::Engine(EngineError::Agent(_)) => (StatusCode::BAD_GATEWAY, "agent_failure"),
            ApiError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
        };

        tracing::error!(kind, "{}", self);
        let body = ErrorBody {
            error: self.to_string(),
            kind,
        };
        (status, Json(body)).into_response()
    }
}
