pub mod agents;
pub mod alerts;
pub mod monitors;
pub mod pagination;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use vigil_storage::StorageError;

/// Error envelope for the REST surface.
#[derive(Debug)]
pub enum ApiError {
    Storage(StorageError),
    BadRequest(String),
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        ApiError::Storage(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Storage(e) => match &e {
                StorageError::NotFound { .. } => (StatusCode::NOT_FOUND, e.to_string()),
                StorageError::Conflict { .. } => (StatusCode::CONFLICT, e.to_string()),
                StorageError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
                _ => {
                    tracing::error!(error = %e, "Storage error in API handler");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal error".to_string(),
                    )
                }
            },
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// A page of rows plus the unpaginated total.
#[derive(Debug, serde::Serialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: u64,
}
