use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::catalog::DbError;

/// Every way a movie request can fail. Bodies are plain text; `NotFound`
/// carries none.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    AlreadyExists(String),
    #[error("not found")]
    NotFound,
    #[error("admin key required")]
    Unauthorized,
    #[error("{0}")]
    Internal(String),
    #[error("catalog error: {0}")]
    Catalog(#[from] DbError),
}

/// Malformed or mistyped request bodies are client input errors like any other.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) | ApiError::AlreadyExists(msg) => {
                (StatusCode::BAD_REQUEST, msg).into_response()
            }
            ApiError::NotFound => StatusCode::NOT_FOUND.into_response(),
            ApiError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, "Admin key required.").into_response()
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response(),
            ApiError::Catalog(e) => {
                error!("Catalog failure: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error.").into_response()
            }
        }
    }
}
