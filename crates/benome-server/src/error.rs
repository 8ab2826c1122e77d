use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use benome_core::BoostError;

/// Application-level errors that map directly to HTTP responses.
///
/// Every variant implements [`IntoResponse`] so Axum handlers can use
/// `Result<impl IntoResponse, AppError>` as their return type.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The listing already holds a pending or active boost.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The requested transition is not allowed from the record's status.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("payment gateway error: {0}")]
    Gateway(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<BoostError> for AppError {
    fn from(err: BoostError) -> Self {
        let message = err.to_string();
        match err {
            BoostError::Conflict { .. } => AppError::Conflict(message),
            BoostError::Precondition(msg) => AppError::PreconditionFailed(msg),
            BoostError::InvalidState(msg) => AppError::InvalidState(msg),
            BoostError::Authorization(msg) => AppError::Forbidden(msg),
            BoostError::NotFound(msg) => AppError::NotFound(msg),
            BoostError::Validation(msg) => AppError::BadRequest(msg),
            BoostError::Gateway(msg) => AppError::Gateway(msg),
            BoostError::Storage(e) => AppError::Internal(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.as_str()),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "validation_error", msg.as_str())
            }
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", "Not authenticated"),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.as_str()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.as_str()),
            AppError::InvalidState(msg) => (StatusCode::CONFLICT, "invalid_state", msg.as_str()),
            AppError::PreconditionFailed(msg) => (
                StatusCode::PRECONDITION_FAILED,
                "precondition_failed",
                msg.as_str(),
            ),
            AppError::Gateway(msg) => {
                tracing::warn!("Payment gateway error: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "gateway_error",
                    "Payment provider unavailable, try again later",
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error",
                )
            }
        };

        (
            status,
            Json(json!({
                "error": {
                    "code": code,
                    "message": message,
                    "field": null
                }
            })),
        )
            .into_response()
    }
}
