use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::services::jobs::SubmitError;
use crate::services::scryfall::ScryfallError;
use crate::services::store::StoreError;

/// Error type for HTTP handlers, rendered as `{"error": ..., "code": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Submit(#[from] SubmitError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Scryfall(#[from] ScryfallError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

fn internal(err: &dyn std::fmt::Display) -> (StatusCode, &'static str, String) {
    tracing::error!(error = %err, "Internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Submit(SubmitError::Configuration(e)) => {
                tracing::warn!(error = %e, "Submission refused, generation not configured");
                (StatusCode::SERVICE_UNAVAILABLE, "NOT_CONFIGURED", e.to_string())
            }
            ApiError::Submit(SubmitError::Validation(msg)) | ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            ApiError::Submit(SubmitError::Store(e)) => internal(e),

            ApiError::Store(StoreError::NotFound(id)) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("Job {id} not found"),
            ),
            ApiError::Store(e) => internal(e),

            ApiError::Scryfall(ScryfallError::InvalidUrl(msg)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            ApiError::Scryfall(e) => {
                tracing::warn!(error = %e, "Scryfall request failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "UPSTREAM_ERROR",
                    "Card search is unavailable right now".to_string(),
                )
            }

            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
