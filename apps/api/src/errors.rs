use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failures inside the review flow. None of these reach the transport layer:
/// the conversation converts them into a reply, a fallback, or a log line.
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("attachment of {0} bytes exceeds the upload limit")]
    AttachmentTooLarge(u64),

    #[error("text extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("report generation failed: {0}")]
    ReportGenerationFailed(String),

    /// Only ever logged; the scorer falls back to local analysis.
    #[error("remote scoring unavailable: {0}")]
    RemoteScoringUnavailable(String),

    #[error("storage failure: {0}")]
    StorageFailure(String),

    #[error("delivery failure: {0}")]
    DeliveryFailure(String),

    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("payment link unavailable: {0}")]
    PaymentLinkUnavailable(String),
}

impl From<sqlx::Error> for ReviewError {
    fn from(e: sqlx::Error) -> Self {
        ReviewError::PersistenceFailure(e.to_string())
    }
}

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Review error: {0}")]
    Review(#[from] ReviewError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::InvalidSignature => (
                StatusCode::BAD_REQUEST,
                "INVALID_SIGNATURE",
                "Webhook signature verification failed".to_string(),
            ),
            AppError::Review(e) => {
                tracing::error!("Review error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "REVIEW_ERROR",
                    "The request could not be processed".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
