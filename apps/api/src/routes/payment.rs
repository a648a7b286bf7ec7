//! POST /payment-webhook: provider payment callbacks.
//!
//! A confirmed payment is recorded before the response goes out. When the
//! payer already has a CV on file, the paid review then runs in the
//! background so the provider is not kept waiting.

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde_json::{json, Value};
use tracing::info;

use crate::errors::AppError;
use crate::integrations::payments::{PaymentError, WebhookOutcome};
use crate::state::AppState;

/// POST /payment-webhook
pub async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let outcome = state
        .payments
        .gateway()
        .parse_webhook(&headers, &body)
        .map_err(|e| match e {
            PaymentError::InvalidSignature => AppError::InvalidSignature,
            PaymentError::NotConfigured(_) => AppError::Internal(e.into()),
            other => AppError::Validation(other.to_string()),
        })?;

    match outcome {
        WebhookOutcome::Completed(confirmation) => {
            let applied = state.conversation.confirm_payment(&confirmation).await?;
            if applied.starts_review() {
                let conversation = state.conversation.clone();
                let identity = applied.session.identity.clone();
                info!("Starting paid review for {identity} in the background");
                tokio::spawn(async move { conversation.resume_paid_review(identity).await });
            }
        }
        WebhookOutcome::Ignored(reason) => {
            info!("Ignoring payment event: {reason}");
        }
    }

    Ok(Json(json!({ "received": true })))
}
