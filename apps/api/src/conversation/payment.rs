//! Payment Confirmation Reducer.
//!
//! Second entry point onto the session store, driven by the payment provider's
//! callback instead of a chat turn. Ordering against chat turns is not
//! guaranteed; the chat side gates on `payment_status`, and this side is
//! idempotent per payment reference.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::errors::ReviewError;
use crate::integrations::messaging::Messenger;
use crate::integrations::payments::PaymentConfirmation;
use crate::integrations::store::SessionStore;
use crate::models::session::{ConversationState, PaymentStatus, ReviewType, Session};

use super::messages;
use super::pipeline::bounded;

#[derive(Debug, Clone)]
pub struct PaymentApplied {
    pub session: Session,
    /// The reference was already recorded; nothing was written or sent.
    pub duplicate: bool,
}

impl PaymentApplied {
    /// A CV is already on file, so the paid review can start without another upload.
    pub fn starts_review(&self) -> bool {
        !self.duplicate && self.session.state == ConversationState::Processing
    }
}

/// Pure transition. Returns the session unchanged (and `true`) when
/// `confirmation.reference` has been applied before.
pub fn apply_payment(
    mut session: Session,
    confirmation: &PaymentConfirmation,
    now: DateTime<Utc>,
) -> (Session, bool) {
    if session.payment_reference.as_deref() == Some(confirmation.reference.as_str()) {
        return (session, true);
    }

    session.payment_status = PaymentStatus::Completed;
    session.payment_reference = Some(confirmation.reference.clone());
    session.payment_amount = Some(confirmation.amount);
    session.payment_currency = Some(confirmation.currency.clone());
    session.payment_date = Some(now);
    // Payment is only ever taken for the advanced review.
    session.review_type = ReviewType::Advanced;
    session.transition(if session.cv_file_ref.is_some() {
        ConversationState::Processing
    } else {
        ConversationState::UploadCv
    });
    session.updated_at = now;

    (session, false)
}

/// Applies a completed charge to the payer's session, persists it, then tells
/// the user what happens next.
///
/// Read and write failures propagate so the provider retries the callback.
/// The notification is best-effort and gives up after `send_timeout`.
pub async fn on_payment_completed(
    sessions: &dyn SessionStore,
    messenger: &dyn Messenger,
    confirmation: &PaymentConfirmation,
    send_timeout: Duration,
) -> Result<PaymentApplied, ReviewError> {
    let identity = confirmation.identity.as_str();
    let current = sessions
        .get(identity)
        .await?
        .unwrap_or_else(|| Session::new(identity));

    let (session, duplicate) = apply_payment(current, confirmation, Utc::now());
    if duplicate {
        info!(
            "Payment {} for {identity} already applied; ignoring redelivery",
            confirmation.reference
        );
        return Ok(PaymentApplied { session, duplicate });
    }

    sessions.upsert(&session).await?;
    info!(
        "Payment {} of {:.2} {} completed for {identity}; session now {}",
        confirmation.reference,
        confirmation.amount,
        confirmation.currency,
        session.state.as_str()
    );

    let notice = if session.state == ConversationState::Processing {
        messages::PAYMENT_RECEIVED_PROCESSING
    } else {
        messages::PAYMENT_RECEIVED_UPLOAD
    };
    let send = messenger.send_text(identity, notice);
    if let Err(e) = bounded(send_timeout, "payment notice", ReviewError::DeliveryFailure, send).await {
        warn!("Could not notify {identity} about payment: {e}");
    }

    Ok(PaymentApplied { session, duplicate })
}
