//! Conversation State Machine: one turn per inbound chat message.
//!
//! A turn loads the sender's session, runs the transition for its current
//! state, and writes the new session back before the reply goes out. A write
//! failure is logged and the reply is still returned.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::document::DocumentFormat;
use crate::errors::ReviewError;
use crate::integrations::mailer::is_valid_email;
use crate::integrations::messaging::Messenger;
use crate::integrations::payments::{PaymentConfirmation, PaymentLinks};
use crate::integrations::store::{ProfileStore, SessionStore};
use crate::models::session::{
    normalize_identity, ConversationState, PaymentStatus, ReviewType, Session,
};

use super::messages;
use super::payment::{on_payment_completed, PaymentApplied};
use super::pipeline::{bounded, ReviewRequest, ReviewServices};

/// Case-insensitive substrings that restart the conversation from any state.
const GREETINGS: [&str; 4] = ["hi", "hello", "cv review", "review cv"];

/// One inbound chat event, already unwrapped from the transport payload.
#[derive(Debug, Clone, Default)]
pub struct InboundMessage {
    pub sender_id: String,
    pub text: String,
    pub attachment_url: Option<String>,
    pub attachment_content_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub session: Session,
    pub reply: String,
}

pub struct ConversationDeps {
    pub sessions: Arc<dyn SessionStore>,
    pub profiles: Arc<dyn ProfileStore>,
    pub messenger: Arc<dyn Messenger>,
    pub payments: Arc<PaymentLinks>,
    pub review: ReviewServices,
}

#[derive(Clone)]
pub struct Conversation {
    deps: Arc<ConversationDeps>,
}

pub fn is_greeting(text: &str) -> bool {
    let text = text.to_lowercase();
    GREETINGS.iter().any(|g| text.contains(g))
}

impl Conversation {
    pub fn new(deps: ConversationDeps) -> Self {
        Self {
            deps: Arc::new(deps),
        }
    }

    /// Handles one chat turn end to end and returns the reply text.
    pub async fn process(&self, message: &InboundMessage) -> String {
        let identity = normalize_identity(&message.sender_id);
        let session = self.load(&identity).await;
        let from = session.state;

        let TurnOutcome { mut session, reply } = self.handle_turn(session, message).await;
        info!(
            "Turn for {identity}: {} -> {}",
            from.as_str(),
            session.state.as_str()
        );
        self.persist(&mut session).await;
        reply
    }

    /// Computes the next session and reply. Side effects on collaborators
    /// (storage, messages, payment links) happen here; persisting the session
    /// is left to the caller.
    pub async fn handle_turn(&self, mut session: Session, message: &InboundMessage) -> TurnOutcome {
        let text = message.text.trim().to_lowercase();

        if is_greeting(&text) {
            session.transition(ConversationState::ChooseReviewType);
            return TurnOutcome {
                session,
                reply: messages::CHOOSE_REVIEW_TYPE.to_string(),
            };
        }

        let reply = match session.state {
            ConversationState::ChooseReviewType => self.on_choose_review_type(&mut session, &text).await,
            ConversationState::Payment => self.on_payment(&mut session, &text).await,
            ConversationState::UploadCv => self.on_upload_cv(&mut session, message).await,
            ConversationState::Upsell => self.on_upsell(&mut session, &text).await,
            ConversationState::New | ConversationState::Processing | ConversationState::Completed => {
                session.transition(ConversationState::New);
                messages::GREETING_PROMPT.to_string()
            }
        };

        TurnOutcome { session, reply }
    }

    /// Applies a provider-confirmed payment to the payer's session.
    pub async fn confirm_payment(
        &self,
        confirmation: &PaymentConfirmation,
    ) -> Result<PaymentApplied, ReviewError> {
        on_payment_completed(
            self.deps.sessions.as_ref(),
            self.deps.messenger.as_ref(),
            confirmation,
            self.deps.review.step_timeout,
        )
        .await
    }

    /// Runs the paid review for a CV that was already on file when payment
    /// landed. The result goes to the user as a message instead of a reply.
    pub async fn resume_paid_review(&self, identity: String) {
        let mut session = self.load(&identity).await;
        if session.state != ConversationState::Processing || session.cv_file_ref.is_none() {
            info!(
                "Paid review for {identity} no longer pending (state {}); skipping",
                session.state.as_str()
            );
            return;
        }

        let reply = match self.review_stored_cv(&mut session).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("Paid review for {identity} failed: {e}");
                session.transition(ConversationState::New);
                messages::PROCESSING_FAILED.to_string()
            }
        };
        self.persist(&mut session).await;
        self.notify(&identity, &reply).await;
    }

    // ────────────────────────────────────────────────────────────────────────
    // Per-state transitions
    // ────────────────────────────────────────────────────────────────────────

    async fn on_choose_review_type(&self, session: &mut Session, text: &str) -> String {
        if text.contains("basic") {
            session.review_type = ReviewType::Basic;
            session.transition(ConversationState::UploadCv);
            messages::UPLOAD_PROMPT.to_string()
        } else if text.contains("advanced") {
            let link = self.request_payment(session).await;
            messages::payment_link(&link)
        } else {
            messages::REVIEW_TYPE_UNCLEAR.to_string()
        }
    }

    /// Chat text never completes a payment; only the provider callback does.
    async fn on_payment(&self, session: &mut Session, text: &str) -> String {
        if !session.has_paid() {
            return messages::PAYMENT_PENDING.to_string();
        }

        if !session.email_requested {
            session.email_requested = true;
            return messages::ASK_EMAIL.to_string();
        }

        if text.contains('@') && text.contains('.') {
            let email = text.to_string();
            session.email = Some(email.clone());
            session.transition(ConversationState::UploadCv);
            match self.deps.profiles.save_email(&session.identity, &email).await {
                Ok(()) => messages::email_recorded(&email),
                Err(e) => {
                    warn!("Could not save email for {}: {e}", session.identity);
                    messages::EMAIL_SAVED_UPLOAD.to_string()
                }
            }
        } else if text == "skip" || text == "no" {
            session.transition(ConversationState::UploadCv);
            messages::EMAIL_SKIPPED.to_string()
        } else {
            messages::EMAIL_INVALID.to_string()
        }
    }

    async fn on_upload_cv(&self, session: &mut Session, message: &InboundMessage) -> String {
        let Some(url) = message
            .attachment_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
        else {
            return messages::AWAITING_CV.to_string();
        };

        let declared = message.attachment_content_type.as_deref().unwrap_or_default();
        let Some(format) = DocumentFormat::from_content_type(declared) else {
            info!("Rejected {declared:?} attachment from {}", session.identity);
            return messages::UNSUPPORTED_FORMAT.to_string();
        };

        self.notify(&session.identity, messages::CV_RECEIVED).await;

        let outcome = match self.store_attachment(&session.identity, url, format).await {
            Ok(cv_ref) => {
                session.cv_file_ref = Some(cv_ref);
                session.transition(ConversationState::Processing);
                self.review_stored_cv(session).await
            }
            Err(ReviewError::AttachmentTooLarge(bytes)) => {
                info!("Rejected {bytes}-byte attachment from {}", session.identity);
                return messages::FILE_TOO_LARGE.to_string();
            }
            Err(e) => Err(e),
        };

        outcome.unwrap_or_else(|e| {
            error!("Review for {} failed: {e}", session.identity);
            session.transition(ConversationState::New);
            messages::PROCESSING_FAILED.to_string()
        })
    }

    async fn on_upsell(&self, session: &mut Session, text: &str) -> String {
        if text.contains("advanced") || text.contains("yes") {
            let link = self.request_payment(session).await;
            messages::upsell_payment_link(&link)
        } else {
            session.transition(ConversationState::New);
            messages::UPSELL_DECLINED.to_string()
        }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Shared steps
    // ────────────────────────────────────────────────────────────────────────

    /// Moves to `payment` for an advanced review and returns a checkout link.
    /// A payment that was confirmed but not yet used carries over.
    async fn request_payment(&self, session: &mut Session) -> String {
        session.review_type = ReviewType::Advanced;
        if !session.has_paid() {
            session.payment_status = PaymentStatus::Pending;
        }
        session.transition(ConversationState::Payment);
        self.deps
            .payments
            .link_for(&session.identity, ReviewType::Advanced)
            .await
    }

    async fn store_attachment(
        &self,
        identity: &str,
        url: &str,
        format: DocumentFormat,
    ) -> Result<String, ReviewError> {
        let review = &self.deps.review;
        let bytes = bounded(
            review.step_timeout,
            "attachment download",
            ReviewError::StorageFailure,
            self.deps.messenger.fetch_media(url),
        )
        .await?;
        review
            .store_bytes(identity, "cv", format.extension(), &bytes)
            .await
    }

    /// Reviews the CV referenced by the session and moves it to `upsell`
    /// (basic) or `completed` (advanced). An advanced review uses up the payment.
    async fn review_stored_cv(&self, session: &mut Session) -> Result<String, ReviewError> {
        let cv_ref = session
            .cv_file_ref
            .clone()
            .ok_or_else(|| ReviewError::StorageFailure("no CV on file".to_string()))?;
        let review_type = if session.review_type.is_advanced() {
            ReviewType::Advanced
        } else {
            ReviewType::Basic
        };

        let email = if review_type.is_advanced() {
            self.notify(&session.identity, messages::ADVANCED_IN_PROGRESS).await;
            self.delivery_email(session).await
        } else {
            None
        };

        let done = self
            .deps
            .review
            .run_review(ReviewRequest {
                identity: &session.identity,
                cv_ref: &cv_ref,
                review_type,
                email: email.as_deref(),
            })
            .await?;
        info!(
            "Review {} complete for {} ({}/100)",
            done.record_id, session.identity, done.result.improvement_score
        );

        if review_type.is_advanced() {
            session.payment_status = PaymentStatus::None;
            session.transition(ConversationState::Completed);
            let emailed_to = email.filter(|_| done.result.email_sent == Some(true));
            Ok(messages::advanced_review(
                done.result.improvement_score,
                &done.result.insights,
                done.report_link.as_deref(),
                emailed_to.as_deref(),
            ))
        } else {
            session.transition(ConversationState::Upsell);
            Ok(messages::basic_review(&done.result.insights))
        }
    }

    /// Session email first, then the saved profile. Lookup errors just mean no email.
    async fn delivery_email(&self, session: &Session) -> Option<String> {
        if let Some(email) = session.email.as_deref().filter(|e| is_valid_email(e)) {
            return Some(email.to_string());
        }
        match self.deps.profiles.email_for(&session.identity).await {
            Ok(email) => email.filter(|e| is_valid_email(e)),
            Err(e) => {
                warn!("Profile lookup for {} failed: {e}", session.identity);
                None
            }
        }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Session I/O
    // ────────────────────────────────────────────────────────────────────────

    /// Absent sessions and read failures both start a fresh conversation.
    async fn load(&self, identity: &str) -> Session {
        match self.deps.sessions.get(identity).await {
            Ok(Some(session)) => session,
            Ok(None) => Session::new(identity),
            Err(e) => {
                error!("Session read for {identity} failed: {e}; starting fresh");
                Session::new(identity)
            }
        }
    }

    async fn persist(&self, session: &mut Session) {
        session.updated_at = Utc::now();
        if let Err(e) = self.deps.sessions.upsert(session).await {
            error!("Session write for {} failed: {e}", session.identity);
        }
    }

    async fn notify(&self, identity: &str, body: &str) {
        let send = self.deps.messenger.send_text(identity, body);
        let limit = self.deps.review.step_timeout;
        if let Err(e) = bounded(limit, "message send", ReviewError::DeliveryFailure, send).await {
            warn!("Interim message to {identity} failed: {e}");
        }
    }
}
