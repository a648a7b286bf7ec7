use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Prefix the messaging transport puts in front of every sender number.
const TRANSPORT_PREFIX: &str = "whatsapp:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    New,
    ChooseReviewType,
    Payment,
    UploadCv,
    Processing,
    Upsell,
    Completed,
}

impl ConversationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationState::New => "new",
            ConversationState::ChooseReviewType => "choose_review_type",
            ConversationState::Payment => "payment",
            ConversationState::UploadCv => "upload_cv",
            ConversationState::Processing => "processing",
            ConversationState::Upsell => "upsell",
            ConversationState::Completed => "completed",
        }
    }

    /// Unrecognized stored values restart the conversation.
    pub fn parse(value: &str) -> Self {
        match value {
            "choose_review_type" => ConversationState::ChooseReviewType,
            "payment" => ConversationState::Payment,
            "upload_cv" => ConversationState::UploadCv,
            "processing" => ConversationState::Processing,
            "upsell" => ConversationState::Upsell,
            "completed" => ConversationState::Completed,
            _ => ConversationState::New,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewType {
    None,
    Basic,
    Advanced,
}

impl ReviewType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewType::None => "none",
            ReviewType::Basic => "basic",
            ReviewType::Advanced => "advanced",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "basic" => ReviewType::Basic,
            "advanced" => ReviewType::Advanced,
            _ => ReviewType::None,
        }
    }

    pub fn is_advanced(&self) -> bool {
        matches!(self, ReviewType::Advanced)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    None,
    Pending,
    Completed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::None => "none",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "pending" => PaymentStatus::Pending,
            "completed" => PaymentStatus::Completed,
            _ => PaymentStatus::None,
        }
    }
}

/// Per-user conversation record. Handlers take a snapshot and return a new one;
/// writing it back is the caller's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub identity: String,
    pub state: ConversationState,
    pub review_type: ReviewType,
    pub cv_file_ref: Option<String>,
    pub payment_status: PaymentStatus,
    pub payment_reference: Option<String>,
    pub payment_amount: Option<f64>,
    pub payment_currency: Option<String>,
    pub payment_date: Option<DateTime<Utc>>,
    pub email: Option<String>,
    pub email_requested: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(identity: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            identity: identity.into(),
            state: ConversationState::New,
            review_type: ReviewType::None,
            cv_file_ref: None,
            payment_status: PaymentStatus::None,
            payment_reference: None,
            payment_amount: None,
            payment_currency: None,
            payment_date: None,
            email: None,
            email_requested: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn transition(&mut self, to: ConversationState) {
        if self.state != to {
            tracing::debug!(
                identity = %self.identity,
                from = self.state.as_str(),
                to = to.as_str(),
                "session transition"
            );
        }
        self.state = to;
    }

    pub fn has_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Completed
    }
}

/// Raw `user_sessions` row.
#[derive(Debug, Clone, FromRow)]
pub struct SessionRow {
    pub identity: String,
    pub state: String,
    pub review_type: String,
    pub cv_file_ref: Option<String>,
    pub payment_status: String,
    pub payment_reference: Option<String>,
    pub payment_amount: Option<f64>,
    pub payment_currency: Option<String>,
    pub payment_date: Option<DateTime<Utc>>,
    pub email: Option<String>,
    pub email_requested: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Session {
            identity: row.identity,
            state: ConversationState::parse(&row.state),
            review_type: ReviewType::parse(&row.review_type),
            cv_file_ref: row.cv_file_ref,
            payment_status: PaymentStatus::parse(&row.payment_status),
            payment_reference: row.payment_reference,
            payment_amount: row.payment_amount,
            payment_currency: row.payment_currency,
            payment_date: row.payment_date,
            email: row.email,
            email_requested: row.email_requested,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Canonical identity for a sender: transport prefix removed, then everything
/// but ASCII letters and digits dropped. `whatsapp:+234 801-000` → `234801000`.
pub fn normalize_identity(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_prefix = match trimmed.get(..TRANSPORT_PREFIX.len()) {
        Some(head) if head.eq_ignore_ascii_case(TRANSPORT_PREFIX) => &trimmed[TRANSPORT_PREFIX.len()..],
        _ => trimmed,
    };
    without_prefix
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_identity_strips_prefix_and_punctuation() {
        assert_eq!(normalize_identity("whatsapp:+2348012345678"), "2348012345678");
        assert_eq!(normalize_identity("WhatsApp:+1 (555) 010-2000"), "15550102000");
        assert_eq!(normalize_identity("  +44 7700 900123 "), "447700900123");
    }

    #[test]
    fn test_normalize_identity_is_idempotent() {
        let once = normalize_identity("whatsapp:+2348012345678");
        assert_eq!(normalize_identity(&once), once);
    }

    #[test]
    fn test_state_round_trips_through_storage_string() {
        for state in [
            ConversationState::New,
            ConversationState::ChooseReviewType,
            ConversationState::Payment,
            ConversationState::UploadCv,
            ConversationState::Processing,
            ConversationState::Upsell,
            ConversationState::Completed,
        ] {
            assert_eq!(ConversationState::parse(state.as_str()), state);
        }
    }

    #[test]
    fn test_unknown_state_restarts_conversation() {
        assert_eq!(ConversationState::parse("awaiting_magic"), ConversationState::New);
        assert_eq!(ReviewType::parse(""), ReviewType::None);
        assert_eq!(PaymentStatus::parse("refunded"), PaymentStatus::None);
    }

    #[test]
    fn test_new_session_defaults() {
        let session = Session::new("2348012345678");
        assert_eq!(session.state, ConversationState::New);
        assert_eq!(session.review_type, ReviewType::None);
        assert_eq!(session.payment_status, PaymentStatus::None);
        assert!(session.cv_file_ref.is_none());
        assert!(!session.email_requested);
        assert!(!session.has_paid());
    }
}
