use std::sync::Arc;

use crate::conversation::Conversation;
use crate::integrations::dedup::DeliveryDeduplicator;
use crate::integrations::messaging::TwilioRequestValidator;
use crate::integrations::payments::PaymentLinks;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub conversation: Conversation,
    pub payments: Arc<PaymentLinks>,
    /// Drops transport redeliveries of the same inbound message.
    pub dedup: DeliveryDeduplicator,
    /// Inbound webhook signatures are not checked when `None`.
    pub inbound_validator: Option<TwilioRequestValidator>,
}
