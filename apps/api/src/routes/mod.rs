pub mod health;
pub mod payment;
pub mod webhook;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Inbound WhatsApp messages (Twilio form posts, TwiML replies)
        .route("/webhook", post(webhook::handle_inbound_message))
        // Provider payment callbacks
        .route("/payment-webhook", post(payment::handle_payment_webhook))
        .with_state(state)
}
