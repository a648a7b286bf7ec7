//! Payment collaborator: checkout links out, signed completion callbacks in.
//!
//! Each provider is an adapter behind `PaymentGateway`. Provider-specific
//! webhook payloads are mapped to one `PaymentConfirmation` shape, so the
//! conversation never sees provider field names.

pub mod paystack;
pub mod stripe;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderMap;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::errors::ReviewError;
use crate::models::session::ReviewType;

pub use paystack::PaystackGateway;
pub use stripe::StripeGateway;

const FALLBACK_LINK_BASE: &str = "https://example.com/payment-link";

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("invalid webhook signature")]
    InvalidSignature,

    #[error("malformed webhook payload: {0}")]
    Malformed(String),
}

/// A completed charge, mapped from whichever provider reported it.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentConfirmation {
    /// Normalized identity taken from the charge metadata.
    pub identity: String,
    /// Major currency units.
    pub amount: f64,
    pub currency: String,
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    Completed(PaymentConfirmation),
    /// Verified but irrelevant (other event types, missing metadata).
    Ignored(String),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn provider(&self) -> &'static str;

    async fn create_checkout(
        &self,
        identity: &str,
        review_type: ReviewType,
    ) -> Result<String, PaymentError>;

    /// Verifies the provider signature, then maps the event.
    fn parse_webhook(&self, headers: &HeaderMap, body: &[u8]) -> Result<WebhookOutcome, PaymentError>;
}

pub fn gateway_from_config(config: &Config) -> anyhow::Result<Arc<dyn PaymentGateway>> {
    let gateway: Arc<dyn PaymentGateway> = match config.payment_provider.as_str() {
        "stripe" => Arc::new(StripeGateway::from_config(config)?),
        "paystack" => Arc::new(PaystackGateway::from_config(config)?),
        other => anyhow::bail!("unknown PAYMENT_PROVIDER '{other}' (expected paystack or stripe)"),
    };
    info!("Payment provider: {}", gateway.provider());
    Ok(gateway)
}

/// Payment links that never fail: provider errors and slow providers turn
/// into a fallback URL.
pub struct PaymentLinks {
    gateway: Arc<dyn PaymentGateway>,
    fallback: String,
    timeout: Duration,
}

impl PaymentLinks {
    pub fn new(gateway: Arc<dyn PaymentGateway>, success_url: &str, timeout: Duration) -> Self {
        Self {
            gateway,
            fallback: fallback_payment_link(success_url),
            timeout,
        }
    }

    pub fn gateway(&self) -> &dyn PaymentGateway {
        self.gateway.as_ref()
    }

    pub async fn link_for(&self, identity: &str, review_type: ReviewType) -> String {
        let checkout = self.gateway.create_checkout(identity, review_type);
        match tokio::time::timeout(self.timeout, checkout).await {
            Ok(Ok(url)) if !url.trim().is_empty() => url,
            Ok(Ok(_)) => self.degrade("provider returned an empty checkout URL".to_string()),
            Ok(Err(e)) => self.degrade(e.to_string()),
            Err(_) => self.degrade(format!(
                "checkout creation exceeded {}s",
                self.timeout.as_secs()
            )),
        }
    }

    fn degrade(&self, reason: String) -> String {
        warn!("{}; using fallback link", ReviewError::PaymentLinkUnavailable(reason));
        self.fallback.clone()
    }
}

pub fn fallback_payment_link(success_url: &str) -> String {
    reqwest::Url::parse_with_params(FALLBACK_LINK_BASE, &[("redirect", success_url)])
        .map(String::from)
        .unwrap_or_else(|_| FALLBACK_LINK_BASE.to_string())
}

/// Header value as a string, if present and ASCII.
pub(crate) fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
