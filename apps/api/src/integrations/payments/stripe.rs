use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;

use super::{header_str, PaymentConfirmation, PaymentError, PaymentGateway, WebhookOutcome};
use crate::config::Config;
use crate::integrations::http_client;
use crate::models::session::{normalize_identity, ReviewType};

const CHECKOUT_URL: &str = "https://api.stripe.com/v1/checkout/sessions";
const SIGNATURE_HEADER: &str = "stripe-signature";
const CHECKOUT_COMPLETED: &str = "checkout.session.completed";
/// Signed timestamps older than this are replays.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

type HmacSha256 = Hmac<Sha256>;

pub struct StripeGateway {
    client: Client,
    secret_key: Option<String>,
    price_id: Option<String>,
    webhook_secret: Option<String>,
    success_url: String,
    cancel_url: String,
}

impl StripeGateway {
    pub fn from_config(config: &Config) -> reqwest::Result<Self> {
        Ok(Self {
            client: http_client(Duration::from_secs(config.step_timeout_secs))?,
            secret_key: config.stripe_secret_key.clone(),
            price_id: config.stripe_price_id.clone(),
            webhook_secret: config.stripe_webhook_secret.clone(),
            success_url: config.payment_success_url.clone(),
            cancel_url: config.payment_cancel_url.clone(),
        })
    }

    fn verify_signature(&self, headers: &HeaderMap, body: &[u8]) -> Result<(), PaymentError> {
        let secret = self
            .webhook_secret
            .as_deref()
            .ok_or(PaymentError::NotConfigured("STRIPE_WEBHOOK_SECRET"))?;
        let header = header_str(headers, SIGNATURE_HEADER).ok_or(PaymentError::InvalidSignature)?;
        verify_stripe_signature(secret, header, body, Utc::now().timestamp())
    }
}

/// Checks a `t=…,v1=…` header: HMAC-SHA256 over `"{t}.{body}"`, within tolerance.
fn verify_stripe_signature(
    secret: &str,
    header: &str,
    body: &[u8],
    now: i64,
) -> Result<(), PaymentError> {
    let mut timestamp: Option<&str> = None;
    let mut candidates: Vec<Vec<u8>> = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => {
                if let Ok(bytes) = hex::decode(value) {
                    candidates.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(PaymentError::InvalidSignature)?;
    let signed_at: i64 = timestamp.parse().map_err(|_| PaymentError::InvalidSignature)?;
    if (now - signed_at).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(PaymentError::InvalidSignature);
    }

    let matches = candidates.iter().any(|candidate| {
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(body);
        mac.verify_slice(candidate).is_ok()
    });

    if matches {
        Ok(())
    } else {
        Err(PaymentError::InvalidSignature)
    }
}

#[derive(Debug, Deserialize)]
struct CheckoutSession {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: String,
}

#[derive(Debug, Deserialize)]
struct StripeEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: CompletedSession,
}

#[derive(Debug, Deserialize)]
struct CompletedSession {
    id: String,
    amount_total: Option<i64>,
    currency: Option<String>,
    #[serde(default)]
    metadata: std::collections::HashMap<String, String>,
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn provider(&self) -> &'static str {
        "stripe"
    }

    async fn create_checkout(
        &self,
        identity: &str,
        review_type: ReviewType,
    ) -> Result<String, PaymentError> {
        let secret = self
            .secret_key
            .as_deref()
            .ok_or(PaymentError::NotConfigured("STRIPE_SECRET_KEY"))?;
        let price = self
            .price_id
            .as_deref()
            .ok_or(PaymentError::NotConfigured("STRIPE_PRICE_ID"))?;
        let service = format!("cv_{}_review", review_type.as_str());

        let form = [
            ("mode", "payment"),
            ("line_items[0][price]", price),
            ("line_items[0][quantity]", "1"),
            ("success_url", self.success_url.as_str()),
            ("cancel_url", self.cancel_url.as_str()),
            ("metadata[phone_number]", identity),
            ("metadata[service]", service.as_str()),
        ];

        let response = self
            .client
            .post(CHECKOUT_URL)
            .bearer_auth(secret)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<StripeErrorBody>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(PaymentError::Provider(format!("stripe {status}: {message}")));
        }

        let session: CheckoutSession = response.json().await?;
        session
            .url
            .ok_or_else(|| PaymentError::Provider("checkout session has no url".to_string()))
    }

    fn parse_webhook(&self, headers: &HeaderMap, body: &[u8]) -> Result<WebhookOutcome, PaymentError> {
        self.verify_signature(headers, body)?;

        let event: StripeEvent =
            serde_json::from_slice(body).map_err(|e| PaymentError::Malformed(e.to_string()))?;
        if event.event_type != CHECKOUT_COMPLETED {
            return Ok(WebhookOutcome::Ignored(format!("event {}", event.event_type)));
        }

        let session = event.data.object;
        let identity = session
            .metadata
            .get("phone_number")
            .map(|p| normalize_identity(p))
            .filter(|i| !i.is_empty());
        let Some(identity) = identity else {
            return Ok(WebhookOutcome::Ignored(format!(
                "session {} has no phone_number metadata",
                session.id
            )));
        };

        Ok(WebhookOutcome::Completed(PaymentConfirmation {
            identity,
            amount: session.amount_total.unwrap_or(0) as f64 / 100.0,
            currency: session.currency.unwrap_or_default().to_uppercase(),
            reference: session.id,
        }))
    }
}
