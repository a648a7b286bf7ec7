use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha512;

use super::{header_str, PaymentConfirmation, PaymentError, PaymentGateway, WebhookOutcome};
use crate::config::Config;
use crate::integrations::http_client;
use crate::models::session::{normalize_identity, ReviewType};

const INITIALIZE_URL: &str = "https://api.paystack.co/transaction/initialize";
const SIGNATURE_HEADER: &str = "x-paystack-signature";
const CHARGE_SUCCESS: &str = "charge.success";

type HmacSha512 = Hmac<Sha512>;

pub struct PaystackGateway {
    client: Client,
    secret_key: Option<String>,
    /// Minor units (kobo for NGN).
    amount: u64,
    currency: String,
    callback_url: String,
}

impl PaystackGateway {
    pub fn from_config(config: &Config) -> reqwest::Result<Self> {
        Ok(Self::new(
            http_client(Duration::from_secs(config.step_timeout_secs))?,
            config.paystack_secret_key.clone(),
            config.advanced_review_price,
            config.payment_currency.clone(),
            config.payment_success_url.clone(),
        ))
    }

    pub fn new(
        client: Client,
        secret_key: Option<String>,
        amount: u64,
        currency: String,
        callback_url: String,
    ) -> Self {
        Self {
            client,
            secret_key,
            amount,
            currency,
            callback_url,
        }
    }

    fn secret(&self) -> Result<&str, PaymentError> {
        self.secret_key
            .as_deref()
            .ok_or(PaymentError::NotConfigured("PAYSTACK_SECRET_KEY"))
    }

    fn verify_signature(&self, headers: &HeaderMap, body: &[u8]) -> Result<(), PaymentError> {
        let signature = header_str(headers, SIGNATURE_HEADER).ok_or(PaymentError::InvalidSignature)?;
        let expected = hex::decode(signature.trim()).map_err(|_| PaymentError::InvalidSignature)?;
        let mut mac = HmacSha512::new_from_slice(self.secret()?.as_bytes())
            .map_err(|_| PaymentError::InvalidSignature)?;
        mac.update(body);
        mac.verify_slice(&expected)
            .map_err(|_| PaymentError::InvalidSignature)
    }
}

#[derive(Debug, Deserialize)]
struct InitializeResponse {
    status: bool,
    message: Option<String>,
    data: Option<InitializeData>,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: String,
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    event: String,
    data: ChargeData,
}

#[derive(Debug, Deserialize)]
struct ChargeData {
    reference: String,
    amount: f64,
    currency: String,
    #[serde(default)]
    metadata: Value,
}

/// Paystack delivers metadata either as an object or as a JSON string.
fn metadata_phone(metadata: &Value) -> Option<String> {
    let phone = match metadata {
        Value::String(raw) => serde_json::from_str::<Value>(raw)
            .ok()?
            .get("phone_number")?
            .as_str()?
            .to_string(),
        other => other.get("phone_number")?.as_str()?.to_string(),
    };
    let identity = normalize_identity(&phone);
    (!identity.is_empty()).then_some(identity)
}

#[async_trait]
impl PaymentGateway for PaystackGateway {
    fn provider(&self) -> &'static str {
        "paystack"
    }

    async fn create_checkout(
        &self,
        identity: &str,
        review_type: ReviewType,
    ) -> Result<String, PaymentError> {
        let secret = self.secret()?;
        let body = json!({
            "amount": self.amount,
            "currency": self.currency,
            // Paystack requires an email; the real one is collected later in chat.
            "email": format!("{identity}@temporary.email"),
            "reference": format!("cvreview_{}_{identity}", Utc::now().timestamp_millis()),
            "callback_url": self.callback_url,
            "metadata": {
                "phone_number": identity,
                "service": format!("cv_{}_review", review_type.as_str()),
            },
        });

        let response: InitializeResponse = self
            .client
            .post(INITIALIZE_URL)
            .bearer_auth(secret)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        match (response.status, response.data) {
            (true, Some(data)) => Ok(data.authorization_url),
            _ => Err(PaymentError::Provider(
                response
                    .message
                    .unwrap_or_else(|| "transaction initialization failed".to_string()),
            )),
        }
    }

    fn parse_webhook(&self, headers: &HeaderMap, body: &[u8]) -> Result<WebhookOutcome, PaymentError> {
        self.verify_signature(headers, body)?;

        let event: WebhookEvent =
            serde_json::from_slice(body).map_err(|e| PaymentError::Malformed(e.to_string()))?;
        if event.event != CHARGE_SUCCESS {
            return Ok(WebhookOutcome::Ignored(format!("event {}", event.event)));
        }

        let Some(identity) = metadata_phone(&event.data.metadata) else {
            return Ok(WebhookOutcome::Ignored(format!(
                "charge {} has no phone_number metadata",
                event.data.reference
            )));
        };

        Ok(WebhookOutcome::Completed(PaymentConfirmation {
            identity,
            amount: event.data.amount / 100.0,
            currency: event.data.currency,
            reference: event.data.reference,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "sk_test_secret";

    fn gateway() -> PaystackGateway {
        PaystackGateway::new(
            Client::new(),
            Some(SECRET.into()),
            5000,
            "NGN".into(),
            "https://cv.example.com/success".into(),
        )
    }

    fn signed(body: &[u8]) -> HeaderMap {
        let mut mac = HmacSha512::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(body);
        let mut headers = HeaderMap::new();
        headers.insert(
            SIGNATURE_HEADER,
            HeaderValue::from_str(&hex::encode(mac.finalize().into_bytes())).unwrap(),
        );
        headers
    }

    fn charge(event: &str, metadata: Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "event": event,
            "data": {
                "reference": "cvreview_1_2348012345678",
                "amount": 500000,
                "currency": "NGN",
                "metadata": metadata
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_charge_success_maps_to_confirmation() {
        let body = charge(CHARGE_SUCCESS, json!({"phone_number": "+2348012345678"}));
        let outcome = gateway().parse_webhook(&signed(&body), &body).unwrap();
        assert_eq!(
            outcome,
            WebhookOutcome::Completed(PaymentConfirmation {
                identity: "2348012345678".into(),
                amount: 5000.0,
                currency: "NGN".into(),
                reference: "cvreview_1_2348012345678".into(),
            })
        );
    }

    #[test]
    fn test_string_metadata_is_parsed() {
        let body = charge(
            CHARGE_SUCCESS,
            Value::String(r#"{"phone_number":"whatsapp:+2348012345678"}"#.into()),
        );
        let outcome = gateway().parse_webhook(&signed(&body), &body).unwrap();
        assert!(matches!(outcome, WebhookOutcome::Completed(c) if c.identity == "2348012345678"));
    }

    #[test]
    fn test_tampered_body_is_rejected() {
        let body = charge(CHARGE_SUCCESS, json!({"phone_number": "+2348012345678"}));
        let headers = signed(&body);
        let mut tampered = body.clone();
        tampered.extend_from_slice(b" ");
        let err = gateway().parse_webhook(&headers, &tampered).unwrap_err();
        assert!(matches!(err, PaymentError::InvalidSignature));
    }

    #[test]
    fn test_missing_signature_is_rejected() {
        let body = charge(CHARGE_SUCCESS, json!({}));
        let err = gateway().parse_webhook(&HeaderMap::new(), &body).unwrap_err();
        assert!(matches!(err, PaymentError::InvalidSignature));
    }

    #[test]
    fn test_other_events_and_missing_phone_are_ignored() {
        let body = charge("transfer.success", json!({"phone_number": "+2348012345678"}));
        let outcome = gateway().parse_webhook(&signed(&body), &body).unwrap();
        assert!(matches!(outcome, WebhookOutcome::Ignored(_)));

        let body = charge(CHARGE_SUCCESS, json!({"service": "cv_advanced_review"}));
        let outcome = gateway().parse_webhook(&signed(&body), &body).unwrap();
        assert!(matches!(outcome, WebhookOutcome::Ignored(_)));
    }

    #[tokio::test]
    async fn test_checkout_without_secret_is_not_configured() {
        let gateway = PaystackGateway::new(Client::new(), None, 5000, "NGN".into(), "https://x".into());
        let err = gateway
            .create_checkout("2348012345678", ReviewType::Advanced)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::NotConfigured(_)));
    }
}
