//! Outbound WhatsApp messages and inbound media downloads via Twilio.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use reqwest::Client;
use sha1::Sha1;
use tracing::{debug, warn};

use crate::errors::ReviewError;
use crate::integrations::http_client;

const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";
/// Largest attachment accepted from a chat message.
pub const MAX_ATTACHMENT_BYTES: u64 = 5 * 1024 * 1024;

#[async_trait]
pub trait Messenger: Send + Sync {
    /// Sends a free-form text to a normalized identity.
    async fn send_text(&self, identity: &str, body: &str) -> Result<(), ReviewError>;
    /// Downloads an attachment the transport announced in an inbound message.
    async fn fetch_media(&self, url: &str) -> Result<Vec<u8>, ReviewError>;
}

#[derive(Clone)]
pub struct TwilioMessenger {
    client: Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

impl TwilioMessenger {
    pub fn new(
        account_sid: String,
        auth_token: String,
        from_number: String,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            account_sid,
            auth_token,
            from_number,
        })
    }
}

/// Transport address for a normalized identity.
pub fn whatsapp_address(number: &str) -> String {
    let number = number.trim().trim_start_matches("whatsapp:");
    if number.starts_with('+') {
        format!("whatsapp:{number}")
    } else {
        format!("whatsapp:+{number}")
    }
}

/// Checks `X-Twilio-Signature` on inbound webhooks: base64 HMAC-SHA1 keyed by
/// the auth token over the public URL followed by every form field as
/// `key + value`, sorted by key.
#[derive(Clone)]
pub struct TwilioRequestValidator {
    auth_token: String,
    webhook_url: String,
}

impl TwilioRequestValidator {
    pub fn new(auth_token: String, webhook_url: String) -> Self {
        Self {
            auth_token,
            webhook_url,
        }
    }

    fn mac_over(&self, params: &[(String, String)]) -> Option<Hmac<Sha1>> {
        let mut sorted: Vec<&(String, String)> = params.iter().collect();
        sorted.sort();

        let mut mac = Hmac::<Sha1>::new_from_slice(self.auth_token.as_bytes()).ok()?;
        mac.update(self.webhook_url.as_bytes());
        for (key, value) in sorted {
            mac.update(key.as_bytes());
            mac.update(value.as_bytes());
        }
        Some(mac)
    }

    pub fn is_valid(&self, signature: Option<&str>, params: &[(String, String)]) -> bool {
        let (Some(signature), Some(mac)) = (signature, self.mac_over(params)) else {
            return false;
        };
        match STANDARD.decode(signature.trim()) {
            Ok(expected) => mac.verify_slice(&expected).is_ok(),
            Err(_) => false,
        }
    }
}

fn check_attachment_size(len: u64) -> Result<(), ReviewError> {
    if len > MAX_ATTACHMENT_BYTES {
        return Err(ReviewError::AttachmentTooLarge(len));
    }
    Ok(())
}

#[async_trait]
impl Messenger for TwilioMessenger {
    async fn send_text(&self, identity: &str, body: &str) -> Result<(), ReviewError> {
        let url = format!("{TWILIO_API_BASE}/Accounts/{}/Messages.json", self.account_sid);
        let to = whatsapp_address(identity);
        let from = whatsapp_address(&self.from_number);

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to.as_str()), ("From", from.as_str()), ("Body", body)])
            .send()
            .await
            .map_err(|e| ReviewError::DeliveryFailure(format!("twilio request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!("Twilio returned {status} sending to {to}: {detail}");
            return Err(ReviewError::DeliveryFailure(format!("twilio status {status}")));
        }

        debug!("Sent WhatsApp message to {to}");
        Ok(())
    }

    async fn fetch_media(&self, url: &str) -> Result<Vec<u8>, ReviewError> {
        let mut response = self
            .client
            .get(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await
            .map_err(|e| ReviewError::StorageFailure(format!("media download failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReviewError::StorageFailure(format!(
                "media download returned {status}"
            )));
        }
        if let Some(declared) = response.content_length() {
            check_attachment_size(declared)?;
        }

        // Content-Length can be absent or wrong, so the cap holds while reading too.
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ReviewError::StorageFailure(format!("media body unreadable: {e}")))?
        {
            check_attachment_size((body.len() + chunk.len()) as u64)?;
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}
