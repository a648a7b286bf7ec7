//! Outbound email over SMTP (STARTTLS relay).
//!
//! `send` never errors: delivery problems come back in the `DeliveryReport`
//! so a failed email can be recorded without failing the review.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, Message, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

use crate::config::Config;
use crate::errors::ReviewError;

static EMAIL_ADDRESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

pub fn is_valid_email(address: &str) -> bool {
    EMAIL_ADDRESS_RE.is_match(address.trim())
}

#[derive(Debug, Clone)]
pub struct EmailAttachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
    pub attachment: Option<EmailAttachment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReport {
    pub success: bool,
    pub error: Option<String>,
}

impl DeliveryReport {
    pub fn delivered() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutboundEmail) -> DeliveryReport;
}

pub struct SmtpMailer {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Without `SMTP_HOST` the mailer stays unconfigured and reports every
    /// send as failed.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let from: Mailbox = format!("{} <{}>", config.email_from_name, config.email_from)
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid EMAIL_FROM '{}': {e}", config.email_from))?;

        let transport = match &config.smtp_host {
            Some(host) => {
                let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?
                    .port(config.smtp_port);
                if let (Some(user), Some(pass)) = (&config.smtp_username, &config.smtp_password) {
                    builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
                }
                info!("SMTP mailer configured ({host}:{})", config.smtp_port);
                Some(builder.build())
            }
            None => {
                warn!("SMTP_HOST not set; report emails will not be delivered");
                None
            }
        };

        Ok(Self { transport, from })
    }

    fn build_message(&self, email: OutboundEmail) -> Result<Message, ReviewError> {
        let to: Mailbox = email
            .to
            .trim()
            .parse()
            .map_err(|e| ReviewError::DeliveryFailure(format!("invalid recipient '{}': {e}", email.to)))?;

        let alternative = MultiPart::alternative_plain_html(email.text, email.html);
        let body = match email.attachment {
            Some(attachment) => {
                let content_type = ContentType::parse(&attachment.content_type).map_err(|e| {
                    ReviewError::DeliveryFailure(format!("bad attachment type: {e}"))
                })?;
                MultiPart::mixed()
                    .multipart(alternative)
                    .singlepart(Attachment::new(attachment.file_name).body(attachment.bytes, content_type))
            }
            None => alternative,
        };

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject)
            .multipart(body)
            .map_err(|e| ReviewError::DeliveryFailure(format!("failed to build email: {e}")))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutboundEmail) -> DeliveryReport {
        if !is_valid_email(&email.to) {
            return DeliveryReport::failed(format!("invalid email address '{}'", email.to));
        }
        let Some(transport) = &self.transport else {
            return DeliveryReport::failed("email delivery is not configured");
        };

        let recipient = email.to.clone();
        let message = match self.build_message(email) {
            Ok(m) => m,
            Err(e) => return DeliveryReport::failed(e.to_string()),
        };

        match transport.send(message).await {
            Ok(_) => {
                info!("Emailed review report to {recipient}");
                DeliveryReport::delivered()
            }
            Err(e) => {
                let failure = ReviewError::DeliveryFailure(format!("SMTP send failed: {e}"));
                warn!("{failure}");
                DeliveryReport::failed(failure.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mailer() -> SmtpMailer {
        SmtpMailer {
            transport: None,
            from: "CV Review <reviews@example.com>".parse().unwrap(),
        }
    }

    fn email(to: &str) -> OutboundEmail {
        OutboundEmail {
            to: to.into(),
            subject: "Your CV Review Report".into(),
            html: "<p>hi</p>".into(),
            text: "hi".into(),
            attachment: Some(EmailAttachment {
                file_name: "cv-review-report.pdf".into(),
                content_type: "application/pdf".into(),
                bytes: b"%PDF-1.5".to_vec(),
            }),
        }
    }

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("jane@example.com"));
        assert!(is_valid_email("  jane.doe+cv@mail.example.co.uk "));
        assert!(!is_valid_email("jane@example"));
        assert!(!is_valid_email("jane example.com"));
        assert!(!is_valid_email("skip"));
    }

    #[test]
    fn test_message_carries_attachment() {
        let message = mailer().build_message(email("jane@example.com")).unwrap();
        let raw = String::from_utf8_lossy(&message.formatted()).to_string();
        assert!(raw.contains("Subject: Your CV Review Report"));
        assert!(raw.contains("multipart/mixed"));
        assert!(raw.contains("cv-review-report.pdf"));
    }

    #[test]
    fn test_invalid_recipient_is_a_delivery_failure() {
        let err = mailer().build_message(email("not an address")).unwrap_err();
        assert!(matches!(err, ReviewError::DeliveryFailure(_)));
    }

    #[tokio::test]
    async fn test_invalid_address_is_rejected_before_sending() {
        let report = mailer().send(email("jane@example")).await;
        assert!(!report.success);
        assert!(report.error.unwrap().contains("invalid email address"));
    }

    #[tokio::test]
    async fn test_unconfigured_mailer_reports_failure() {
        let report = mailer().send(email("jane@example.com")).await;
        assert!(!report.success);
        assert!(report.error.is_some());
    }
}
