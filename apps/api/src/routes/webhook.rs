//! POST /webhook: one inbound WhatsApp message per Twilio form post.
//!
//! The conversation runs inline and its reply goes back as TwiML, so the
//! transport delivers it without a separate send.

use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Form,
};
use tracing::{info, warn};

use crate::conversation::InboundMessage;
use crate::errors::AppError;
use crate::integrations::payments::header_str;
use crate::state::AppState;

const TWILIO_SIGNATURE_HEADER: &str = "x-twilio-signature";

/// The fields of a Twilio messaging webhook this service reads.
#[derive(Debug, Default, PartialEq)]
pub struct TwilioInbound {
    pub from: String,
    pub body: String,
    pub message_sid: String,
    pub media_url: Option<String>,
    pub media_content_type: Option<String>,
}

impl TwilioInbound {
    pub fn from_params(params: &[(String, String)]) -> Self {
        let field = |name: &str| {
            params
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        };
        let num_media: u32 = field("NumMedia")
            .and_then(|n| n.trim().parse().ok())
            .unwrap_or(0);
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

        let (media_url, media_content_type) = if num_media > 0 {
            (non_empty(field("MediaUrl0")), non_empty(field("MediaContentType0")))
        } else {
            (None, None)
        };

        Self {
            from: field("From").unwrap_or_default(),
            body: field("Body").unwrap_or_default(),
            message_sid: field("MessageSid").unwrap_or_default(),
            media_url,
            media_content_type,
        }
    }

    fn into_message(self) -> InboundMessage {
        InboundMessage {
            sender_id: self.from,
            text: self.body,
            attachment_url: self.media_url,
            attachment_content_type: self.media_content_type,
        }
    }
}

/// TwiML document carrying at most one reply message.
pub fn render_twiml(reply: Option<&str>) -> String {
    match reply {
        Some(text) => format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Message>{}</Message></Response>",
            quick_xml::escape::escape(text)
        ),
        None => "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response></Response>".to_string(),
    }
}

fn twiml_response(reply: Option<&str>) -> Response {
    ([(header::CONTENT_TYPE, "text/xml")], render_twiml(reply)).into_response()
}

/// POST /webhook
pub async fn handle_inbound_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(params): Form<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    if let Some(validator) = &state.inbound_validator {
        if !validator.is_valid(header_str(&headers, TWILIO_SIGNATURE_HEADER), &params) {
            warn!("Rejected inbound webhook with a bad Twilio signature");
            return Err(AppError::InvalidSignature);
        }
    }

    let inbound = TwilioInbound::from_params(&params);
    if inbound.from.trim().is_empty() {
        return Err(AppError::Validation("missing sender ('From')".to_string()));
    }

    if !state.dedup.first_delivery(&inbound.message_sid).await {
        info!("Duplicate delivery of {}; not processing again", inbound.message_sid);
        return Ok(twiml_response(None));
    }

    let reply = state.conversation.process(&inbound.into_message()).await;
    Ok(twiml_response(Some(&reply)))
}
