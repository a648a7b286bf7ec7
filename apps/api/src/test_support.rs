//! In-memory collaborators and document fixtures shared by the unit tests.

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderMap;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use serde::Deserialize;
use uuid::Uuid;

use crate::analysis::scoring::LocalScorer;
use crate::conversation::{Conversation, ConversationDeps, ReviewServices};
use crate::errors::ReviewError;
use crate::integrations::dedup::DeliveryDeduplicator;
use crate::integrations::mailer::{DeliveryReport, Mailer, OutboundEmail};
use crate::integrations::messaging::{Messenger, MAX_ATTACHMENT_BYTES};
use crate::integrations::payments::{
    PaymentConfirmation, PaymentError, PaymentGateway, PaymentLinks, WebhookOutcome,
};
use crate::integrations::storage::{storage_key, ObjectStore};
use crate::integrations::store::{ProfileStore, ReviewArchive, SessionStore};
use crate::models::review::ReviewResult;
use crate::models::session::{normalize_identity, ConversationState, ReviewType, Session};
use crate::state::AppState;

/// Bound used for every slow step in harness-built services.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(10);
pub const CHECKOUT_LINK: &str = "https://pay.example.test/checkout/abc";
pub const SUCCESS_URL: &str = "https://cv.example.test/payment-success";
pub const TEST_SIGNATURE_HEADER: &str = "x-test-signature";

/// Body lines carry punctuation or digits so none of them reads as a heading.
pub const SAMPLE_CV: &str = "Jane Doe
Email: jane@example.com | Phone: +234 801 234 5678
linkedin.com/in/jane-doe

Summary
Backend engineer with 8 years of experience building payment and messaging systems in Rust and Go.

Experience
Senior Engineer, Acme Corp (2019 - 2024)
- Led the migration of 40 services to Kubernetes, cutting deploy time by 60%.
- Built a billing pipeline processing 2M events per day.

Education
BSc Computer Science, University of Lagos (2015)

Skills
Rust, Go, PostgreSQL, Redis, Kubernetes, Docker, gRPC, AWS, Terraform, Kafka";

// ────────────────────────────────────────────────────────────────────────────
// Document fixtures
// ────────────────────────────────────────────────────────────────────────────

/// Single-page PDF drawing one line of Helvetica per entry, 14pt apart.
/// Empty entries leave a gap without drawing anything.
pub fn pdf_fixture(lines: &[&str]) -> Vec<u8> {
    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), Object::Integer(12)]),
        Operation::new("Td", vec![Object::Integer(72), Object::Integer(760)]),
    ];
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            operations.push(Operation::new(
                "Td",
                vec![Object::Integer(0), Object::Integer(-14)],
            ));
        }
        if !line.is_empty() {
            operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
        }
    }
    operations.push(Operation::new("ET", vec![]));

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let content = Content { operations };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => Object::Integer(1),
            "Resources" => resources_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(595),
                Object::Integer(842),
            ],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

/// Minimal DOCX: one paragraph per entry with an optional paragraph style.
/// Text goes in unescaped so tests can embed entity references.
pub fn docx_fixture(paragraphs: &[(Option<&str>, &str)]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|(style, text)| {
            let properties = style
                .map(|s| format!(r#"<w:pPr><w:pStyle w:val="{s}"/></w:pPr>"#))
                .unwrap_or_default();
            format!(r#"<w:p>{properties}<w:r><w:t xml:space="preserve">{text}</w:t></w:r></w:p>"#)
        })
        .collect();
    let document = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
    );
    let styles = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:style w:type="paragraph" w:styleId="Normal"/><w:style w:type="paragraph" w:styleId="Heading1"/><w:style w:type="paragraph" w:styleId="Title"/></w:styles>"#;

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    writer.start_file("word/document.xml", options).unwrap();
    writer.write_all(document.as_bytes()).unwrap();
    writer.start_file("word/styles.xml", options).unwrap();
    writer.write_all(styles.as_bytes()).unwrap();
    writer.finish().unwrap().into_inner()
}

// ────────────────────────────────────────────────────────────────────────────
// Stores
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    upserts: AtomicUsize,
    failing_reads: AtomicBool,
    failing_writes: AtomicBool,
}

impl MemorySessionStore {
    pub fn seed(&self, session: Session) {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.identity.clone(), session);
    }

    /// Stored snapshot, bypassing the failure switches.
    pub fn stored(&self, identity: &str) -> Option<Session> {
        self.sessions.lock().unwrap().get(identity).cloned()
    }

    pub fn upserts(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub fn fail_reads(&self) {
        self.failing_reads.store(true, Ordering::SeqCst);
    }

    pub fn fail_writes(&self) {
        self.failing_writes.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, identity: &str) -> Result<Option<Session>, ReviewError> {
        if self.failing_reads.load(Ordering::SeqCst) {
            return Err(ReviewError::PersistenceFailure("read refused".into()));
        }
        Ok(self.stored(identity))
    }

    async fn upsert(&self, session: &Session) -> Result<(), ReviewError> {
        if self.failing_writes.load(Ordering::SeqCst) {
            return Err(ReviewError::PersistenceFailure("write refused".into()));
        }
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.seed(session.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryProfiles {
    emails: Mutex<HashMap<String, String>>,
    failing: AtomicBool,
}

impl MemoryProfiles {
    pub fn email(&self, identity: &str) -> Option<String> {
        self.emails.lock().unwrap().get(identity).cloned()
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProfileStore for MemoryProfiles {
    async fn save_email(&self, identity: &str, email: &str) -> Result<(), ReviewError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ReviewError::PersistenceFailure("profile write refused".into()));
        }
        self.emails
            .lock()
            .unwrap()
            .insert(identity.to_string(), email.to_string());
        Ok(())
    }

    async fn email_for(&self, identity: &str) -> Result<Option<String>, ReviewError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ReviewError::PersistenceFailure("profile read refused".into()));
        }
        Ok(self.email(identity))
    }
}

#[derive(Default)]
pub struct MemoryArchive {
    records: Mutex<Vec<ReviewResult>>,
    failing: AtomicBool,
}

impl MemoryArchive {
    pub fn records(&self) -> Vec<ReviewResult> {
        self.records.lock().unwrap().clone()
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ReviewArchive for MemoryArchive {
    async fn append(&self, _identity: &str, review: &ReviewResult) -> Result<String, ReviewError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ReviewError::PersistenceFailure("archive insert refused".into()));
        }
        self.records.lock().unwrap().push(review.clone());
        Ok(Uuid::new_v4().to_string())
    }
}

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    /// Stores `bytes` as if uploaded by `identity` and returns the reference.
    pub fn put(&self, identity: &str, file_name: &str, bytes: Vec<u8>) -> String {
        let key = storage_key(identity, file_name);
        self.objects.lock().unwrap().insert(key.clone(), bytes);
        key
    }

    pub fn get(&self, file_ref: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(file_ref).cloned()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn store(&self, local_file: &Path, identity: &str) -> Result<String, ReviewError> {
        let bytes = tokio::fs::read(local_file)
            .await
            .map_err(|e| ReviewError::StorageFailure(e.to_string()))?;
        let file_name = local_file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload.bin");
        Ok(self.put(identity, file_name, bytes))
    }

    async fn retrieve(&self, file_ref: &str) -> Result<Vec<u8>, ReviewError> {
        self.get(file_ref)
            .ok_or_else(|| ReviewError::StorageFailure(format!("no such object {file_ref}")))
    }

    async fn retrievable_link(&self, file_ref: &str, ttl: Duration) -> Result<String, ReviewError> {
        if self.get(file_ref).is_none() {
            return Err(ReviewError::StorageFailure(format!("no such object {file_ref}")));
        }
        Ok(format!(
            "https://files.example.test/{file_ref}?expires_in={}",
            ttl.as_secs()
        ))
    }

    async fn delete(&self, file_ref: &str) -> Result<(), ReviewError> {
        self.objects.lock().unwrap().remove(file_ref);
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Outbound collaborators
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<(String, String)>>,
    media: Mutex<HashMap<String, Vec<u8>>>,
    failing: AtomicBool,
    hanging: AtomicBool,
}

impl RecordingMessenger {
    pub fn add_media(&self, url: &str, bytes: Vec<u8>) {
        self.media.lock().unwrap().insert(url.to_string(), bytes);
    }

    pub fn texts_to(&self, identity: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _)| to == identity)
            .map(|(_, body)| body.clone())
            .collect()
    }

    pub fn fail_sends(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// Sends never complete, like a transport behind a dead connection.
    pub fn hang_sends(&self) {
        self.hanging.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_text(&self, identity: &str, body: &str) -> Result<(), ReviewError> {
        if self.hanging.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(ReviewError::DeliveryFailure("transport refused".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((identity.to_string(), body.to_string()));
        Ok(())
    }

    /// Applies the same size cap as the Twilio adapter.
    async fn fetch_media(&self, url: &str) -> Result<Vec<u8>, ReviewError> {
        let bytes = self
            .media
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| ReviewError::StorageFailure(format!("media {url} not found")))?;
        if bytes.len() as u64 > MAX_ATTACHMENT_BYTES {
            return Err(ReviewError::AttachmentTooLarge(bytes.len() as u64));
        }
        Ok(bytes)
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutboundEmail>>,
    failure: Mutex<Option<String>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail_with(&self, error: &str) {
        *self.failure.lock().unwrap() = Some(error.to_string());
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: OutboundEmail) -> DeliveryReport {
        if let Some(error) = self.failure.lock().unwrap().clone() {
            return DeliveryReport::failed(error);
        }
        self.sent.lock().unwrap().push(email);
        DeliveryReport::delivered()
    }
}

/// Payment gateway with a fixed checkout link. Its webhook format is a plain
/// JSON body, accepted only with `x-test-signature: valid`.
pub struct StaticGateway {
    link: Option<String>,
    hangs: bool,
}

impl StaticGateway {
    pub fn with_link(link: &str) -> Self {
        Self {
            link: Some(link.to_string()),
            hangs: false,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            link: None,
            hangs: false,
        }
    }

    /// Checkout creation never answers, like a provider behind a dead connection.
    pub fn hanging() -> Self {
        Self {
            link: Some(CHECKOUT_LINK.to_string()),
            hangs: true,
        }
    }
}

#[derive(Deserialize)]
struct TestEvent {
    event: String,
    identity: Option<String>,
    amount: Option<f64>,
    currency: Option<String>,
    reference: Option<String>,
}

#[async_trait]
impl PaymentGateway for StaticGateway {
    fn provider(&self) -> &'static str {
        "static"
    }

    async fn create_checkout(
        &self,
        _identity: &str,
        _review_type: ReviewType,
    ) -> Result<String, PaymentError> {
        if self.hangs {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.link
            .clone()
            .ok_or_else(|| PaymentError::Provider("checkout disabled".into()))
    }

    fn parse_webhook(&self, headers: &HeaderMap, body: &[u8]) -> Result<WebhookOutcome, PaymentError> {
        let signed = headers
            .get(TEST_SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            == Some("valid");
        if !signed {
            return Err(PaymentError::InvalidSignature);
        }
        let event: TestEvent =
            serde_json::from_slice(body).map_err(|e| PaymentError::Malformed(e.to_string()))?;
        if event.event != "paid" {
            return Ok(WebhookOutcome::Ignored(event.event));
        }
        Ok(WebhookOutcome::Completed(PaymentConfirmation {
            identity: normalize_identity(&event.identity.unwrap_or_default()),
            amount: event.amount.unwrap_or_default(),
            currency: event.currency.unwrap_or_default(),
            reference: event.reference.unwrap_or_default(),
        }))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Harness
// ────────────────────────────────────────────────────────────────────────────

/// Every collaborator as an inspectable fake, plus the local scorer.
pub struct Harness {
    pub sessions: Arc<MemorySessionStore>,
    pub profiles: Arc<MemoryProfiles>,
    pub objects: Arc<MemoryObjectStore>,
    pub archive: Arc<MemoryArchive>,
    pub messenger: Arc<RecordingMessenger>,
    pub mailer: Arc<RecordingMailer>,
    pub gateway: Arc<StaticGateway>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            sessions: Arc::default(),
            profiles: Arc::default(),
            objects: Arc::default(),
            archive: Arc::default(),
            messenger: Arc::default(),
            mailer: Arc::default(),
            gateway: Arc::new(StaticGateway::with_link(CHECKOUT_LINK)),
        }
    }

    pub fn services(&self) -> ReviewServices {
        ReviewServices {
            objects: self.objects.clone(),
            archive: self.archive.clone(),
            scorer: Arc::new(LocalScorer),
            mailer: self.mailer.clone(),
            step_timeout: STEP_TIMEOUT,
            report_link_ttl: Duration::from_secs(7 * 24 * 3600),
        }
    }

    pub fn payment_links(&self) -> Arc<PaymentLinks> {
        Arc::new(PaymentLinks::new(
            self.gateway.clone(),
            SUCCESS_URL,
            STEP_TIMEOUT,
        ))
    }

    pub fn conversation(&self) -> Conversation {
        Conversation::new(ConversationDeps {
            sessions: self.sessions.clone(),
            profiles: self.profiles.clone(),
            messenger: self.messenger.clone(),
            payments: self.payment_links(),
            review: self.services(),
        })
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            conversation: self.conversation(),
            payments: self.payment_links(),
            dedup: DeliveryDeduplicator::disabled(),
            inbound_validator: None,
        }
    }

    pub fn state_of(&self, identity: &str) -> ConversationState {
        self.sessions
            .stored(identity)
            .map(|s| s.state)
            .expect("session was persisted")
    }
}
