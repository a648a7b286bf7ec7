//! Review pipeline: stored CV → extracted text → sections → score → report.
//!
//! Flow: retrieve → extract → segment → analyze → (advanced: render report →
//!       upload → link → email) → archive.
//!
//! Stages run strictly in sequence. Every slow step is bounded by
//! `step_timeout`; a timeout counts as a failure of that step. Scoring never
//! fails (the scorer degrades internally) and email never fails the review.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::analysis::scoring::CvScorer;
use crate::analysis::segmenter::segment;
use crate::document::{extract_blocking, PDF_MIME};
use crate::errors::ReviewError;
use crate::integrations::mailer::{DeliveryReport, EmailAttachment, Mailer, OutboundEmail};
use crate::integrations::storage::{file_name_of, ObjectStore};
use crate::integrations::store::ReviewArchive;
use crate::models::review::ReviewResult;
use crate::models::session::ReviewType;
use crate::report::{build_report, email};

/// Collaborators and limits the pipeline needs.
#[derive(Clone)]
pub struct ReviewServices {
    pub objects: Arc<dyn ObjectStore>,
    pub archive: Arc<dyn ReviewArchive>,
    pub scorer: Arc<dyn CvScorer>,
    pub mailer: Arc<dyn Mailer>,
    pub step_timeout: Duration,
    pub report_link_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct ReviewRequest<'a> {
    pub identity: &'a str,
    pub cv_ref: &'a str,
    pub review_type: ReviewType,
    /// Delivery address for the advanced report, if the user gave one.
    pub email: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct CompletedReview {
    pub result: ReviewResult,
    pub report_link: Option<String>,
    pub record_id: String,
}

impl ReviewServices {
    pub async fn run_review(&self, request: ReviewRequest<'_>) -> Result<CompletedReview, ReviewError> {
        let identity = request.identity;

        // Step 1: Fetch the stored CV. A reference swept by retention fails here.
        let bytes = bounded(
            self.step_timeout,
            "CV download",
            ReviewError::StorageFailure,
            self.objects.retrieve(request.cv_ref),
        )
        .await?;
        info!("Retrieved {} ({} bytes) for {identity}", request.cv_ref, bytes.len());

        // Step 2: Extract text. The reference keeps the original extension.
        let document =
            extract_blocking(bytes, request.cv_ref.to_string(), self.step_timeout).await?;

        // Step 3: Segment
        let cv = segment(&document.raw_text, &document.meta);
        info!(
            "Segmented CV for {identity}: {} sections, {} skills, {} words",
            cv.metrics.section_count, cv.metrics.skill_count, cv.metrics.word_count
        );

        // Step 4: Score
        let analysis = self.scorer.analyze(&cv, request.review_type).await;
        info!(
            "Scored CV for {identity}: {}/100 via {} ({} insights)",
            analysis.improvement_score,
            analysis.provider.as_str(),
            analysis.insights.len()
        );

        let mut result = ReviewResult {
            identity: identity.to_string(),
            review_type: request.review_type,
            cv_file_name: file_name_of(request.cv_ref).to_string(),
            timestamp: Utc::now(),
            improvement_score: analysis.improvement_score,
            insights: analysis.insights,
            detected_sections: analysis.detected_sections,
            metrics: analysis.metrics,
            provider: analysis.provider,
            report_ref: None,
            email_sent: None,
        };

        // Steps 5-8: Advanced reviews also get a report, a link, and maybe an email.
        let mut report_link = None;
        if request.review_type.is_advanced() {
            let report = self.render_report(result.clone()).await?;
            let report_ref = self.store_bytes(identity, "cv-review-report", "pdf", &report).await?;
            let link = bounded(
                self.step_timeout,
                "report link",
                ReviewError::StorageFailure,
                self.objects.retrievable_link(&report_ref, self.report_link_ttl),
            )
            .await?;

            result.report_ref = Some(report_ref);
            if let Some(address) = request.email {
                let delivery = self.email_report(address, &result, &link, report).await;
                result.email_sent = Some(delivery.success);
            }
            report_link = Some(link);
        }

        // Step 9: Archive. The record is immutable from here on.
        let record_id = self
            .archive
            .append(identity, &result)
            .await
            .map_err(|e| ReviewError::StorageFailure(format!("archiving review: {e}")))?;

        Ok(CompletedReview {
            result,
            report_link,
            record_id,
        })
    }

    async fn render_report(&self, review: ReviewResult) -> Result<Vec<u8>, ReviewError> {
        let task = tokio::task::spawn_blocking(move || build_report(&review));
        match tokio::time::timeout(self.step_timeout, task).await {
            Ok(Ok(rendered)) => rendered,
            Ok(Err(join_error)) => Err(ReviewError::ReportGenerationFailed(format!(
                "render task aborted: {join_error}"
            ))),
            Err(_) => Err(ReviewError::ReportGenerationFailed(format!(
                "rendering exceeded {}s",
                self.step_timeout.as_secs()
            ))),
        }
    }

    /// Writes `bytes` to a temporary file and uploads it under the identity's namespace.
    pub async fn store_bytes(
        &self,
        identity: &str,
        file_stem: &str,
        extension: &str,
        bytes: &[u8],
    ) -> Result<String, ReviewError> {
        let file = tempfile::Builder::new()
            .prefix(&format!("{file_stem}-"))
            .suffix(&format!(".{extension}"))
            .tempfile()
            .map_err(|e| ReviewError::StorageFailure(format!("temp file: {e}")))?;
        tokio::fs::write(file.path(), bytes)
            .await
            .map_err(|e| ReviewError::StorageFailure(format!("writing temp file: {e}")))?;

        let file_ref = bounded(
            self.step_timeout,
            "upload",
            ReviewError::StorageFailure,
            self.objects.store(file.path(), identity),
        )
        .await?;
        info!("Stored {file_ref} for {identity}");
        Ok(file_ref)
    }

    async fn email_report(
        &self,
        address: &str,
        review: &ReviewResult,
        link: &str,
        report: Vec<u8>,
    ) -> DeliveryReport {
        let outbound = OutboundEmail {
            to: address.to_string(),
            subject: email::SUBJECT.to_string(),
            html: email::render_html(review, link),
            text: email::render_text(review, link),
            attachment: Some(EmailAttachment {
                file_name: email::ATTACHMENT_NAME.to_string(),
                content_type: PDF_MIME.to_string(),
                bytes: report,
            }),
        };

        let delivery = tokio::time::timeout(self.step_timeout, self.mailer.send(outbound))
            .await
            .unwrap_or_else(|_| {
                DeliveryReport::failed(format!("email exceeded {}s", self.step_timeout.as_secs()))
            });
        if let Some(error) = &delivery.error {
            warn!("Report email to {address} failed: {error}");
        }
        delivery
    }
}

/// Runs `work` with an upper bound; a timeout becomes `on_timeout(..)`.
pub(crate) async fn bounded<T>(
    limit: Duration,
    step: &str,
    on_timeout: fn(String) -> ReviewError,
    work: impl Future<Output = Result<T, ReviewError>>,
) -> Result<T, ReviewError> {
    tokio::time::timeout(limit, work)
        .await
        .unwrap_or_else(|_| Err(on_timeout(format!("{step} exceeded {}s", limit.as_secs()))))
}
