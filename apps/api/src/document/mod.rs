//! Document extraction: CV bytes → raw text plus weak structural hints.
//!
//! Two formats are accepted: PDF (page-oriented, text rebuilt from glyph
//! positions) and DOCX (flow document, heading styles preserved).
//! Both parsers are CPU-bound; async callers go through [`extract_blocking`].

pub mod docx;
pub mod pdf;

use std::time::Duration;

use serde::Serialize;

use crate::errors::ReviewError;

pub const PDF_MIME: &str = "application/pdf";
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
}

impl DocumentFormat {
    /// Resolves a MIME type, a bare extension (`pdf`, `.docx`) or a file name/path.
    pub fn from_hint(hint: &str) -> Option<Self> {
        let hint = hint.trim().to_ascii_lowercase();
        match hint.as_str() {
            PDF_MIME => return Some(DocumentFormat::Pdf),
            DOCX_MIME => return Some(DocumentFormat::Docx),
            _ => {}
        }
        let extension = hint.rsplit('.').next().unwrap_or(&hint);
        match extension {
            "pdf" => Some(DocumentFormat::Pdf),
            "docx" => Some(DocumentFormat::Docx),
            _ => None,
        }
    }

    /// Matches a transport-declared content type, which may carry parameters
    /// (`application/pdf; name=cv.pdf`).
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let content_type = content_type.to_ascii_lowercase();
        if content_type.contains(PDF_MIME) {
            Some(DocumentFormat::Pdf)
        } else if content_type.contains(DOCX_MIME) {
            Some(DocumentFormat::Docx)
        } else {
            None
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Docx => "docx",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => PDF_MIME,
            DocumentFormat::Docx => DOCX_MIME,
        }
    }
}

/// Weak signals about document layout. Never treated as ground truth.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StructuredMeta {
    pub page_count: Option<usize>,
    pub pdf_version: Option<String>,
    pub paragraph_count: Option<usize>,
    pub style_count: Option<usize>,
    /// Paragraph texts carrying an explicit heading style (DOCX only).
    pub headings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub raw_text: String,
    pub meta: StructuredMeta,
}

/// Extracts text from `bytes` according to `format_hint`.
///
/// Fails with `UnsupportedFormat` when the hint names neither format and with
/// `ExtractionFailed` when the parser rejects the bytes or no text comes out.
pub fn extract(bytes: &[u8], format_hint: &str) -> Result<ExtractedDocument, ReviewError> {
    let format = DocumentFormat::from_hint(format_hint)
        .ok_or_else(|| ReviewError::UnsupportedFormat(format_hint.to_string()))?;

    let document = match format {
        DocumentFormat::Pdf => pdf::extract_pdf(bytes)?,
        DocumentFormat::Docx => docx::extract_docx(bytes)?,
    };

    if document.raw_text.trim().is_empty() {
        return Err(ReviewError::ExtractionFailed(
            "document contains no extractable text".to_string(),
        ));
    }

    Ok(document)
}

/// Runs [`extract`] on the blocking pool with an upper bound on wall time.
pub async fn extract_blocking(
    bytes: Vec<u8>,
    format_hint: String,
    limit: Duration,
) -> Result<ExtractedDocument, ReviewError> {
    let task = tokio::task::spawn_blocking(move || extract(&bytes, &format_hint));
    match tokio::time::timeout(limit, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(ReviewError::ExtractionFailed(format!(
            "extraction task aborted: {join_error}"
        ))),
        Err(_) => Err(ReviewError::ExtractionFailed(format!(
            "extraction exceeded {}s",
            limit.as_secs()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{docx_fixture, pdf_fixture};

    #[test]
    fn test_format_from_hint_accepts_mime_extension_and_path() {
        assert_eq!(DocumentFormat::from_hint("application/pdf"), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::from_hint(DOCX_MIME), Some(DocumentFormat::Docx));
        assert_eq!(DocumentFormat::from_hint("pdf"), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::from_hint(".DOCX"), Some(DocumentFormat::Docx));
        assert_eq!(
            DocumentFormat::from_hint("cv-uploads/2348012345678/1700000000000-cv.pdf"),
            Some(DocumentFormat::Pdf)
        );
        assert_eq!(DocumentFormat::from_hint("image/png"), None);
        assert_eq!(DocumentFormat::from_hint("notes.txt"), None);
    }

    #[test]
    fn test_format_from_content_type_tolerates_parameters() {
        assert_eq!(
            DocumentFormat::from_content_type("application/pdf; name=cv.pdf"),
            Some(DocumentFormat::Pdf)
        );
        assert_eq!(DocumentFormat::from_content_type("image/png"), None);
        assert_eq!(DocumentFormat::from_content_type("application/msword"), None);
    }

    #[test]
    fn test_extract_rejects_unsupported_hint() {
        let err = extract(b"hello", "image/png").unwrap_err();
        assert!(matches!(err, ReviewError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_extract_rejects_corrupt_pdf() {
        let err = extract(b"%PDF-1.4 this is not really a pdf", "pdf").unwrap_err();
        assert!(matches!(err, ReviewError::ExtractionFailed(_)));
    }

    #[test]
    fn test_extract_dispatches_on_hint() {
        let pdf = extract(&pdf_fixture(&["Jane Doe", "Skills", "Rust, Go"]), PDF_MIME).unwrap();
        assert!(pdf.raw_text.contains("Jane Doe"));
        assert_eq!(pdf.meta.page_count, Some(1));

        let docx = extract(&docx_fixture(&[(None, "Jane Doe")]), "cv.docx").unwrap();
        assert_eq!(docx.raw_text.trim(), "Jane Doe");
    }

    #[tokio::test]
    async fn test_extract_blocking_propagates_failures() {
        let err = extract_blocking(vec![0, 1, 2], "docx".into(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::ExtractionFailed(_)));
    }
}
