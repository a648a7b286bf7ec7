//! Object storage for uploaded CVs and generated reports.
//!
//! Keys are namespaced by sanitized identity so the retention sweep and
//! per-user lookups can scope by prefix: `cv-uploads/{identity}/{millis}-{file}`.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use chrono::Utc;
use tracing::info;

use crate::errors::ReviewError;
use crate::models::session::normalize_identity;

const UPLOAD_PREFIX: &str = "cv-uploads";

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Uploads `local_file` under the identity's namespace and returns its reference.
    async fn store(&self, local_file: &Path, identity: &str) -> Result<String, ReviewError>;
    async fn retrieve(&self, file_ref: &str) -> Result<Vec<u8>, ReviewError>;
    async fn retrievable_link(&self, file_ref: &str, ttl: Duration) -> Result<String, ReviewError>;
    async fn delete(&self, file_ref: &str) -> Result<(), ReviewError>;
}

/// Builds the storage key for `file_name` owned by `identity`.
pub fn storage_key(identity: &str, file_name: &str) -> String {
    let safe_name: String = file_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    format!(
        "{UPLOAD_PREFIX}/{}/{}-{}",
        normalize_identity(identity),
        Utc::now().timestamp_millis(),
        safe_name
    )
}

/// File name part of a storage reference.
pub fn file_name_of(file_ref: &str) -> &str {
    file_ref.rsplit('/').next().unwrap_or(file_ref)
}

fn content_type_for(file_name: &str) -> &'static str {
    match file_name.rsplit('.').next().map(str::to_ascii_lowercase).as_deref() {
        Some("pdf") => crate::document::PDF_MIME,
        Some("docx") => crate::document::DOCX_MIME,
        _ => "application/octet-stream",
    }
}

pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Store {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn store(&self, local_file: &Path, identity: &str) -> Result<String, ReviewError> {
        let file_name = local_file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload.bin");
        let bytes = tokio::fs::read(local_file)
            .await
            .map_err(|e| ReviewError::StorageFailure(format!("cannot read {file_name}: {e}")))?;
        let key = storage_key(identity, file_name);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(content_type_for(file_name))
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| ReviewError::StorageFailure(format!("{}", DisplayErrorContext(&e))))?;

        info!("Stored {key} in {}", self.bucket);
        Ok(key)
    }

    async fn retrieve(&self, file_ref: &str) -> Result<Vec<u8>, ReviewError> {
        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(file_ref)
            .send()
            .await
            .map_err(|e| ReviewError::StorageFailure(format!("{}", DisplayErrorContext(&e))))?;

        let data = object
            .body
            .collect()
            .await
            .map_err(|e| ReviewError::StorageFailure(format!("reading {file_ref}: {e}")))?;
        Ok(data.into_bytes().to_vec())
    }

    async fn retrievable_link(&self, file_ref: &str, ttl: Duration) -> Result<String, ReviewError> {
        let presigning = PresigningConfig::expires_in(ttl)
            .map_err(|e| ReviewError::StorageFailure(format!("invalid link ttl: {e}")))?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(file_ref)
            .presigned(presigning)
            .await
            .map_err(|e| ReviewError::StorageFailure(format!("{}", DisplayErrorContext(&e))))?;
        Ok(request.uri().to_string())
    }

    async fn delete(&self, file_ref: &str) -> Result<(), ReviewError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(file_ref)
            .send()
            .await
            .map_err(|e| ReviewError::StorageFailure(format!("{}", DisplayErrorContext(&e))))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_key_is_namespaced_by_sanitized_identity() {
        let key = storage_key("whatsapp:+2348012345678", "my cv (final).pdf");
        let parts: Vec<&str> = key.split('/').collect();
        assert_eq!(parts[0], "cv-uploads");
        assert_eq!(parts[1], "2348012345678");
        assert!(parts[2].ends_with("-my_cv__final_.pdf"));
        assert_eq!(parts.len(), 3);
    }

    #[test]
    fn test_file_name_of_reference() {
        assert_eq!(file_name_of("cv-uploads/1/17-cv.pdf"), "17-cv.pdf");
        assert_eq!(file_name_of("plain.pdf"), "plain.pdf");
    }

    #[test]
    fn test_content_type_from_extension() {
        assert_eq!(content_type_for("a.PDF"), crate::document::PDF_MIME);
        assert_eq!(content_type_for("a.docx"), crate::document::DOCX_MIME);
        assert_eq!(content_type_for("a"), "application/octet-stream");
    }
}
