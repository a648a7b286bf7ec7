//! Remote CV analysis client: the only module that talks to the analysis API.
//!
//! One POST per review. Transport errors, 429 and 5xx are retried once after a
//! one second pause; anything else is returned to the caller, which falls back
//! to local scoring.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::cv::{ContactInfo, CvData, CvMetrics, SectionName};
use crate::models::session::ReviewType;

const MAX_ATTEMPTS: u32 = 2;
const RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum AnalysisClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("analysis rejected: {0}")]
    Rejected(String),

    #[error("malformed analysis response: {0}")]
    Malformed(String),

    #[error("analysis timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Serialize)]
struct AnalysisRequest<'a> {
    cv_text: &'a str,
    sections: &'a BTreeMap<SectionName, String>,
    contact_info: &'a ContactInfo,
    metrics: &'a CvMetrics,
    review_type: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalysisResponse {
    #[serde(default)]
    success: bool,
    improvement_score: Option<serde_json::Value>,
    insights: Option<Vec<String>>,
    error: Option<String>,
}

/// Validated remote verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteAnalysis {
    pub improvement_score: u8,
    pub insights: Vec<String>,
}

#[derive(Clone)]
pub struct AnalysisClient {
    client: Client,
    api_url: String,
    api_key: String,
    timeout: Duration,
}

impl AnalysisClient {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AnalysisClientError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            api_url: api_url.into(),
            api_key: api_key.into(),
            timeout,
        })
    }

    /// Scores `cv` remotely. The whole exchange, retries included, is bounded
    /// by the configured timeout.
    pub async fn analyze(
        &self,
        cv: &CvData,
        review_type: ReviewType,
    ) -> Result<RemoteAnalysis, AnalysisClientError> {
        let request = AnalysisRequest {
            cv_text: &cv.full_text,
            sections: &cv.sections,
            contact_info: &cv.contact_info,
            metrics: &cv.metrics,
            review_type: review_type.as_str(),
        };

        tokio::time::timeout(self.timeout, self.call(&request))
            .await
            .map_err(|_| AnalysisClientError::Timeout(self.timeout))?
    }

    async fn call(
        &self,
        request: &AnalysisRequest<'_>,
    ) -> Result<RemoteAnalysis, AnalysisClientError> {
        let mut last_error: Option<AnalysisClientError> = None;

        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                warn!(
                    "Analysis call attempt {} failed, retrying after {}ms...",
                    attempt,
                    RETRY_DELAY.as_millis()
                );
                tokio::time::sleep(RETRY_DELAY).await;
            }

            let response = self
                .client
                .post(&self.api_url)
                .bearer_auth(&self.api_key)
                .json(request)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(AnalysisClientError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("Analysis API returned {}: {}", status, body);
                last_error = Some(AnalysisClientError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(AnalysisClientError::Api {
                    status: status.as_u16(),
                    message: body,
                });
            }

            let body = response.text().await?;
            let parsed: AnalysisResponse = serde_json::from_str(&body)?;
            let analysis = validate(parsed)?;

            debug!(
                "Analysis call succeeded: score={}, insights={}",
                analysis.improvement_score,
                analysis.insights.len()
            );

            return Ok(analysis);
        }

        Err(last_error.unwrap_or(AnalysisClientError::Malformed(
            "no attempt was made".to_string(),
        )))
    }
}

/// A response is usable only when it claims success, carries an integer score
/// in [0,100], and a non-empty insight list.
fn validate(response: AnalysisResponse) -> Result<RemoteAnalysis, AnalysisClientError> {
    if !response.success {
        return Err(AnalysisClientError::Rejected(
            response.error.unwrap_or_else(|| "success=false".to_string()),
        ));
    }

    let score = response
        .improvement_score
        .as_ref()
        .and_then(serde_json::Value::as_i64)
        .ok_or_else(|| AnalysisClientError::Malformed("missing integer improvementScore".into()))?;
    let improvement_score = u8::try_from(score)
        .ok()
        .filter(|s| *s <= 100)
        .ok_or_else(|| AnalysisClientError::Malformed(format!("score {score} out of range")))?;

    let insights: Vec<String> = response
        .insights
        .unwrap_or_default()
        .into_iter()
        .map(|i| i.trim().to_string())
        .filter(|i| !i.is_empty())
        .collect();
    if insights.is_empty() {
        return Err(AnalysisClientError::Malformed("no insights".into()));
    }

    Ok(RemoteAnalysis {
        improvement_score,
        insights,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> Result<RemoteAnalysis, AnalysisClientError> {
        validate(serde_json::from_value(value).unwrap())
    }

    #[test]
    fn test_validate_accepts_well_formed_response() {
        let analysis = parse(json!({
            "success": true,
            "improvementScore": 72,
            "insights": ["STRUCTURE: tighten", "Add metrics"]
        }))
        .unwrap();
        assert_eq!(analysis.improvement_score, 72);
        assert_eq!(analysis.insights, vec!["STRUCTURE: tighten", "Add metrics"]);
    }

    #[test]
    fn test_validate_rejects_unsuccessful_response() {
        let err = parse(json!({"success": false, "error": "quota"})).unwrap_err();
        assert!(matches!(err, AnalysisClientError::Rejected(m) if m == "quota"));
    }

    #[test]
    fn test_validate_rejects_out_of_range_or_fractional_score() {
        for score in [json!(101), json!(-3), json!(55.5), json!("80")] {
            let err = parse(json!({"success": true, "improvementScore": score, "insights": ["x"]}))
                .unwrap_err();
            assert!(matches!(err, AnalysisClientError::Malformed(_)));
        }
    }

    #[test]
    fn test_validate_rejects_empty_insights() {
        let err = parse(json!({"success": true, "improvementScore": 60, "insights": ["  "]}))
            .unwrap_err();
        assert!(matches!(err, AnalysisClientError::Malformed(_)));
    }

    #[test]
    fn test_request_serializes_section_names_as_keys() {
        let mut sections = BTreeMap::new();
        sections.insert(SectionName::Skills, "Rust".to_string());
        let request = AnalysisRequest {
            cv_text: "Skills\nRust",
            sections: &sections,
            contact_info: &ContactInfo::default(),
            metrics: &CvMetrics::default(),
            review_type: "advanced",
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["sections"]["skills"], "Rust");
        assert_eq!(value["review_type"], "advanced");
        assert_eq!(value["metrics"]["estimatedPages"], 0);
    }
}
