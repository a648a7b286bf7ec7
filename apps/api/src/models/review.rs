use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::scoring::ScoringProvider;
use crate::models::cv::{CvMetrics, SectionName};
use crate::models::session::ReviewType;

/// One completed analysis. Built once at the end of the review pipeline and
/// never changed afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewResult {
    pub identity: String,
    pub review_type: ReviewType,
    pub cv_file_name: String,
    pub timestamp: DateTime<Utc>,
    pub improvement_score: u8,
    /// Order is significant: replies and emails surface the first items.
    pub insights: Vec<String>,
    pub detected_sections: Vec<SectionName>,
    pub metrics: CvMetrics,
    pub provider: ScoringProvider,
    pub report_ref: Option<String>,
    pub email_sent: Option<bool>,
}
