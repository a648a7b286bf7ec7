//! Scoring Engine: pluggable, trait-based CV scorer.
//!
//! `LocalScorer` is a deterministic heuristic (pure Rust, no I/O) and doubles
//! as the offline test double. `RemoteScorer` calls the analysis API and
//! silently degrades to the local heuristic on any failure.
//!
//! The conversation holds an `Arc<dyn CvScorer>` chosen at startup from config.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::analysis::client::AnalysisClient;
use crate::config::Config;
use crate::errors::ReviewError;
use crate::models::cv::{CvData, CvMetrics, SectionName};
use crate::models::session::ReviewType;

// ────────────────────────────────────────────────────────────────────────────
// Output data models (shared across all scorer backends)
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringProvider {
    Remote,
    LocalFallback,
}

impl ScoringProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoringProvider::Remote => "remote",
            ScoringProvider::LocalFallback => "local_fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub success: bool,
    pub improvement_score: u8,
    pub insights: Vec<String>,
    /// Always computed from the segmented CV, whichever backend scored it.
    pub detected_sections: Vec<SectionName>,
    pub metrics: CvMetrics,
    pub provider: ScoringProvider,
}

// ────────────────────────────────────────────────────────────────────────────
// Trait definition
// ────────────────────────────────────────────────────────────────────────────

/// Implementations never fail: a scorer that cannot reach its backend must
/// still return a usable result.
#[async_trait]
pub trait CvScorer: Send + Sync {
    async fn analyze(&self, cv: &CvData, review_type: ReviewType) -> AnalysisResult;
}

/// Remote scorer when an analysis credential is configured, local otherwise.
pub fn scorer_from_config(config: &Config) -> anyhow::Result<Arc<dyn CvScorer>> {
    match &config.cv_analysis_api_key {
        Some(key) => {
            let client = AnalysisClient::new(
                config.cv_analysis_api_url.clone(),
                key.clone(),
                Duration::from_secs(config.cv_analysis_timeout_secs),
            )?;
            info!("CV scorer: remote ({})", config.cv_analysis_api_url);
            Ok(Arc::new(RemoteScorer::new(client)))
        }
        None => {
            info!("CV scorer: local heuristic (no CV_ANALYSIS_API_KEY)");
            Ok(Arc::new(LocalScorer))
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// RemoteScorer
// ────────────────────────────────────────────────────────────────────────────

pub struct RemoteScorer {
    client: AnalysisClient,
    fallback: LocalScorer,
}

impl RemoteScorer {
    pub fn new(client: AnalysisClient) -> Self {
        Self {
            client,
            fallback: LocalScorer,
        }
    }
}

#[async_trait]
impl CvScorer for RemoteScorer {
    async fn analyze(&self, cv: &CvData, review_type: ReviewType) -> AnalysisResult {
        match self.client.analyze(cv, review_type).await {
            Ok(remote) => AnalysisResult {
                success: true,
                improvement_score: remote.improvement_score,
                insights: remote.insights,
                detected_sections: cv.detected_sections(),
                metrics: cv.metrics.clone(),
                provider: ScoringProvider::Remote,
            },
            Err(e) => {
                let degraded = ReviewError::RemoteScoringUnavailable(e.to_string());
                warn!("{degraded}; using local analysis");
                self.fallback.analyze(cv, review_type).await
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// LocalScorer: deterministic heuristic
// ────────────────────────────────────────────────────────────────────────────

pub struct LocalScorer;

#[async_trait]
impl CvScorer for LocalScorer {
    async fn analyze(&self, cv: &CvData, review_type: ReviewType) -> AnalysisResult {
        local_analysis(cv, review_type)
    }
}

const BASE_SCORE: i32 = 50;
const MIN_SCORE: i32 = 40;
const MAX_SCORE: i32 = 90;
const MIN_INSIGHTS: usize = 5;

const SUMMARY_INSIGHT: &str = "Add a professional summary of 3–4 sentences that states your role, years of experience, and the value you bring.";
const EXPERIENCE_THIN_INSIGHT: &str = "Your work experience section needs more detail. Describe your responsibilities and what you achieved in each role.";
const EXPERIENCE_QUANTIFY_INSIGHT: &str = "Consider adding more quantifiable achievements to your experience (percentages, revenue, time saved, team size).";
const SKILLS_FEW_INSIGHT: &str = "Your skills section could be more detailed. List the technical and soft skills relevant to the roles you want.";
const SKILLS_MANY_INSIGHT: &str = "Your skills list is comprehensive, but consider focusing on the skills most relevant to your target role.";
const CONTACT_INSIGHT: &str = "Make sure your CV includes both an email address and a phone number so recruiters can reach you.";
const LENGTH_INSIGHT: &str = "Your CV is longer than two pages. Consider trimming it to the most relevant and recent information.";

const STRUCTURE_INSIGHT: &str = "STRUCTURE: Order your sections as summary, experience, education, then skills, and keep headings consistent.";
const LANGUAGE_INSIGHT: &str = "LANGUAGE: Start each bullet with a strong action verb (led, built, delivered, reduced) and avoid passive phrasing.";
const FORMATTING_INSIGHT: &str = "FORMATTING: Use one font family, consistent date formats, and enough white space for the CV to be scanned in seconds.";
const KEYWORDS_INSIGHT: &str = "KEYWORDS: Mirror the terminology used in job descriptions so applicant tracking systems rank your CV higher.";
const EDUCATION_INSIGHT: &str = "EDUCATION: Include graduation years, honours, and coursework or projects relevant to the roles you target.";

const GENERIC_FORMAT_INSIGHT: &str = "Use a clean, professional format with clear section headings and bullet points.";
const GENERIC_TAILOR_INSIGHT: &str = "Tailor your CV for each application by emphasising the experience that matches the job description.";
const GENERIC_ACHIEVEMENTS_INSIGHT: &str = "Lead each role with your strongest achievement rather than a list of duties.";
const GENERIC_VERBS_INSIGHT: &str = "Start bullet points with action verbs such as led, built, reduced or launched.";
const GENERIC_PROOFREAD_INSIGHT: &str = "Proofread for spelling and grammar, then ask someone else to read it once more.";

/// Fillers appended in order until a list reaches `MIN_INSIGHTS`.
const GENERIC_INSIGHTS: [&str; MIN_INSIGHTS] = [
    GENERIC_FORMAT_INSIGHT,
    GENERIC_TAILOR_INSIGHT,
    GENERIC_ACHIEVEMENTS_INSIGHT,
    GENERIC_VERBS_INSIGHT,
    GENERIC_PROOFREAD_INSIGHT,
];

/// The local heuristic. Same `CvData` in, same result out.
pub fn local_analysis(cv: &CvData, review_type: ReviewType) -> AnalysisResult {
    AnalysisResult {
        success: true,
        improvement_score: local_score(cv),
        insights: local_insights(cv, review_type),
        detected_sections: cv.detected_sections(),
        metrics: cv.metrics.clone(),
        provider: ScoringProvider::LocalFallback,
    }
}

fn local_score(cv: &CvData) -> u8 {
    let metrics = &cv.metrics;
    let mut score = BASE_SCORE;
    if metrics.section_count >= 5 {
        score += 10;
    }
    if metrics.has_contact_info {
        score += 5;
    }
    if metrics.skill_count >= 10 {
        score += 5;
    }
    if metrics.estimated_pages <= 2 {
        score += 5;
    }
    if char_len(cv.section(SectionName::Summary)) > 100 {
        score += 5;
    }
    if char_len(cv.section(SectionName::Experience)) > 300 {
        score += 10;
    }
    score.clamp(MIN_SCORE, MAX_SCORE) as u8
}

fn local_insights(cv: &CvData, review_type: ReviewType) -> Vec<String> {
    let mut insights: Vec<&str> = Vec::new();

    if char_len(cv.section(SectionName::Summary)) < 100 {
        insights.push(SUMMARY_INSIGHT);
    }

    if char_len(cv.section(SectionName::Experience)) < 200 {
        insights.push(EXPERIENCE_THIN_INSIGHT);
    } else {
        insights.push(EXPERIENCE_QUANTIFY_INSIGHT);
    }

    match cv.skills.len() {
        n if n < 8 => insights.push(SKILLS_FEW_INSIGHT),
        n if n > 20 => insights.push(SKILLS_MANY_INSIGHT),
        _ => {}
    }

    if cv.contact_info.email.is_none() || cv.contact_info.phone.is_none() {
        insights.push(CONTACT_INSIGHT);
    }

    if cv.metrics.estimated_pages > 2 {
        insights.push(LENGTH_INSIGHT);
    }

    if review_type.is_advanced() {
        insights.extend([
            STRUCTURE_INSIGHT,
            LANGUAGE_INSIGHT,
            FORMATTING_INSIGHT,
            KEYWORDS_INSIGHT,
        ]);
        if !cv.section(SectionName::Education).trim().is_empty() {
            insights.push(EDUCATION_INSIGHT);
        }
    }

    pad_with_generic(&mut insights);
    insights.into_iter().map(str::to_string).collect()
}

fn pad_with_generic(insights: &mut Vec<&'static str>) {
    let missing = MIN_INSIGHTS.saturating_sub(insights.len());
    insights.extend(GENERIC_INSIGHTS.iter().take(missing));
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
