use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The fixed set of sections the segmenter looks for, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionName {
    Summary,
    Contact,
    Experience,
    Education,
    Skills,
    Projects,
    Certifications,
    Languages,
    Interests,
}

impl SectionName {
    pub const ALL: [SectionName; 9] = [
        SectionName::Summary,
        SectionName::Contact,
        SectionName::Experience,
        SectionName::Education,
        SectionName::Skills,
        SectionName::Projects,
        SectionName::Certifications,
        SectionName::Languages,
        SectionName::Interests,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionName::Summary => "summary",
            SectionName::Contact => "contact",
            SectionName::Experience => "experience",
            SectionName::Education => "education",
            SectionName::Skills => "skills",
            SectionName::Projects => "projects",
            SectionName::Certifications => "certifications",
            SectionName::Languages => "languages",
            SectionName::Interests => "interests",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub linkedin: Option<String>,
    pub website: Option<String>,
}

impl ContactInfo {
    pub fn is_reachable(&self) -> bool {
        self.email.is_some() || self.phone.is_some()
    }
}

/// Pure derived counts over the extracted text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CvMetrics {
    pub line_count: usize,
    pub word_count: usize,
    pub char_count: usize,
    pub estimated_pages: usize,
    pub section_count: usize,
    pub skill_count: usize,
    pub has_contact_info: bool,
}

/// Segmented view of a CV, input to every scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvData {
    pub full_text: String,
    /// Always holds all nine sections; missing ones are empty strings.
    pub sections: BTreeMap<SectionName, String>,
    pub contact_info: ContactInfo,
    pub skills: Vec<String>,
    pub metrics: CvMetrics,
}

impl CvData {
    pub fn section(&self, name: SectionName) -> &str {
        self.sections.get(&name).map(String::as_str).unwrap_or("")
    }

    /// Sections with non-empty content, in `SectionName` order.
    pub fn detected_sections(&self) -> Vec<SectionName> {
        self.sections
            .iter()
            .filter(|(_, content)| !content.trim().is_empty())
            .map(|(name, _)| *name)
            .collect()
    }
}
