//! Section Segmenter: heuristic split of raw CV text into named sections.
//!
//! Tolerant by construction: missing headings produce empty sections, never
//! errors. Contact fields are matched over the whole text, independent of
//! where the contact section starts.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::document::StructuredMeta;
use crate::models::cv::{ContactInfo, CvData, CvMetrics, SectionName};

/// Characters per page used for the page estimate.
const CHARS_PER_PAGE: usize = 3000;
const MAX_HEADING_WORDS: usize = 4;

fn heading_pattern(alternatives: &str) -> Regex {
    let pattern = format!(
        r"(?i)^(?:(?:professional|work|technical|key|core|career|relevant|personal|additional)\s+)?(?:{alternatives})\s*[:\-]?$"
    );
    Regex::new(&pattern).expect("section heading pattern compiles")
}

static SECTION_PATTERNS: Lazy<Vec<(SectionName, Regex)>> = Lazy::new(|| {
    vec![
        (SectionName::Summary, heading_pattern("profile|summary|objective|about me")),
        (SectionName::Contact, heading_pattern("contact|email|phone|address")),
        (
            SectionName::Experience,
            heading_pattern("experience|employment|work history|professional background"),
        ),
        (
            SectionName::Education,
            heading_pattern("education|qualifications?|academic|degree|university"),
        ),
        (
            SectionName::Skills,
            heading_pattern("skills|expertise|competencies|proficiencies|technical"),
        ),
        (SectionName::Projects, heading_pattern("projects|portfolio|works")),
        (
            SectionName::Certifications,
            heading_pattern("certifications|certificates|credentials"),
        ),
        (SectionName::Languages, heading_pattern("languages|language proficiency")),
        (SectionName::Interests, heading_pattern("interests|hobbies|activities")),
    ]
});

/// Capitalized short line, optionally closed by a colon or dash.
static GENERIC_HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][A-Za-z&/ ]{0,39}\s*[:\-]?$").unwrap());

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap());
static PHONE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+\d{1,3}[\s-]?)?\(?\d{3,4}\)?[\s.-]?\d{3}[\s.-]?\d{4}").unwrap()
});
static LINKEDIN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)linkedin\.com/in/[A-Za-z0-9_-]+").unwrap());
static WEBSITE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"https?://[A-Za-z0-9][A-Za-z0-9-]+[A-Za-z0-9]\.[^\s]{2,}").unwrap()
});
static SKILL_SPLIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,;•\n]").unwrap());

/// Splits `raw_text` into the nine fixed sections and derives contact fields,
/// skills, and metrics.
pub fn segment(raw_text: &str, meta: &StructuredMeta) -> CvData {
    let lines: Vec<&str> = raw_text.lines().collect();
    let explicit = explicit_heading_lines(&lines, meta);

    let mut sections = BTreeMap::new();
    for (name, pattern) in SECTION_PATTERNS.iter() {
        let content = locate_heading(&lines, pattern, &explicit)
            .map(|index| section_body(&lines, index, &explicit))
            .unwrap_or_default();
        sections.insert(*name, content);
    }

    let contact_info = extract_contact(raw_text);
    let skills = split_skills(sections.get(&SectionName::Skills).map_or("", String::as_str));

    let char_count = raw_text.chars().count();
    let metrics = CvMetrics {
        line_count: lines.iter().filter(|l| !l.trim().is_empty()).count(),
        word_count: raw_text.split_whitespace().count(),
        char_count,
        estimated_pages: char_count.div_ceil(CHARS_PER_PAGE),
        section_count: sections.values().filter(|c| !c.trim().is_empty()).count(),
        skill_count: skills.len(),
        has_contact_info: contact_info.is_reachable(),
    };

    CvData {
        full_text: raw_text.to_string(),
        sections,
        contact_info,
        skills,
        metrics,
    }
}

/// Indices of lines whose text the extractor reported as styled headings.
fn explicit_heading_lines(lines: &[&str], meta: &StructuredMeta) -> Vec<usize> {
    if meta.headings.is_empty() {
        return Vec::new();
    }
    lines
        .iter()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            meta.headings.iter().any(|h| h.trim().eq_ignore_ascii_case(line))
        })
        .map(|(i, _)| i)
        .collect()
}

fn locate_heading(lines: &[&str], pattern: &Regex, explicit: &[usize]) -> Option<usize> {
    let matches = |i: &usize| pattern.is_match(lines[*i].trim());
    explicit
        .iter()
        .copied()
        .find(matches)
        .or_else(|| (0..lines.len()).find(matches))
}

fn section_body(lines: &[&str], heading: usize, explicit: &[usize]) -> String {
    let start = (heading + 1..lines.len())
        .find(|&i| !lines[i].trim().is_empty())
        .unwrap_or(lines.len());
    let end = if explicit.is_empty() {
        // The first line after a heading always belongs to its section.
        (start + 1..lines.len()).find(|&i| looks_like_heading(lines[i]))
    } else {
        explicit.iter().copied().find(|&i| i > heading)
    }
    .unwrap_or(lines.len());
    lines[start.min(end)..end].join("\n").trim().to_string()
}

fn looks_like_heading(line: &str) -> bool {
    let line = line.trim();
    if line.is_empty() {
        return false;
    }
    if SECTION_PATTERNS.iter().any(|(_, p)| p.is_match(line)) {
        return true;
    }
    GENERIC_HEADING_RE.is_match(line) && line.split_whitespace().count() <= MAX_HEADING_WORDS
}

fn extract_contact(text: &str) -> ContactInfo {
    let first = |re: &Regex| re.find(text).map(|m| m.as_str().to_string());
    ContactInfo {
        email: first(&EMAIL_RE),
        phone: first(&PHONE_RE),
        linkedin: first(&LINKEDIN_RE),
        website: WEBSITE_RE
            .find_iter(text)
            .map(|m| m.as_str())
            .find(|url| !url.to_ascii_lowercase().contains("linkedin."))
            .map(str::to_string),
    }
}

fn split_skills(skills_section: &str) -> Vec<String> {
    SKILL_SPLIT_RE
        .split(skills_section)
        .map(|s| s.trim().trim_start_matches(['-', '*']).trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{extract, PDF_MIME};
    use crate::test_support::{pdf_fixture, SAMPLE_CV};

    fn plain(text: &str) -> CvData {
        segment(text, &StructuredMeta::default())
    }

    #[test]
    fn test_sections_run_until_next_heading() {
        let cv = plain(SAMPLE_CV);
        assert!(cv.section(SectionName::Summary).starts_with("Backend engineer"));
        assert!(cv.section(SectionName::Experience).contains("Acme Corp"));
        assert!(!cv.section(SectionName::Experience).contains("BSc Computer Science"));
        assert!(cv.section(SectionName::Education).contains("BSc Computer Science"));
        assert_eq!(cv.section(SectionName::Interests), "");
    }

    #[test]
    fn test_missing_headings_yield_empty_sections() {
        let cv = plain("just a paragraph of text with no structure at all");
        assert_eq!(cv.sections.len(), SectionName::ALL.len());
        assert!(cv.detected_sections().is_empty());
        assert_eq!(cv.metrics.section_count, 0);
    }

    #[test]
    fn test_contact_fields() {
        let cv = plain(
            "Jane Doe\nEmail: jane@example.com\nPhone: +234 801 234 5678\n\
             linkedin.com/in/jane-doe\nhttps://www.linkedin.com/in/jane-doe https://janedoe.dev",
        );
        assert_eq!(cv.contact_info.email.as_deref(), Some("jane@example.com"));
        assert_eq!(cv.contact_info.phone.as_deref(), Some("+234 801 234 5678"));
        assert_eq!(cv.contact_info.linkedin.as_deref(), Some("linkedin.com/in/jane-doe"));
        assert_eq!(cv.contact_info.website.as_deref(), Some("https://janedoe.dev"));
        assert!(cv.metrics.has_contact_info);
    }

    #[test]
    fn test_skills_split_on_separators() {
        let cv = plain("Skills\nRust, Go; Python\n• Kubernetes\n- SQL\n\nInterests\nChess");
        assert_eq!(cv.skills, vec!["Rust", "Go", "Python", "Kubernetes", "SQL"]);
        assert_eq!(cv.metrics.skill_count, 5);
        assert_eq!(cv.section(SectionName::Interests), "Chess");
    }

    #[test]
    fn test_metrics_are_derived_counts() {
        let text = "a".repeat(6001);
        let cv = plain(&text);
        assert_eq!(cv.metrics.char_count, 6001);
        assert_eq!(cv.metrics.estimated_pages, 3);
        assert_eq!(cv.metrics.word_count, 1);
        assert_eq!(cv.metrics.line_count, 1);
        assert!(!cv.metrics.has_contact_info);
    }

    #[test]
    fn test_explicit_headings_take_precedence() {
        let text = "Jane Doe\nWork History\nLead Engineer\nShipped the billing platform\nSkills\nRust";
        let meta = StructuredMeta {
            headings: vec!["Work History".into(), "Skills".into()],
            ..StructuredMeta::default()
        };
        let cv = segment(text, &meta);
        // The line heuristic would stop at "Shipped the billing platform".
        assert_eq!(
            cv.section(SectionName::Experience),
            "Lead Engineer\nShipped the billing platform"
        );
        assert_eq!(cv.skills, vec!["Rust"]);
    }

    #[test]
    fn test_qualified_headings_match() {
        let cv = plain("Professional Summary:\nSeasoned engineer.\nTechnical Skills -\nRust");
        assert_eq!(cv.section(SectionName::Summary), "Seasoned engineer.");
        assert_eq!(cv.section(SectionName::Skills), "Rust");
    }

    #[test]
    fn test_pdf_round_trip_finds_email() {
        let bytes = pdf_fixture(&["Jane Doe", "Email: jane@example.com", "Skills", "Rust, Go"]);
        let doc = extract(&bytes, PDF_MIME).unwrap();
        let cv = segment(&doc.raw_text, &doc.meta);
        assert_eq!(cv.contact_info.email.as_deref(), Some("jane@example.com"));
        assert_eq!(cv.skills, vec!["Rust", "Go"]);
    }
}
