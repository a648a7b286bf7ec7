//! Report Builder: renders a `ReviewResult` as a paginated A4 PDF.
//!
//! Layout runs top to bottom on a cursor; whenever the next block would cross
//! the bottom margin a new page starts. Every page carries the footer.
//! Text uses the standard Helvetica faces in WinAnsi, so no fonts are embedded.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};

use crate::errors::ReviewError;
use crate::models::review::ReviewResult;

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 50.0;
const CONTENT_BOTTOM: f32 = 70.0;
const FOOTER_Y: f32 = 35.0;

const BAR_WIDTH: f32 = 450.0;
const BAR_HEIGHT: f32 = 25.0;

/// Average Helvetica glyph width as a fraction of the font size.
const AVG_GLYPH_WIDTH: f32 = 0.5;

const TITLE: &str = "CV Review Report";
const FOOTER: &str =
    "This report was generated automatically. Results are guidance, not a guarantee of interview outcomes.";
const DEFAULT_CATEGORY: &str = "General";

const NEXT_STEPS: [&str; 5] = [
    "Revise your CV using the insights above, starting with the first items listed.",
    "Quantify achievements wherever possible with numbers, percentages, or outcomes.",
    "Tailor the summary and skills sections to each job description.",
    "Ask a trusted colleague or mentor to proofread the updated CV.",
    "Send us the revised CV for a follow-up review to measure your progress.",
];

#[derive(Debug, Clone, Copy)]
enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource_name(&self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }
}

/// Insights sharing one `CATEGORY:` label, in first-seen order.
#[derive(Debug, Clone, PartialEq)]
pub struct InsightGroup {
    pub category: String,
    pub items: Vec<String>,
}

/// Groups insights by the text before their first colon. Insights without a
/// colon land in `General`. Category order and within-category order follow
/// first appearance.
pub fn group_insights(insights: &[String]) -> Vec<InsightGroup> {
    let mut groups: Vec<InsightGroup> = Vec::new();
    for insight in insights {
        let (category, item) = match insight.split_once(':') {
            Some((label, rest)) if !label.trim().is_empty() => {
                (label.trim().to_string(), rest.trim().to_string())
            }
            _ => (DEFAULT_CATEGORY.to_string(), insight.trim().to_string()),
        };
        match groups.iter_mut().find(|g| g.category == category) {
            Some(group) => group.items.push(item),
            None => groups.push(InsightGroup {
                category,
                items: vec![item],
            }),
        }
    }
    groups
}

/// RGB fill for the score bar: red below 50, amber below 70, green otherwise.
pub fn score_color(score: u8) -> (f32, f32, f32) {
    match score {
        0..=49 => (1.0, 0.302, 0.302),
        50..=69 => (1.0, 0.651, 0.302),
        _ => (0.298, 0.686, 0.314),
    }
}

pub fn executive_summary(score: u8) -> String {
    let verdict = match score {
        0..=49 => "needs significant improvement before it can compete for most roles",
        50..=69 => "has a reasonable foundation but several areas would benefit from attention",
        _ => "is in good shape, with a few refinements that could make it stand out further",
    };
    format!(
        "Your CV scored {score} out of 100. Overall, it {verdict}. The insights below are ordered \
         by impact, so start at the top and work your way down."
    )
}

/// Renders the report. Any failure is fatal for the review that asked for it.
pub fn build_report(review: &ReviewResult) -> Result<Vec<u8>, ReviewError> {
    let mut canvas = Canvas::new();

    canvas.centered(Font::Bold, 24.0, TITLE);
    canvas.advance(20.0);
    canvas.right_aligned(
        Font::Regular,
        10.0,
        &format!("Generated on: {}", review.timestamp.format("%B %-d, %Y %H:%M UTC")),
    );
    canvas.advance(24.0);

    canvas.heading("CV Improvement Score");
    canvas.score_bar(review.improvement_score);
    canvas.advance(16.0);

    canvas.heading("Executive Summary");
    canvas.paragraph(Font::Regular, 11.0, 0.0, &executive_summary(review.improvement_score));
    canvas.advance(12.0);

    canvas.heading("Detailed Insights");
    let grouped = review.review_type.is_advanced() && review.insights.iter().any(|i| i.contains(':'));
    if grouped {
        for group in group_insights(&review.insights) {
            canvas.ensure_room(40.0);
            canvas.paragraph(Font::Bold, 12.0, 0.0, &group.category);
            for item in &group.items {
                canvas.paragraph(Font::Regular, 11.0, 12.0, &format!("• {item}"));
            }
            canvas.advance(6.0);
        }
    } else {
        for insight in &review.insights {
            canvas.paragraph(Font::Regular, 11.0, 0.0, &format!("• {insight}"));
        }
    }
    canvas.advance(12.0);

    canvas.heading("Next Steps");
    for (i, step) in NEXT_STEPS.iter().enumerate() {
        canvas.paragraph(Font::Regular, 11.0, 0.0, &format!("{}. {step}", i + 1));
    }

    assemble(canvas.finish())
}

// ────────────────────────────────────────────────────────────────────────────
// Layout
// ────────────────────────────────────────────────────────────────────────────

struct Canvas {
    pages: Vec<Vec<Operation>>,
    ops: Vec<Operation>,
    y: f32,
}

impl Canvas {
    fn new() -> Self {
        Self {
            pages: Vec::new(),
            ops: Vec::new(),
            y: PAGE_HEIGHT - MARGIN,
        }
    }

    fn advance(&mut self, amount: f32) {
        self.y -= amount;
    }

    fn ensure_room(&mut self, needed: f32) {
        if self.y - needed < CONTENT_BOTTOM {
            self.break_page();
        }
    }

    fn break_page(&mut self) {
        let ops = std::mem::take(&mut self.ops);
        self.pages.push(ops);
        self.y = PAGE_HEIGHT - MARGIN;
    }

    fn text_at(&mut self, font: Font, size: f32, x: f32, y: f32, text: &str) {
        self.ops.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![font.resource_name().into(), size.into()]),
            Operation::new("Td", vec![x.into(), y.into()]),
            Operation::new("Tj", vec![Object::String(encode_win_ansi(text), StringFormat::Literal)]),
            Operation::new("ET", vec![]),
        ]);
    }

    fn centered(&mut self, font: Font, size: f32, text: &str) {
        self.ensure_room(size);
        let x = ((PAGE_WIDTH - estimate_width(text, size)) / 2.0).max(MARGIN);
        self.text_at(font, size, x, self.y - size, text);
        self.advance(size);
    }

    fn right_aligned(&mut self, font: Font, size: f32, text: &str) {
        self.ensure_room(size);
        let x = (PAGE_WIDTH - MARGIN - estimate_width(text, size)).max(MARGIN);
        self.text_at(font, size, x, self.y - size, text);
        self.advance(size);
    }

    fn heading(&mut self, text: &str) {
        // Keep a heading on the same page as at least two lines of its body.
        self.ensure_room(16.0 + 3.0 * 15.0);
        self.text_at(Font::Bold, 16.0, MARGIN, self.y - 16.0, text);
        self.advance(26.0);
    }

    fn paragraph(&mut self, font: Font, size: f32, indent: f32, text: &str) {
        let line_height = size * 1.4;
        let width = PAGE_WIDTH - 2.0 * MARGIN - indent;
        for line in wrap_text(text, size, width) {
            self.ensure_room(line_height);
            self.text_at(font, size, MARGIN + indent, self.y - size, &line);
            self.advance(line_height);
        }
    }

    fn score_bar(&mut self, score: u8) {
        self.ensure_room(BAR_HEIGHT + 10.0);
        let bottom = self.y - BAR_HEIGHT;
        let filled = BAR_WIDTH * f32::from(score.min(100)) / 100.0;
        let (r, g, b) = score_color(score);

        self.fill_rect(MARGIN, bottom, BAR_WIDTH, BAR_HEIGHT, (0.9, 0.9, 0.9));
        if filled > 0.0 {
            self.fill_rect(MARGIN, bottom, filled, BAR_HEIGHT, (r, g, b));
        }
        self.text_at(
            Font::Bold,
            12.0,
            MARGIN + BAR_WIDTH + 10.0,
            bottom + 8.0,
            &format!("{score}/100"),
        );
        self.advance(BAR_HEIGHT);
    }

    fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, (r, g, b): (f32, f32, f32)) {
        self.ops.extend([
            Operation::new("q", vec![]),
            Operation::new("rg", vec![r.into(), g.into(), b.into()]),
            Operation::new("re", vec![x.into(), y.into(), w.into(), h.into()]),
            Operation::new("f", vec![]),
            Operation::new("Q", vec![]),
        ]);
    }

    fn finish(mut self) -> Vec<Vec<Operation>> {
        if !self.ops.is_empty() || self.pages.is_empty() {
            self.break_page();
        }
        let mut pages = self.pages;
        for page in &mut pages {
            let x = ((PAGE_WIDTH - estimate_width(FOOTER, 8.0)) / 2.0).max(MARGIN / 2.0);
            page.extend([
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![Font::Regular.resource_name().into(), 8.0_f32.into()]),
                Operation::new("Td", vec![x.into(), FOOTER_Y.into()]),
                Operation::new(
                    "Tj",
                    vec![Object::String(encode_win_ansi(FOOTER), StringFormat::Literal)],
                ),
                Operation::new("ET", vec![]),
            ]);
        }
        pages
    }
}

fn estimate_width(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * AVG_GLYPH_WIDTH
}

/// Greedy word wrap against the estimated glyph width. A word longer than a
/// line sits on its own line rather than being split.
pub fn wrap_text(text: &str, size: f32, max_width: f32) -> Vec<String> {
    let max_chars = ((max_width / (size * AVG_GLYPH_WIDTH)).floor() as usize).max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Encodes text for a WinAnsi simple font; unmappable characters become `?`.
fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '€' => 0x80,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            c if (c as u32) < 0x80 || (0xA0..=0xFF).contains(&(c as u32)) => c as u8,
            _ => b'?',
        })
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// PDF assembly
// ────────────────────────────────────────────────────────────────────────────

fn assemble(pages: Vec<Vec<Operation>>) -> Result<Vec<u8>, ReviewError> {
    let render_err = |e: lopdf::Error| ReviewError::ReportGenerationFailed(e.to_string());

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            Font::Regular.resource_name() => regular,
            Font::Bold.resource_name() => bold,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for operations in pages {
        let encoded = Content { operations }.encode().map_err(render_err)?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let page_count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
            "Resources" => resources_id,
            "MediaBox" => vec![Object::Integer(0), Object::Integer(0), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| ReviewError::ReportGenerationFailed(e.to_string()))?;
    Ok(out)
}
