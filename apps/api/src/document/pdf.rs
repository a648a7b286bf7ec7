//! PDF text reconstruction.
//!
//! Walks each page's content stream and tracks the text-line matrix so that
//! fragments drawn on the same baseline join into one line and a baseline
//! change starts a new one. Pages are separated by a blank line.

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object};

use crate::document::{ExtractedDocument, StructuredMeta};
use crate::errors::ReviewError;

/// TJ adjustments more negative than this (thousandths of an em) are word gaps.
const WORD_GAP_THRESHOLD: f32 = -200.0;
/// Baselines closer than this are treated as the same line.
const BASELINE_EPSILON: f32 = 0.5;

pub fn extract_pdf(bytes: &[u8]) -> Result<ExtractedDocument, ReviewError> {
    let document = Document::load_mem(bytes)
        .map_err(|e| ReviewError::ExtractionFailed(format!("unreadable PDF: {e}")))?;

    if document.is_encrypted() {
        return Err(ReviewError::ExtractionFailed("PDF is encrypted".to_string()));
    }

    let pages = document.get_pages();
    if pages.is_empty() {
        return Err(ReviewError::ExtractionFailed("PDF has no pages".to_string()));
    }

    let mut page_texts = Vec::with_capacity(pages.len());
    for page_id in pages.values() {
        let raw = document
            .get_page_content(*page_id)
            .map_err(|e| ReviewError::ExtractionFailed(format!("unreadable page content: {e}")))?;
        let content = Content::decode(&raw)
            .map_err(|e| ReviewError::ExtractionFailed(format!("malformed content stream: {e}")))?;
        page_texts.push(reconstruct_lines(&content.operations));
    }

    let mut raw_text = page_texts.join("\n\n");

    // Fonts with custom encodings decode to noise through the positional walk;
    // pdf-extract understands ToUnicode maps, so give it a second try.
    if !raw_text.chars().any(char::is_alphanumeric) {
        raw_text = pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| ReviewError::ExtractionFailed(format!("PDF text extraction failed: {e}")))?;
    }

    Ok(ExtractedDocument {
        raw_text,
        meta: StructuredMeta {
            page_count: Some(pages.len()),
            pdf_version: Some(document.version.clone()),
            ..StructuredMeta::default()
        },
    })
}

/// Text-space cursor. Only the vertical component matters for line breaks.
struct TextCursor {
    line_y: f32,
    scale_y: f32,
    leading: f32,
}

impl TextCursor {
    fn new() -> Self {
        Self {
            line_y: 0.0,
            scale_y: 1.0,
            leading: 0.0,
        }
    }

    fn next_line(&mut self) {
        self.line_y -= self.leading * self.scale_y;
    }
}

struct LineWriter {
    out: String,
    baseline: Option<f32>,
}

impl LineWriter {
    fn push(&mut self, y: f32, fragment: &str) {
        if fragment.is_empty() {
            return;
        }
        if let Some(previous) = self.baseline {
            if (previous - y).abs() > BASELINE_EPSILON {
                self.out.push('\n');
            }
        }
        self.out.push_str(fragment);
        self.baseline = Some(y);
    }
}

fn reconstruct_lines(operations: &[Operation]) -> String {
    let mut cursor = TextCursor::new();
    let mut writer = LineWriter {
        out: String::new(),
        baseline: None,
    };

    for op in operations {
        let operands = &op.operands;
        match op.operator.as_str() {
            "BT" => {
                cursor.line_y = 0.0;
                cursor.scale_y = 1.0;
            }
            "Tm" => {
                if let (Some(d), Some(f)) = (number_at(operands, 3), number_at(operands, 5)) {
                    cursor.scale_y = if d == 0.0 { 1.0 } else { d };
                    cursor.line_y = f;
                }
            }
            "Td" => {
                if let Some(ty) = number_at(operands, 1) {
                    cursor.line_y += ty * cursor.scale_y;
                }
            }
            "TD" => {
                if let Some(ty) = number_at(operands, 1) {
                    cursor.leading = -ty;
                    cursor.line_y += ty * cursor.scale_y;
                }
            }
            "TL" => {
                if let Some(leading) = number_at(operands, 0) {
                    cursor.leading = leading;
                }
            }
            "T*" => cursor.next_line(),
            "Tj" => {
                if let Some(Object::String(bytes, _)) = operands.first() {
                    writer.push(cursor.line_y, &decode_win_ansi(bytes));
                }
            }
            "'" => {
                cursor.next_line();
                if let Some(Object::String(bytes, _)) = operands.first() {
                    writer.push(cursor.line_y, &decode_win_ansi(bytes));
                }
            }
            "\"" => {
                cursor.next_line();
                if let Some(Object::String(bytes, _)) = operands.get(2) {
                    writer.push(cursor.line_y, &decode_win_ansi(bytes));
                }
            }
            "TJ" => {
                if let Some(Object::Array(elements)) = operands.first() {
                    writer.push(cursor.line_y, &join_tj_elements(elements));
                }
            }
            _ => {}
        }
    }

    writer.out
}

fn join_tj_elements(elements: &[Object]) -> String {
    let mut text = String::new();
    for element in elements {
        match element {
            Object::String(bytes, _) => text.push_str(&decode_win_ansi(bytes)),
            other => {
                if let Some(adjustment) = as_number(other) {
                    if adjustment < WORD_GAP_THRESHOLD && !text.ends_with(' ') {
                        text.push(' ');
                    }
                }
            }
        }
    }
    text
}

fn number_at(operands: &[Object], index: usize) -> Option<f32> {
    operands.get(index).and_then(as_number)
}

fn as_number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

/// Decodes a simple-font string as WinAnsi (Latin-1 plus the 0x80–0x9F block).
pub(crate) fn decode_win_ansi(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| match b {
            0x80 => '€',
            0x91 => '‘',
            0x92 => '’',
            0x93 => '“',
            0x94 => '”',
            0x95 => '•',
            0x96 => '–',
            0x97 => '—',
            _ => b as char,
        })
        .collect()
}
