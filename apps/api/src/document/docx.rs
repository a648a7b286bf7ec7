//! DOCX text extraction.
//!
//! Reads `word/document.xml` paragraph by paragraph. Paragraphs styled as
//! `Title` or `Heading N` are reported in `StructuredMeta::headings` so the
//! segmenter can prefer them over its own heading guesses.

use std::io::{Cursor, Read, Seek};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::document::{ExtractedDocument, StructuredMeta};
use crate::errors::ReviewError;

const DOCUMENT_ENTRY: &str = "word/document.xml";
const STYLES_ENTRY: &str = "word/styles.xml";

pub fn extract_docx(bytes: &[u8]) -> Result<ExtractedDocument, ReviewError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ReviewError::ExtractionFailed(format!("not a DOCX archive: {e}")))?;

    let document_xml = read_entry(&mut archive, DOCUMENT_ENTRY)?.ok_or_else(|| {
        ReviewError::ExtractionFailed(format!("archive has no {DOCUMENT_ENTRY}"))
    })?;
    let style_count = match read_entry(&mut archive, STYLES_ENTRY)? {
        Some(styles_xml) => count_styles(&styles_xml)?,
        None => 0,
    };

    let body = parse_body(&document_xml)?;

    Ok(ExtractedDocument {
        raw_text: body.lines.join("\n"),
        meta: StructuredMeta {
            paragraph_count: Some(body.paragraph_count),
            style_count: Some(style_count),
            headings: body.headings,
            ..StructuredMeta::default()
        },
    })
}

fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, ReviewError> {
    match archive.by_name(name) {
        Ok(mut file) => {
            let mut xml = String::new();
            file.read_to_string(&mut xml)
                .map_err(|e| ReviewError::ExtractionFailed(format!("cannot read {name}: {e}")))?;
            Ok(Some(xml))
        }
        Err(ZipError::FileNotFound) => Ok(None),
        Err(e) => Err(ReviewError::ExtractionFailed(format!("cannot open {name}: {e}"))),
    }
}

#[derive(Debug, Default)]
struct DocxBody {
    lines: Vec<String>,
    headings: Vec<String>,
    paragraph_count: usize,
}

#[derive(Default)]
struct Paragraph {
    text: String,
    is_heading: bool,
}

fn parse_body(xml: &str) -> Result<DocxBody, ReviewError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut body = DocxBody::default();
    let mut paragraph: Option<Paragraph> = None;
    let mut in_text_run = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"w:p" => paragraph = Some(Paragraph::default()),
                b"w:t" => in_text_run = true,
                b"w:pStyle" => mark_heading(&mut paragraph, &e),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:p" => body.paragraph_count += 1,
                b"w:pStyle" => mark_heading(&mut paragraph, &e),
                b"w:tab" => {
                    if let Some(p) = paragraph.as_mut() {
                        p.text.push('\t');
                    }
                }
                b"w:br" | b"w:cr" => {
                    if let Some(p) = paragraph.as_mut() {
                        p.text.push('\n');
                    }
                }
                _ => {}
            },
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_text_run = false,
                b"w:p" => {
                    body.paragraph_count += 1;
                    if let Some(p) = paragraph.take() {
                        let line = p.text.trim();
                        if !line.is_empty() {
                            if p.is_heading {
                                body.headings.push(line.to_string());
                            }
                            body.lines.push(line.to_string());
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Text(e)) if in_text_run => {
                let value = e
                    .xml_content()
                    .map_err(|e| ReviewError::ExtractionFailed(format!("bad text run: {e}")))?;
                if let Some(p) = paragraph.as_mut() {
                    p.text.push_str(&value);
                }
            }
            Ok(Event::GeneralRef(e)) if in_text_run => {
                let name = e
                    .decode()
                    .map_err(|e| ReviewError::ExtractionFailed(format!("bad entity: {e}")))?;
                if let (Some(p), Some(c)) = (paragraph.as_mut(), resolve_entity(&name)) {
                    p.text.push(c);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ReviewError::ExtractionFailed(format!(
                    "malformed document.xml at byte {}: {e}",
                    reader.error_position()
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(body)
}

fn mark_heading(paragraph: &mut Option<Paragraph>, element: &BytesStart<'_>) {
    let Some(p) = paragraph.as_mut() else {
        return;
    };
    if let Ok(Some(attr)) = element.try_get_attribute("w:val") {
        let style = String::from_utf8_lossy(&attr.value);
        p.is_heading = is_heading_style(&style);
    }
}

fn is_heading_style(style: &str) -> bool {
    let style = style.to_ascii_lowercase();
    style == "title" || style.starts_with("heading")
}

fn resolve_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = if let Some(hex) = name.strip_prefix("#x") {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                name.strip_prefix('#')?.parse().ok()?
            };
            char::from_u32(code)
        }
    }
}

fn count_styles(xml: &str) -> Result<usize, ReviewError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut count = 0;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == b"w:style" => {
                count += 1
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ReviewError::ExtractionFailed(format!(
                    "malformed styles.xml: {e}"
                )))
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(count)
}
