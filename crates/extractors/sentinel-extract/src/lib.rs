//! Attachment text extraction
//!
//! Turns attachment bytes into plain text for the detection pipeline: pdf
//! via `pdf-extract`, spreadsheets via `calamine`, html by tag stripping,
//! txt/csv as-is. Every extraction runs through a plausibility filter that
//! drops image-only or binary-garbage output instead of feeding it to the
//! detector.

#![warn(missing_docs)]
#![warn(clippy::all)]

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use sentinel_core::ports::TextExtractor;
use sentinel_core::types::AttachmentInfo;
use sentinel_core::{Result, SentinelError};
use std::io::Cursor;
use tracing::debug;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());

/// Minimum plausible length of extracted text
const MIN_TEXT_LENGTH: usize = 50;
/// Minimum share of printable characters
const MIN_PRINTABLE_RATIO: f64 = 0.8;
/// Minimum share of alphanumeric characters
const MIN_ALNUM_RATIO: f64 = 0.3;
/// Maximum share of special characters
const MAX_SPECIAL_RATIO: f64 = 0.4;

/// Extractor for the whitelist formats
#[derive(Debug, Default, Clone)]
pub struct DocumentExtractor;

impl DocumentExtractor {
    /// New extractor
    pub fn new() -> Self {
        Self
    }

    fn extract_pdf(&self, bytes: &[u8]) -> Result<Option<String>> {
        let text = pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| SentinelError::extraction(format!("pdf extraction failed: {}", e)))?;
        Ok(plausible_text(&text))
    }

    fn extract_spreadsheet(&self, bytes: &[u8]) -> Result<Option<String>> {
        let cursor = Cursor::new(bytes.to_vec());
        let mut workbook = calamine::open_workbook_auto_from_rs(cursor)
            .map_err(|e| SentinelError::extraction(format!("workbook open failed: {}", e)))?;

        let mut lines = Vec::new();
        for (_, range) in calamine::Reader::worksheets(&mut workbook) {
            for row in range.rows() {
                let cells: Vec<String> = row
                    .iter()
                    .map(|cell| cell.to_string())
                    .filter(|s| !s.trim().is_empty())
                    .collect();
                if !cells.is_empty() {
                    lines.push(cells.join(" "));
                }
            }
        }
        Ok(plausible_text(&lines.join("\n")))
    }

    fn extract_html(&self, bytes: &[u8]) -> Option<String> {
        let raw = String::from_utf8_lossy(bytes);
        let stripped = TAG_RE.replace_all(&raw, " ");
        let decoded = stripped
            .replace("&nbsp;", " ")
            .replace("&amp;", "&")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&#39;", "'");
        plausible_text(&decoded)
    }

    fn extract_plain(&self, bytes: &[u8]) -> Option<String> {
        plausible_text(&String::from_utf8_lossy(bytes))
    }
}

#[async_trait]
impl TextExtractor for DocumentExtractor {
    async fn extract(&self, attachment: &AttachmentInfo, bytes: &[u8]) -> Result<Option<String>> {
        if bytes.is_empty() {
            return Ok(None);
        }
        match attachment.extension.as_str() {
            "pdf" => self.extract_pdf(bytes),
            "xls" | "xlsx" | "ods" => self.extract_spreadsheet(bytes),
            "html" | "htm" => Ok(self.extract_html(bytes)),
            "txt" | "csv" => Ok(self.extract_plain(bytes)),
            other => {
                debug!(
                    "No parser for extension {:?} ({}), skipping",
                    other, attachment.name
                );
                Ok(None)
            }
        }
    }
}

/// Plausibility filter over extracted text
///
/// Rejects text that looks like the residue of an image-only document or a
/// binary payload: too short, a single unbroken run, too few printable or
/// alphanumeric characters, too many special characters.
pub fn plausible_text(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    let chars: Vec<char> = trimmed.chars().collect();
    let total = chars.len();
    if total < MIN_TEXT_LENGTH {
        return None;
    }
    if !chars.iter().any(|c| *c == ' ') {
        return None;
    }

    let printable = chars
        .iter()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .count();
    if (printable as f64) / (total as f64) < MIN_PRINTABLE_RATIO {
        return None;
    }

    let alnum = chars.iter().filter(|c| c.is_alphanumeric()).count();
    if (alnum as f64) / (total as f64) < MIN_ALNUM_RATIO {
        return None;
    }

    let special = chars
        .iter()
        .filter(|c| !c.is_alphanumeric() && !c.is_whitespace())
        .count();
    if (special as f64) / (total as f64) > MAX_SPECIAL_RATIO {
        return None;
    }

    Some(trimmed.to_string())
}
