//! PII context extraction: masked and sensitive line windows
//!
//! For every detected span we capture the line around it, splice `[TYPE]`
//! tokens over each entity on that line, and truncate the result to a
//! centered window that never cuts a word in half. The sensitive variant
//! keeps the raw values and is encrypted before it reaches any store.

use crate::config::ScanConfig;
use crate::types::ScanResult;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[a-zA-Z!/][^>]*>").unwrap());

/// Build the `[TYPE]` token for a detection type
///
/// Blank types and the literal string `null` map to `[UNKNOWN]`.
pub fn mask_token(pii_type: &str) -> String {
    let trimmed = pii_type.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
        "[UNKNOWN]".to_string()
    } else {
        format!("[{}]", trimmed.to_uppercase())
    }
}

/// A sibling entity span used for multi-entity masking
#[derive(Debug, Clone)]
pub struct EntitySpan {
    /// 0-based char offset of the span start
    pub start: usize,
    /// 0-based char offset one past the span end
    pub end: usize,
    /// Detection type used for the `[TYPE]` token
    pub pii_type: String,
}

/// Parser applied to the non-entity text of a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentParser {
    Plain,
    Markup,
}

impl ContentParser {
    fn for_line(line: &str) -> Self {
        if TAG_RE.is_match(line) {
            ContentParser::Markup
        } else {
            ContentParser::Plain
        }
    }

    fn clean(&self, segment: &str) -> String {
        match self {
            ContentParser::Plain => segment.to_string(),
            ContentParser::Markup => {
                let stripped = TAG_RE.replace_all(segment, " ");
                stripped
                    .replace("&nbsp;", " ")
                    .replace("&amp;", "&")
                    .replace("&lt;", "<")
                    .replace("&gt;", ">")
                    .replace("&quot;", "\"")
                    .replace("&#39;", "'")
            }
        }
    }
}

/// Line-windowed context extractor with multi-entity masking
#[derive(Debug, Clone)]
pub struct PiiContextExtractor {
    max_length: usize,
    side_length: usize,
}

impl PiiContextExtractor {
    /// Extractor configured from the scan config (already clamped)
    pub fn new(config: &ScanConfig) -> Self {
        Self::with_lengths(config.context_max_length, config.context_side_length)
    }

    /// Extractor with explicit window sizes; the half-window is clamped so
    /// both sides fit the cap
    pub fn with_lengths(max_length: usize, side_length: usize) -> Self {
        let max_length = max_length.max(1);
        Self {
            max_length,
            side_length: side_length.min(max_length / 2),
        }
    }

    /// Masked, truncated line window around a span
    pub fn extract_masked(
        &self,
        source: &str,
        start: usize,
        end: usize,
        pii_type: &str,
        others: &[EntitySpan],
    ) -> Option<String> {
        let main = EntitySpan {
            start,
            end,
            pii_type: pii_type.to_string(),
        };
        self.window(source, &main, others, true)
    }

    /// Unmasked line window around a span, for later encryption
    pub fn extract_sensitive(&self, source: &str, start: usize, end: usize) -> Option<String> {
        let main = EntitySpan {
            start,
            end,
            pii_type: String::new(),
        };
        self.window(source, &main, &[], false)
    }

    /// Fill missing contexts on every entity of a result
    ///
    /// Idempotent: entities that already carry a context keep it. Any
    /// failure leaves the input unchanged.
    pub fn enrich(&self, result: ScanResult) -> ScanResult {
        let mut enriched = result;
        let spans: Vec<EntitySpan> = enriched
            .detected_entities
            .iter()
            .map(|e| EntitySpan {
                start: e.start_position,
                end: e.end_position,
                pii_type: e.pii_type.clone(),
            })
            .collect();

        for i in 0..enriched.detected_entities.len() {
            let (start, end, pii_type) = {
                let e = &enriched.detected_entities[i];
                (e.start_position, e.end_position, e.pii_type.clone())
            };

            if enriched.detected_entities[i].masked_context.is_none() {
                let siblings: Vec<EntitySpan> = spans
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(_, s)| s.clone())
                    .collect();
                enriched.detected_entities[i].masked_context = self.extract_masked(
                    &enriched.source_content,
                    start,
                    end,
                    &pii_type,
                    &siblings,
                );
            }

            if enriched.detected_entities[i].sensitive_context.is_none() {
                enriched.detected_entities[i].sensitive_context =
                    self.extract_sensitive(&enriched.source_content, start, end);
            }
        }

        enriched
    }

    fn window(
        &self,
        source: &str,
        main: &EntitySpan,
        others: &[EntitySpan],
        masked: bool,
    ) -> Option<String> {
        if source.trim().is_empty() {
            return None;
        }
        let chars: Vec<char> = source.chars().collect();
        let n = chars.len();
        if main.start > main.end || main.end > n {
            debug!(
                "context window rejected: span [{}, {}] out of range for length {}",
                main.start, main.end, n
            );
            return None;
        }

        // Line bounds containing the span
        let line_start = chars[..main.start]
            .iter()
            .rposition(|&c| c == '\n')
            .map(|i| i + 1)
            .unwrap_or(0);
        let line_end = chars[main.end..]
            .iter()
            .position(|&c| c == '\n')
            .map(|i| main.end + i)
            .unwrap_or(n);

        let line: String = chars[line_start..line_end].iter().collect();
        let parser = ContentParser::for_line(&line);

        // Entities intersecting the line: the main one plus any siblings,
        // clamped to the line, sorted by start, overlaps dropped
        let mut on_line: Vec<(EntitySpan, bool)> = vec![(main.clone(), true)];
        for o in others {
            if o.start < line_end && o.end > line_start && o.start <= o.end && o.end <= n {
                let clamped = EntitySpan {
                    start: o.start.max(line_start),
                    end: o.end.min(line_end),
                    pii_type: o.pii_type.clone(),
                };
                let overlaps_main = clamped.start < main.end && clamped.end > main.start;
                if !overlaps_main {
                    on_line.push((clamped, false));
                }
            }
        }
        on_line.sort_by_key(|(e, _)| e.start);
        on_line.dedup_by(|(b, _), (a, _)| b.start < a.end);

        // Render the line, splicing tokens (masked) or raw values
        let mut out: Vec<char> = Vec::with_capacity(line_end - line_start);
        let mut main_out = (0usize, 0usize);
        let mut cursor = line_start;
        for (entity, is_main) in &on_line {
            if entity.start > cursor {
                let segment: String = chars[cursor..entity.start].iter().collect();
                out.extend(parser.clean(&segment).chars());
            }
            let token_start = out.len();
            if masked {
                out.extend(mask_token(&entity.pii_type).chars());
            } else {
                out.extend(chars[entity.start..entity.end].iter());
            }
            if *is_main {
                main_out = (token_start, out.len());
            }
            cursor = entity.end.max(cursor);
        }
        if cursor < line_end {
            let segment: String = chars[cursor..line_end].iter().collect();
            out.extend(parser.clean(&segment).chars());
        }

        let out_len = out.len();
        let (main_start, main_end) = main_out;

        // Center the window on the main token, then snap outward to word
        // boundaries without exceeding the cap
        let cap = self.max_length;
        let mut lo = main_start.saturating_sub(self.side_length);
        let mut hi = (main_end + self.side_length).min(out_len);
        if hi - lo > cap {
            lo = main_start;
            hi = (lo + cap).min(out_len);
        }

        while lo > 0 && !out[lo - 1].is_whitespace() {
            if hi - lo >= cap {
                break;
            }
            lo -= 1;
        }
        if lo > 0 && !out[lo - 1].is_whitespace() {
            // Budget ran out mid-word: drop the partial word
            while lo < main_start && !out[lo].is_whitespace() {
                lo += 1;
            }
        }
        while hi < out_len && !out[hi].is_whitespace() {
            if hi - lo >= cap {
                break;
            }
            hi += 1;
        }
        if hi < out_len && !out[hi].is_whitespace() {
            while hi > main_end && !out[hi - 1].is_whitespace() {
                hi -= 1;
            }
        }

        let left_cut = lo > 0;
        let right_cut = hi < out_len;

        let window: String = out[lo..hi].iter().collect();
        let collapsed = collapse_whitespace(&window);
        if collapsed.is_empty() {
            return None;
        }

        let mut context = String::new();
        if left_cut {
            context.push('…');
        }
        context.push_str(&collapsed);
        if right_cut {
            context.push('…');
        }
        Some(context)
    }
}

fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_ws = false;
    for c in s.trim().chars() {
        if c.is_whitespace() {
            if !in_ws {
                out.push(' ');
            }
            in_ws = true;
        } else {
            out.push(c);
            in_ws = false;
        }
    }
    out
}
