//! Detection results carried by `item` and `attachmentItem` events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Raw span reported by a PII detector
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    /// Detection type, e.g. `EMAIL`
    pub pii_type: String,
    /// Human-readable label for the type
    pub pii_type_label: String,
    /// 0-based char offset of the span start
    pub start_position: usize,
    /// 0-based char offset one past the span end
    pub end_position: usize,
    /// Detector confidence in `[0, 1]`
    pub confidence: f32,
}

/// Everything a detector reports for one text
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionOutcome {
    /// Detected spans in source order
    pub entities: Vec<Detection>,
    /// Per-type counts
    pub statistics: HashMap<String, u64>,
}

impl DetectionOutcome {
    /// Recompute statistics from the entity list
    pub fn with_statistics(mut self) -> Self {
        let mut stats: HashMap<String, u64> = HashMap::new();
        for e in &self.entities {
            *stats.entry(e.pii_type.clone()).or_insert(0) += 1;
        }
        self.statistics = stats;
        self
    }
}

/// One detected PII entity, enriched with context windows
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PiiEntity {
    /// Detection type, e.g. `EMAIL`
    pub pii_type: String,
    /// Human-readable label for the type
    pub pii_type_label: String,
    /// 0-based char offset of the span start in `source_content`
    pub start_position: usize,
    /// 0-based char offset one past the span end in `source_content`
    pub end_position: usize,
    /// Detector confidence in `[0, 1]`
    pub confidence: f32,
    /// The raw detected value; encrypted before persistence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensitive_value: Option<String>,
    /// Unmasked line window; encrypted before persistence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensitive_context: Option<String>,
    /// Line window with `[TYPE]` tokens spliced over every entity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub masked_context: Option<String>,
}

impl PiiEntity {
    /// Build an entity from a raw detection over the given source text
    pub fn from_detection(detection: &Detection, source: &str) -> Self {
        let chars: Vec<char> = source.chars().collect();
        let start = detection.start_position.min(chars.len());
        let end = detection.end_position.min(chars.len()).max(start);
        let value: String = chars[start..end].iter().collect();
        Self {
            pii_type: detection.pii_type.clone(),
            pii_type_label: detection.pii_type_label.clone(),
            start_position: detection.start_position,
            end_position: detection.end_position,
            confidence: detection.confidence,
            sensitive_value: Some(value),
            sensitive_context: None,
            masked_context: None,
        }
    }
}

/// Payload of an `item` or `attachmentItem` event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    /// Owning scan
    pub scan_id: String,
    /// Space the page belongs to
    pub space_key: String,
    /// Scanned page
    pub page_id: String,
    /// Page title
    pub page_title: String,
    /// Canonical page URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,
    /// Attachment name when this result covers an attachment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_name: Option<String>,
    /// Attachment media type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_type: Option<String>,
    /// Attachment download URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_url: Option<String>,
    /// Text the detector ran over
    pub source_content: String,
    /// Detected entities with contexts
    pub detected_entities: Vec<PiiEntity>,
    /// Per-type entity counts
    pub summary: HashMap<String, u64>,
    /// Progress percentage at emission time
    pub analysis_progress_percentage: u8,
    /// Emission timestamp
    pub emitted_at: DateTime<Utc>,
    /// Whether this result is final for its page/attachment
    pub is_final: bool,
}

impl ScanResult {
    /// Per-type counts computed from the entity list
    pub fn summarize(entities: &[PiiEntity]) -> HashMap<String, u64> {
        let mut summary: HashMap<String, u64> = HashMap::new();
        for e in entities {
            *summary.entry(e.pii_type.clone()).or_insert(0) += 1;
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(t: &str, start: usize, end: usize) -> Detection {
        Detection {
            pii_type: t.to_string(),
            pii_type_label: t.to_string(),
            start_position: start,
            end_position: end,
            confidence: 0.9,
        }
    }

    #[test]
    fn test_entity_from_detection_slices_value() {
        let source = "mail: john@doe.com end";
        let e = PiiEntity::from_detection(&detection("EMAIL", 6, 18), source);
        assert_eq!(e.sensitive_value.as_deref(), Some("john@doe.com"));
        assert!(e.masked_context.is_none());
    }

    #[test]
    fn test_entity_from_detection_clamps_out_of_range() {
        let e = PiiEntity::from_detection(&detection("EMAIL", 3, 999), "abcdef");
        assert_eq!(e.sensitive_value.as_deref(), Some("def"));
    }

    #[test]
    fn test_summarize_counts_per_type() {
        let source = "a@b.c and d@e.f, call 0611223344";
        let entities = vec![
            PiiEntity::from_detection(&detection("EMAIL", 0, 5), source),
            PiiEntity::from_detection(&detection("EMAIL", 10, 15), source),
            PiiEntity::from_detection(&detection("PHONE", 22, 32), source),
        ];
        let summary = ScanResult::summarize(&entities);
        assert_eq!(summary.get("EMAIL"), Some(&2));
        assert_eq!(summary.get("PHONE"), Some(&1));
    }

    #[test]
    fn test_outcome_with_statistics() {
        let outcome = DetectionOutcome {
            entities: vec![detection("EMAIL", 0, 1), detection("EMAIL", 2, 3)],
            statistics: HashMap::new(),
        }
        .with_statistics();
        assert_eq!(outcome.statistics.get("EMAIL"), Some(&2));
    }
}
