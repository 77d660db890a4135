//! Ordered scan events: the closed set of emissions a scan produces

use super::result::ScanResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durable, ordered message emitted by the orchestrator
///
/// Events are totally ordered within a scan by `event_seq`, dense and
/// starting at 1 for persisted events. `keepalive` ticks keep `event_seq = 0`
/// and are never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanEvent {
    /// Owning scan
    pub scan_id: String,
    /// Dense monotonic sequence within the scan; 0 until assigned
    pub event_seq: u64,
    /// Space the event concerns, absent for global events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub space_key: Option<String>,
    /// Page the event concerns, when applicable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_id: Option<String>,
    /// Emission timestamp
    pub ts: DateTime<Utc>,
    /// Event type and payload
    #[serde(flatten)]
    pub kind: ScanEventKind,
}

/// The closed set of event types with their stable wire labels
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum ScanEventKind {
    /// Global scan started
    MultiStart,
    /// Space scan started
    Start {
        /// Number of pages this run will process
        #[serde(rename = "pagesTotal")]
        pages_total: usize,
        /// Progress at the start of the run (non-zero on resume)
        #[serde(rename = "analysisProgressPercentage")]
        analysis_progress_percentage: u8,
    },
    /// Page processing started
    PageStart {
        /// Page title
        #[serde(rename = "pageTitle")]
        page_title: String,
        /// Canonical page URL
        #[serde(rename = "pageUrl", skip_serializing_if = "Option::is_none")]
        page_url: Option<String>,
        /// 1-based index of this page among the pages of the run
        #[serde(rename = "pageIndex")]
        page_index: usize,
        /// Number of pages in the run
        #[serde(rename = "pagesTotal")]
        pages_total: usize,
        /// Progress when the page starts
        #[serde(rename = "analysisProgressPercentage")]
        analysis_progress_percentage: u8,
    },
    /// Page body PII result
    Item(ScanResult),
    /// Attachment PII result
    AttachmentItem(ScanResult),
    /// Page done
    PageComplete {
        /// Progress once the page is done
        #[serde(rename = "analysisProgressPercentage")]
        analysis_progress_percentage: u8,
    },
    /// Non-fatal per-item error; the scan continues
    ScanError {
        /// Attachment concerned, if the failure was attachment-scoped
        #[serde(rename = "attachmentName", skip_serializing_if = "Option::is_none")]
        attachment_name: Option<String>,
        /// Failure description
        message: String,
    },
    /// Fatal per-space or global error; ends that stream scope
    Error {
        /// Failure description
        message: String,
    },
    /// Space done
    Complete {
        /// Always 100
        #[serde(rename = "analysisProgressPercentage")]
        analysis_progress_percentage: u8,
    },
    /// Global scan done
    MultiComplete,
    /// Liveness tick; never persisted
    Keepalive,
}

impl ScanEventKind {
    /// Stable on-the-wire label
    pub fn label(&self) -> &'static str {
        match self {
            ScanEventKind::MultiStart => "multiStart",
            ScanEventKind::Start { .. } => "start",
            ScanEventKind::PageStart { .. } => "pageStart",
            ScanEventKind::Item(_) => "item",
            ScanEventKind::AttachmentItem(_) => "attachmentItem",
            ScanEventKind::PageComplete { .. } => "pageComplete",
            ScanEventKind::ScanError { .. } => "scanError",
            ScanEventKind::Error { .. } => "error",
            ScanEventKind::Complete { .. } => "complete",
            ScanEventKind::MultiComplete => "multiComplete",
            ScanEventKind::Keepalive => "keepalive",
        }
    }

    /// Whether events of this kind are written to the event store
    pub fn is_persistent(&self) -> bool {
        !matches!(self, ScanEventKind::Keepalive)
    }

    /// Progress carried by the event, when it carries one
    pub fn progress(&self) -> Option<u8> {
        match self {
            ScanEventKind::Start {
                analysis_progress_percentage,
                ..
            }
            | ScanEventKind::PageStart {
                analysis_progress_percentage,
                ..
            }
            | ScanEventKind::PageComplete {
                analysis_progress_percentage,
            }
            | ScanEventKind::Complete {
                analysis_progress_percentage,
            } => Some(*analysis_progress_percentage),
            ScanEventKind::Item(result) | ScanEventKind::AttachmentItem(result) => {
                Some(result.analysis_progress_percentage)
            }
            _ => None,
        }
    }
}

impl ScanEvent {
    /// New unsequenced event
    pub fn new(scan_id: impl Into<String>, kind: ScanEventKind) -> Self {
        Self {
            scan_id: scan_id.into(),
            event_seq: 0,
            space_key: None,
            page_id: None,
            ts: Utc::now(),
            kind,
        }
    }

    /// Attach a space key
    pub fn in_space(mut self, space_key: impl Into<String>) -> Self {
        self.space_key = Some(space_key.into());
        self
    }

    /// Attach a page id
    pub fn on_page(mut self, page_id: impl Into<String>) -> Self {
        self.page_id = Some(page_id.into());
        self
    }

    /// Stable on-the-wire label
    pub fn label(&self) -> &'static str {
        self.kind.label()
    }
}
