//! Core data model: identifiers, content entities, checkpoints, audit records

mod event;
mod result;

pub use event::{ScanEvent, ScanEventKind};
pub use result::{Detection, DetectionOutcome, PiiEntity, ScanResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Opaque scan identifier, unique per scan
pub type ScanId = String;

/// Stable identifier of a content space
pub type SpaceKey = String;

/// Page identifier within the source
pub type PageId = String;

/// A top-level grouping of pages in the content source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Space {
    /// Stable space key
    pub key: SpaceKey,
    /// Display name
    pub name: String,
}

/// A document with a body and zero or more attachments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// Page identifier
    pub id: PageId,
    /// Page title
    pub title: String,
}

/// A binary file linked to a page
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentInfo {
    /// File name as declared by the source
    pub name: String,
    /// Lowercased file extension, without the dot
    pub extension: String,
    /// Declared media type
    pub mime_type: Option<String>,
    /// Download URL
    pub url: Option<String>,
}

impl AttachmentInfo {
    /// Build attachment info from a file name, deriving the extension
    pub fn from_name(name: impl Into<String>) -> Self {
        let name = name.into();
        let extension = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .unwrap_or_default();
        Self {
            name,
            extension,
            mime_type: None,
            url: None,
        }
    }
}

/// Status of a scan or of a single space within a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanStatus {
    /// Scan is in progress
    Running,
    /// Scan was paused by explicit user action
    Paused,
    /// Scan finished successfully
    Completed,
    /// Scan failed to enumerate its content
    Failed,
}

impl ScanStatus {
    /// Terminal statuses are immutable except by explicit reset
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanStatus::Completed | ScanStatus::Failed)
    }

    /// Stable persisted label
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Running => "RUNNING",
            ScanStatus::Paused => "PAUSED",
            ScanStatus::Completed => "COMPLETED",
            ScanStatus::Failed => "FAILED",
        }
    }
}

impl FromStr for ScanStatus {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RUNNING" => Ok(ScanStatus::Running),
            "PAUSED" => Ok(ScanStatus::Paused),
            "COMPLETED" => Ok(ScanStatus::Completed),
            "FAILED" => Ok(ScanStatus::Failed),
            _ => Err(()),
        }
    }
}

impl ScanStatus {
    /// Parse a persisted status, falling back to `Running` for invalid values
    pub fn from_persisted(s: &str) -> Self {
        s.parse().unwrap_or(ScanStatus::Running)
    }
}

/// Durable record of the latest processed page/attachment per `(scan, space)`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// Owning scan
    pub scan_id: ScanId,
    /// Space this checkpoint tracks
    pub space_key: SpaceKey,
    /// Last fully processed page, if any
    pub last_page_id: Option<PageId>,
    /// Attachment in progress on the last page, if the page was interrupted
    pub last_attachment_name: Option<String>,
    /// Space scan status
    pub status: ScanStatus,
    /// Last update timestamp, stamped on save
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    /// New running checkpoint with no progress yet
    pub fn running(scan_id: impl Into<ScanId>, space_key: impl Into<SpaceKey>) -> Self {
        Self {
            scan_id: scan_id.into(),
            space_key: space_key.into(),
            last_page_id: None,
            last_attachment_name: None,
            status: ScanStatus::Running,
            updated_at: Utc::now(),
        }
    }
}

/// Record of one reveal of sensitive data
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    /// Unique record identifier
    pub id: uuid::Uuid,
    /// Scan whose data was revealed
    pub scan_id: ScanId,
    /// Caller-declared purpose of the access
    pub purpose: String,
    /// Number of PII entities revealed
    pub pii_count: u64,
    /// Access timestamp
    pub accessed_at: DateTime<Utc>,
    /// Expiry under the retention policy
    pub retention_until: DateTime<Utc>,
}

/// Assemble the canonical page URL for a source base URL
///
/// The base URL may or may not carry a trailing slash; the result always has
/// exactly one separator.
pub fn page_url(base_url: &str, page_id: &str) -> String {
    format!(
        "{}/pages/viewpage.action?pageId={}",
        base_url.trim_end_matches('/'),
        page_id
    )
}
