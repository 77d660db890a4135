//! Capability interfaces for the scan pipeline's collaborators
//!
//! Implementations are injected; the orchestrator only ever sees these
//! traits. Stores are the sole writers of their tables.

use crate::types::{
    AttachmentInfo, AuditRecord, Checkpoint, DetectionOutcome, Page, ScanEvent, Space,
};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Source wiki client: spaces, pages, bodies, attachments
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// List every space in the source
    async fn list_spaces(&self) -> Result<Vec<Space>>;

    /// List the pages of a space in source order
    async fn list_pages(&self, space_key: &str) -> Result<Vec<Page>>;

    /// Fetch the plain body of a page
    async fn fetch_page_body(&self, page_id: &str) -> Result<String>;

    /// List the attachments of a page in declared order
    async fn list_attachments(&self, page_id: &str) -> Result<Vec<AttachmentInfo>>;

    /// Download the raw bytes of an attachment
    async fn download_attachment(&self, page_id: &str, name: &str) -> Result<Vec<u8>>;

    /// List the pages of a space modified since the given instant
    async fn list_modified_since(
        &self,
        space_key: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Page>>;

    /// Base URL for page link assembly
    fn base_url(&self) -> &str;

    /// Connectivity probe for the health surface
    async fn probe(&self) -> Result<()>;
}

/// Text extractor: attachment bytes to optional plain text
///
/// Returning `Ok(None)` means the attachment was skipped (unsupported
/// format, empty content, or the image-only heuristic fired); skips are
/// silent and produce no event.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract plain text from attachment bytes
    async fn extract(&self, attachment: &AttachmentInfo, bytes: &[u8]) -> Result<Option<String>>;
}

/// PII detector: plain text to entity spans with statistics
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PiiDetector: Send + Sync {
    /// Detect PII spans in the given text
    async fn detect(&self, text: &str) -> Result<DetectionOutcome>;
}

/// Append-only event log, ordered per scan
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append an event, assigning the next dense `event_seq` within its scan
    /// when the event carries `event_seq = 0`; re-appending an event that
    /// already carries a sequence is idempotent. Returns the stored sequence.
    async fn append(&self, event: &ScanEvent) -> Result<u64>;

    /// All events of a scan in `event_seq` order
    async fn list_by_scan(&self, scan_id: &str) -> Result<Vec<ScanEvent>>;

    /// Events of a scan filtered by wire label, in `event_seq` order
    async fn list_by_scan_and_types(
        &self,
        scan_id: &str,
        types: &[&str],
    ) -> Result<Vec<ScanEvent>>;

    /// `item`/`attachmentItem` events of a page, in `event_seq` order
    async fn list_item_events(&self, scan_id: &str, page_id: &str) -> Result<Vec<ScanEvent>>;

    /// Per-label event counts for a scan
    async fn count_by_type(&self, scan_id: &str) -> Result<HashMap<String, u64>>;

    /// Most recently started scan, with its first-event timestamp
    async fn latest_scan(&self) -> Result<Option<(String, DateTime<Utc>)>>;
}

/// Per-`(scan, space)` checkpoint upsert and query
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Upsert a checkpoint on its `(scan_id, space_key)` key
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()>;

    /// Checkpoint for a `(scan, space)` pair
    async fn find_by_scan_and_space(
        &self,
        scan_id: &str,
        space_key: &str,
    ) -> Result<Option<Checkpoint>>;

    /// All checkpoints of a scan in `space_key` order
    async fn find_by_scan(&self, scan_id: &str) -> Result<Vec<Checkpoint>>;

    /// Latest checkpoint for a space across all scans
    async fn find_latest_by_space(&self, space_key: &str) -> Result<Option<Checkpoint>>;

    /// Remove every checkpoint of a scan
    async fn delete_by_scan(&self, scan_id: &str) -> Result<()>;
}

/// Audit log with retention-based purge
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Record one reveal of sensitive data
    async fn record(&self, record: &AuditRecord) -> Result<()>;

    /// Audit records of a scan, newest first
    async fn list_by_scan(&self, scan_id: &str) -> Result<Vec<AuditRecord>>;

    /// Delete records whose retention expired before `now`; returns the count
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// Read-only durable configuration
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Raw value for a key, if present
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Boolean value for a key, with default
    async fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        Ok(self
            .get(key)
            .await?
            .and_then(|v| match v.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Some(true),
                "false" | "0" | "no" | "off" => Some(false),
                _ => None,
            })
            .unwrap_or(default))
    }

    /// Integer value for a key, with default
    async fn get_i64(&self, key: &str, default: i64) -> Result<i64> {
        Ok(self
            .get(key)
            .await?
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default))
    }
}

/// Opaque string encryption with an `is_encrypted` probe
pub trait Cipher: Send + Sync {
    /// Encrypt a plaintext value
    fn encrypt(&self, value: &str) -> Result<String>;

    /// Decrypt a previously encrypted value
    fn decrypt(&self, value: &str) -> Result<String>;

    /// Whether the value looks like one of this cipher's ciphertexts
    fn is_encrypted(&self, value: &str) -> bool;
}
