//! In-memory fixtures for every capability trait
//!
//! Used by the end-to-end orchestrator tests and by adapter crates that
//! need a working pipeline without SQLite or a live wiki.

use crate::ports::{
    AuditStore, CheckpointStore, Cipher, ConfigStore, ContentSource, EventStore, PiiDetector,
    TextExtractor,
};
use crate::types::{
    AttachmentInfo, AuditRecord, Checkpoint, Detection, DetectionOutcome, Page, ScanEvent, Space,
};
use crate::{Result, SentinelError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Scripted content source backed by maps
#[derive(Default)]
pub struct FixtureSource {
    base_url: String,
    spaces: Vec<Space>,
    pages: HashMap<String, Vec<Page>>,
    bodies: HashMap<String, String>,
    attachments: HashMap<String, Vec<AttachmentInfo>>,
    bytes: HashMap<(String, String), Vec<u8>>,
    modified_ids: HashMap<String, Vec<String>>,
    fail_list_spaces: bool,
    fail_list_pages: HashSet<String>,
}

impl FixtureSource {
    /// New source with the given base URL and no content
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Register a space
    pub fn with_space(mut self, key: &str, name: &str) -> Self {
        self.spaces.push(Space {
            key: key.to_string(),
            name: name.to_string(),
        });
        self.pages.entry(key.to_string()).or_default();
        self
    }

    /// Register a page with its body under a space
    pub fn with_page(mut self, space_key: &str, page_id: &str, title: &str, body: &str) -> Self {
        self.pages.entry(space_key.to_string()).or_default().push(Page {
            id: page_id.to_string(),
            title: title.to_string(),
        });
        self.bodies.insert(page_id.to_string(), body.to_string());
        self
    }

    /// Register a page whose body fetch will fail with NotFound
    pub fn with_vanished_page(mut self, space_key: &str, page_id: &str, title: &str) -> Self {
        self.pages.entry(space_key.to_string()).or_default().push(Page {
            id: page_id.to_string(),
            title: title.to_string(),
        });
        self
    }

    /// Register an attachment with its bytes on a page
    pub fn with_attachment(mut self, page_id: &str, name: &str, bytes: Vec<u8>) -> Self {
        self.attachments
            .entry(page_id.to_string())
            .or_default()
            .push(AttachmentInfo::from_name(name));
        self.bytes
            .insert((page_id.to_string(), name.to_string()), bytes);
        self
    }

    /// Register downloadable bytes without listing the attachment
    pub fn with_attachment_bytes(mut self, page_id: &str, name: &str, bytes: Vec<u8>) -> Self {
        self.bytes
            .insert((page_id.to_string(), name.to_string()), bytes);
        self
    }

    /// Restrict the modified-since listing of a space to the given pages
    pub fn with_modified(mut self, space_key: &str, page_ids: &[&str]) -> Self {
        self.modified_ids.insert(
            space_key.to_string(),
            page_ids.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    /// Make `list_spaces` fail
    pub fn failing_spaces(mut self) -> Self {
        self.fail_list_spaces = true;
        self
    }

    /// Make `list_pages` fail for one space
    pub fn failing_pages(mut self, space_key: &str) -> Self {
        self.fail_list_pages.insert(space_key.to_string());
        self
    }
}

#[async_trait]
impl ContentSource for FixtureSource {
    async fn list_spaces(&self) -> Result<Vec<Space>> {
        if self.fail_list_spaces {
            return Err(SentinelError::source("space listing unavailable"));
        }
        Ok(self.spaces.clone())
    }

    async fn list_pages(&self, space_key: &str) -> Result<Vec<Page>> {
        if self.fail_list_pages.contains(space_key) {
            return Err(SentinelError::source(format!(
                "page listing unavailable for {}",
                space_key
            )));
        }
        Ok(self.pages.get(space_key).cloned().unwrap_or_default())
    }

    async fn fetch_page_body(&self, page_id: &str) -> Result<String> {
        self.bodies
            .get(page_id)
            .cloned()
            .ok_or_else(|| SentinelError::not_found(format!("page {}", page_id)))
    }

    async fn list_attachments(&self, page_id: &str) -> Result<Vec<AttachmentInfo>> {
        Ok(self.attachments.get(page_id).cloned().unwrap_or_default())
    }

    async fn download_attachment(&self, page_id: &str, name: &str) -> Result<Vec<u8>> {
        self.bytes
            .get(&(page_id.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| SentinelError::source(format!("download failed for {}", name)))
    }

    async fn list_modified_since(
        &self,
        space_key: &str,
        _since: DateTime<Utc>,
    ) -> Result<Vec<Page>> {
        let pages = self.list_pages(space_key).await?;
        match self.modified_ids.get(space_key) {
            Some(ids) => Ok(pages
                .into_iter()
                .filter(|p| ids.contains(&p.id))
                .collect()),
            None => Ok(pages),
        }
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn probe(&self) -> Result<()> {
        if self.fail_list_spaces {
            return Err(SentinelError::source("unreachable"));
        }
        Ok(())
    }
}

enum ExtractorMode {
    SkipAll,
    Passthrough,
    Scripted,
}

/// Scripted text extractor
pub struct FixtureExtractor {
    mode: ExtractorMode,
    texts: HashMap<String, String>,
}

impl Default for FixtureExtractor {
    fn default() -> Self {
        Self {
            mode: ExtractorMode::SkipAll,
            texts: HashMap::new(),
        }
    }
}

impl FixtureExtractor {
    /// Extractor that returns the bytes as UTF-8 text
    pub fn passthrough() -> Self {
        Self {
            mode: ExtractorMode::Passthrough,
            texts: HashMap::new(),
        }
    }

    /// Extractor that returns a fixed text per attachment name
    pub fn scripted() -> Self {
        Self {
            mode: ExtractorMode::Scripted,
            texts: HashMap::new(),
        }
    }

    /// Script a text for an attachment name
    pub fn with_text(mut self, attachment_name: &str, text: &str) -> Self {
        self.mode = ExtractorMode::Scripted;
        self.texts
            .insert(attachment_name.to_string(), text.to_string());
        self
    }
}

#[async_trait]
impl TextExtractor for FixtureExtractor {
    async fn extract(&self, attachment: &AttachmentInfo, bytes: &[u8]) -> Result<Option<String>> {
        match self.mode {
            ExtractorMode::SkipAll => Ok(None),
            ExtractorMode::Passthrough => {
                Ok(Some(String::from_utf8_lossy(bytes).to_string()))
            }
            ExtractorMode::Scripted => Ok(self.texts.get(&attachment.name).cloned()),
        }
    }
}

/// Scripted PII detector keyed by exact source text
#[derive(Default)]
pub struct FixtureDetector {
    outcomes: HashMap<String, Vec<Detection>>,
    fail_texts: HashMap<String, String>,
    fail_message: Option<String>,
}

impl FixtureDetector {
    /// Detector that finds nothing
    pub fn empty() -> Self {
        Self::default()
    }

    /// Detector that always errors
    pub fn failing(message: &str) -> Self {
        Self {
            fail_message: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// Make detection fail for one exact source text only
    pub fn with_failure_for(mut self, text: &str, message: &str) -> Self {
        self.fail_texts
            .insert(text.to_string(), message.to_string());
        self
    }

    /// Script one detection for an exact source text
    pub fn with_detection(
        mut self,
        text: &str,
        pii_type: &str,
        start: usize,
        end: usize,
        confidence: f32,
    ) -> Self {
        self.outcomes
            .entry(text.to_string())
            .or_default()
            .push(Detection {
                pii_type: pii_type.to_string(),
                pii_type_label: pii_type.to_string(),
                start_position: start,
                end_position: end,
                confidence,
            });
        self
    }
}

#[async_trait]
impl PiiDetector for FixtureDetector {
    async fn detect(&self, text: &str) -> Result<DetectionOutcome> {
        if let Some(message) = &self.fail_message {
            return Err(SentinelError::detection(message.clone()));
        }
        if let Some(message) = self.fail_texts.get(text) {
            return Err(SentinelError::detection(message.clone()));
        }
        let entities = self.outcomes.get(text).cloned().unwrap_or_default();
        Ok(DetectionOutcome {
            entities,
            statistics: HashMap::new(),
        }
        .with_statistics())
    }
}

/// In-memory append-only event store with failure injection
#[derive(Default)]
pub struct InMemoryEventStore {
    events: Mutex<Vec<ScanEvent>>,
    fail_appends: AtomicUsize,
}

impl InMemoryEventStore {
    /// New empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` appends fail
    pub fn fail_next_appends(&self, n: usize) {
        self.fail_appends.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, event: &ScanEvent) -> Result<u64> {
        let remaining = self.fail_appends.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_appends.store(remaining - 1, Ordering::SeqCst);
            return Err(SentinelError::database("injected append failure"));
        }

        let mut events = self.events.lock().unwrap();
        if event.event_seq > 0 {
            // Idempotent reinsertion on (scan_id, event_seq)
            if events
                .iter()
                .any(|e| e.scan_id == event.scan_id && e.event_seq == event.event_seq)
            {
                return Ok(event.event_seq);
            }
            events.push(event.clone());
            return Ok(event.event_seq);
        }

        let next = events
            .iter()
            .filter(|e| e.scan_id == event.scan_id)
            .map(|e| e.event_seq)
            .max()
            .unwrap_or(0)
            + 1;
        let mut stored = event.clone();
        stored.event_seq = next;
        events.push(stored);
        Ok(next)
    }

    async fn list_by_scan(&self, scan_id: &str) -> Result<Vec<ScanEvent>> {
        let mut out: Vec<ScanEvent> = self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.scan_id == scan_id)
            .cloned()
            .collect();
        out.sort_by_key(|e| e.event_seq);
        Ok(out)
    }

    async fn list_by_scan_and_types(
        &self,
        scan_id: &str,
        types: &[&str],
    ) -> Result<Vec<ScanEvent>> {
        Ok(self
            .list_by_scan(scan_id)
            .await?
            .into_iter()
            .filter(|e| types.contains(&e.label()))
            .collect())
    }

    async fn list_item_events(&self, scan_id: &str, page_id: &str) -> Result<Vec<ScanEvent>> {
        Ok(self
            .list_by_scan_and_types(scan_id, &["item", "attachmentItem"])
            .await?
            .into_iter()
            .filter(|e| e.page_id.as_deref() == Some(page_id))
            .collect())
    }

    async fn count_by_type(&self, scan_id: &str) -> Result<HashMap<String, u64>> {
        let mut counts: HashMap<String, u64> = HashMap::new();
        for event in self.list_by_scan(scan_id).await? {
            *counts.entry(event.label().to_string()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn latest_scan(&self) -> Result<Option<(String, DateTime<Utc>)>> {
        let events = self.events.lock().unwrap();
        let mut first_ts: HashMap<String, DateTime<Utc>> = HashMap::new();
        for e in events.iter() {
            let entry = first_ts.entry(e.scan_id.clone()).or_insert(e.ts);
            if e.ts < *entry {
                *entry = e.ts;
            }
        }
        Ok(first_ts.into_iter().max_by_key(|(_, ts)| *ts))
    }
}

/// In-memory checkpoint store keyed by `(scan_id, space_key)`
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: Mutex<HashMap<(String, String), Checkpoint>>,
}

impl InMemoryCheckpointStore {
    /// New empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.checkpoints.lock().unwrap().insert(
            (checkpoint.scan_id.clone(), checkpoint.space_key.clone()),
            checkpoint.clone(),
        );
        Ok(())
    }

    async fn find_by_scan_and_space(
        &self,
        scan_id: &str,
        space_key: &str,
    ) -> Result<Option<Checkpoint>> {
        Ok(self
            .checkpoints
            .lock()
            .unwrap()
            .get(&(scan_id.to_string(), space_key.to_string()))
            .cloned())
    }

    async fn find_by_scan(&self, scan_id: &str) -> Result<Vec<Checkpoint>> {
        let mut out: Vec<Checkpoint> = self
            .checkpoints
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.scan_id == scan_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.space_key.cmp(&b.space_key));
        Ok(out)
    }

    async fn find_latest_by_space(&self, space_key: &str) -> Result<Option<Checkpoint>> {
        Ok(self
            .checkpoints
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.space_key == space_key)
            .max_by_key(|c| c.updated_at)
            .cloned())
    }

    async fn delete_by_scan(&self, scan_id: &str) -> Result<()> {
        self.checkpoints
            .lock()
            .unwrap()
            .retain(|(scan, _), _| scan != scan_id);
        Ok(())
    }
}

/// In-memory audit store
#[derive(Default)]
pub struct InMemoryAuditStore {
    records: Mutex<Vec<AuditRecord>>,
}

impl InMemoryAuditStore {
    /// New empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn record(&self, record: &AuditRecord) -> Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn list_by_scan(&self, scan_id: &str) -> Result<Vec<AuditRecord>> {
        let mut out: Vec<AuditRecord> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.scan_id == scan_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.accessed_at.cmp(&a.accessed_at));
        Ok(out)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| r.retention_until >= now);
        Ok((before - records.len()) as u64)
    }
}

/// In-memory key/value config store
#[derive(Default)]
pub struct InMemoryConfigStore {
    values: Mutex<HashMap<String, String>>,
}

impl InMemoryConfigStore {
    /// New empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a configuration value
    pub fn with(self, key: &str, value: &str) -> Self {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        self
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }
}

/// Reversible marker cipher for tests
#[derive(Default)]
pub struct PlainCipher;

impl Cipher for PlainCipher {
    fn encrypt(&self, value: &str) -> Result<String> {
        Ok(format!("enc::{}", value))
    }

    fn decrypt(&self, value: &str) -> Result<String> {
        value
            .strip_prefix("enc::")
            .map(|v| v.to_string())
            .ok_or_else(|| SentinelError::cipher("value is not a fixture ciphertext"))
    }

    fn is_encrypted(&self, value: &str) -> bool {
        value.starts_with("enc::")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScanEventKind;

    #[tokio::test]
    async fn test_event_store_assigns_dense_sequences() {
        let store = InMemoryEventStore::new();
        for _ in 0..3 {
            store
                .append(&ScanEvent::new("s1", ScanEventKind::Keepalive))
                .await
                .unwrap();
        }
        let seqs: Vec<u64> = store
            .list_by_scan("s1")
            .await
            .unwrap()
            .iter()
            .map(|e| e.event_seq)
            .collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_event_store_idempotent_reinsertion() {
        let store = InMemoryEventStore::new();
        let mut event = ScanEvent::new("s1", ScanEventKind::MultiStart);
        event.event_seq = store.append(&event).await.unwrap();
        let again = store.append(&event).await.unwrap();
        assert_eq!(again, event.event_seq);
        assert_eq!(store.list_by_scan("s1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_plain_cipher_roundtrip() {
        let cipher = PlainCipher;
        let encrypted = cipher.encrypt("secret").unwrap();
        assert!(cipher.is_encrypted(&encrypted));
        assert!(!cipher.is_encrypted("secret"));
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), "secret");
    }

    #[tokio::test]
    async fn test_audit_store_purge() {
        let store = InMemoryAuditStore::new();
        let now = Utc::now();
        let mut fresh = AuditRecord {
            id: uuid::Uuid::new_v4(),
            scan_id: "s1".into(),
            purpose: "test".into(),
            pii_count: 1,
            accessed_at: now,
            retention_until: now + chrono::Duration::days(1),
        };
        store.record(&fresh).await.unwrap();
        fresh.id = uuid::Uuid::new_v4();
        fresh.retention_until = now - chrono::Duration::days(1);
        store.record(&fresh).await.unwrap();

        let purged = store.purge_expired(now).await.unwrap();
        assert_eq!(purged, 1);
        assert_eq!(store.list_by_scan("s1").await.unwrap().len(), 1);
    }
}
