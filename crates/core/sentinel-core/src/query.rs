//! Read paths: scan metadata, space statuses, audited reveal of sensitive data

use crate::audit::AuditService;
use crate::checkpoint::CheckpointManager;
use crate::ports::{Cipher, ConfigStore, EventStore};
use crate::severity::{risk_of, RiskLevel};
use crate::types::{ScanEvent, ScanEventKind, ScanResult, ScanStatus};
use crate::{Result, SentinelError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Configuration key guarding the reveal endpoints
pub const ALLOW_SECRET_REVEAL_KEY: &str = "policy.allowSecretReveal";

/// Metadata of the most recent scan
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    /// Scan identifier
    pub scan_id: String,
    /// First event timestamp
    pub started_at: DateTime<Utc>,
    /// Scan-level status derived from the space checkpoints
    pub status: ScanStatus,
    /// Event counts per wire label
    pub event_counts: HashMap<String, u64>,
}

/// Scan-level status derived from its space checkpoints
///
/// A scan is Completed only when every space completed. Failed is reserved
/// for global enumeration failures (an `error` event with no space key);
/// a per-space failure leaves the scan Running until every other space is
/// done. Paused wins over Running since it was an explicit user action.
pub fn scan_status(checkpoints: &[crate::types::Checkpoint], has_global_error: bool) -> ScanStatus {
    if has_global_error {
        return ScanStatus::Failed;
    }
    if checkpoints.iter().any(|c| c.status == ScanStatus::Paused) {
        return ScanStatus::Paused;
    }
    if !checkpoints.is_empty()
        && checkpoints
            .iter()
            .all(|c| c.status == ScanStatus::Completed)
    {
        return ScanStatus::Completed;
    }
    ScanStatus::Running
}

/// Status of one space within a scan
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceStatusSummary {
    /// Space key
    pub space_key: String,
    /// Authoritative status from the checkpoint
    pub status: ScanStatus,
    /// Last fully processed page
    pub last_page_id: Option<String>,
    /// Attachment in progress when the space was interrupted
    pub last_attachment_name: Option<String>,
    /// Checkpoint timestamp
    pub updated_at: DateTime<Utc>,
    /// Number of stored `item`/`attachmentItem` events
    pub item_count: u64,
    /// Total detected entities across stored results
    pub pii_count: u64,
    /// Risk rollup from per-type counts
    pub risk_level: String,
}

/// Query service over events, checkpoints and the audit log
#[derive(Clone)]
pub struct ScanQueryService {
    events: Arc<dyn EventStore>,
    checkpoints: CheckpointManager,
    audit: AuditService,
    cipher: Arc<dyn Cipher>,
    config_store: Arc<dyn ConfigStore>,
}

impl ScanQueryService {
    /// New query service over the given collaborators
    pub fn new(
        events: Arc<dyn EventStore>,
        checkpoints: CheckpointManager,
        audit: AuditService,
        cipher: Arc<dyn Cipher>,
        config_store: Arc<dyn ConfigStore>,
    ) -> Self {
        Self {
            events,
            checkpoints,
            audit,
            cipher,
            config_store,
        }
    }

    /// Metadata of the most recent scan, if any
    pub async fn last_scan(&self) -> Result<Option<ScanSummary>> {
        let Some((scan_id, started_at)) = self.events.latest_scan().await? else {
            return Ok(None);
        };
        let event_counts = self.events.count_by_type(&scan_id).await?;
        let checkpoints = self.checkpoints.find_by_scan(&scan_id).await?;
        let has_global_error = self
            .events
            .list_by_scan_and_types(&scan_id, &["error"])
            .await?
            .iter()
            .any(|e| e.space_key.is_none());
        Ok(Some(ScanSummary {
            status: scan_status(&checkpoints, has_global_error),
            scan_id,
            started_at,
            event_counts,
        }))
    }

    /// Per-space statuses of a scan, authoritative from checkpoints,
    /// with counters derived from stored events
    pub async fn space_statuses(&self, scan_id: &str) -> Result<Vec<SpaceStatusSummary>> {
        let checkpoints = self.checkpoints.find_by_scan(scan_id).await?;
        let items = self
            .events
            .list_by_scan_and_types(scan_id, &["item", "attachmentItem"])
            .await?;

        let mut item_counts: HashMap<String, u64> = HashMap::new();
        let mut type_counts: HashMap<String, HashMap<String, u64>> = HashMap::new();
        for event in &items {
            let Some(space_key) = &event.space_key else {
                continue;
            };
            *item_counts.entry(space_key.clone()).or_insert(0) += 1;
            if let Some(result) = result_of(event) {
                let per_space = type_counts.entry(space_key.clone()).or_default();
                for (pii_type, count) in &result.summary {
                    *per_space.entry(pii_type.clone()).or_insert(0) += count;
                }
            }
        }

        Ok(checkpoints
            .into_iter()
            .map(|c| {
                let counts = type_counts.remove(&c.space_key).unwrap_or_default();
                let pii_count = counts.values().sum();
                let risk: RiskLevel = risk_of(&counts);
                SpaceStatusSummary {
                    item_count: item_counts.get(&c.space_key).copied().unwrap_or(0),
                    pii_count,
                    risk_level: risk.as_str().to_string(),
                    space_key: c.space_key,
                    status: c.status,
                    last_page_id: c.last_page_id,
                    last_attachment_name: c.last_attachment_name,
                    updated_at: c.updated_at,
                }
            })
            .collect())
    }

    /// Stored events of a scan in `event_seq` order, for replay
    pub async fn replay_events(&self, scan_id: &str) -> Result<Vec<ScanEvent>> {
        self.events.list_by_scan(scan_id).await
    }

    /// Reveal the sensitive values of a page's results
    ///
    /// Guarded by the `policy.allowSecretReveal` flag; every successful call
    /// writes exactly one audit record before the data is returned.
    pub async fn reveal_page_items(
        &self,
        scan_id: &str,
        page_id: &str,
        purpose: &str,
    ) -> Result<Vec<ScanResult>> {
        let allowed = self
            .config_store
            .get_bool(ALLOW_SECRET_REVEAL_KEY, false)
            .await?;
        if !allowed {
            return Err(SentinelError::policy_denied(
                "secret reveal is disabled by policy",
            ));
        }

        let events = self.events.list_item_events(scan_id, page_id).await?;
        let mut results = Vec::with_capacity(events.len());
        let mut pii_count: u64 = 0;
        for event in &events {
            let Some(result) = result_of(event) else {
                continue;
            };
            let mut result = result.clone();
            for entity in &mut result.detected_entities {
                pii_count += 1;
                if let Some(value) = &entity.sensitive_value {
                    if self.cipher.is_encrypted(value) {
                        entity.sensitive_value = Some(self.cipher.decrypt(value)?);
                    }
                }
                if let Some(context) = &entity.sensitive_context {
                    if self.cipher.is_encrypted(context) {
                        entity.sensitive_context = Some(self.cipher.decrypt(context)?);
                    }
                }
            }
            results.push(result);
        }

        // The audit record is written before any data leaves this process
        self.audit
            .record_reveal(scan_id, purpose, pii_count)
            .await?;
        info!(
            "Revealed {} entities of scan {} page {} for purpose {:?}",
            pii_count, scan_id, page_id, purpose
        );
        Ok(results)
    }
}

fn result_of(event: &ScanEvent) -> Option<&ScanResult> {
    match &event.kind {
        ScanEventKind::Item(result) | ScanEventKind::AttachmentItem(result) => Some(result),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::AuditStore;
    use crate::testing::{
        InMemoryAuditStore, InMemoryCheckpointStore, InMemoryConfigStore, InMemoryEventStore,
        PlainCipher,
    };
    use crate::types::{Checkpoint, PiiEntity};

    fn service(
        allow_reveal: bool,
    ) -> (
        ScanQueryService,
        Arc<InMemoryEventStore>,
        Arc<InMemoryAuditStore>,
        CheckpointManager,
    ) {
        let events = Arc::new(InMemoryEventStore::new());
        let checkpoint_store = Arc::new(InMemoryCheckpointStore::new());
        let checkpoints = CheckpointManager::new(checkpoint_store);
        let audit_store = Arc::new(InMemoryAuditStore::new());
        let audit = AuditService::new(audit_store.clone(), 730);
        let config = InMemoryConfigStore::new();
        let config = if allow_reveal {
            config.with(ALLOW_SECRET_REVEAL_KEY, "true")
        } else {
            config
        };
        let query = ScanQueryService::new(
            events.clone(),
            checkpoints.clone(),
            audit,
            Arc::new(PlainCipher),
            Arc::new(config),
        );
        (query, events, audit_store, checkpoints)
    }

    fn item_event(scan: &str, space: &str, page: &str, encrypted_value: &str) -> ScanEvent {
        let entity = PiiEntity {
            pii_type: "EMAIL".into(),
            pii_type_label: "EMAIL".into(),
            start_position: 0,
            end_position: 5,
            confidence: 0.9,
            sensitive_value: Some(encrypted_value.to_string()),
            sensitive_context: Some(encrypted_value.to_string()),
            masked_context: Some("[EMAIL] here".into()),
        };
        let summary = ScanResult::summarize(std::slice::from_ref(&entity));
        let result = ScanResult {
            scan_id: scan.into(),
            space_key: space.into(),
            page_id: page.into(),
            page_title: "Title".into(),
            page_url: None,
            attachment_name: None,
            attachment_type: None,
            attachment_url: None,
            source_content: "x".into(),
            detected_entities: vec![entity],
            summary,
            analysis_progress_percentage: 50,
            emitted_at: Utc::now(),
            is_final: true,
        };
        ScanEvent::new(scan, ScanEventKind::Item(result))
            .in_space(space)
            .on_page(page)
    }

    #[tokio::test]
    async fn test_reveal_denied_by_default_policy() {
        let (query, _, audit_store, _) = service(false);
        let err = query
            .reveal_page_items("s1", "p-1", "test")
            .await
            .unwrap_err();
        assert!(matches!(err, SentinelError::PolicyDenied(_)));
        assert!(audit_store.list_by_scan("s1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reveal_decrypts_and_audits() {
        let (query, events, audit_store, _) = service(true);
        events
            .append(&item_event("s1", "SP", "p-1", "enc::john@doe.com"))
            .await
            .unwrap();

        let results = query
            .reveal_page_items("s1", "p-1", "investigation")
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        let entity = &results[0].detected_entities[0];
        assert_eq!(entity.sensitive_value.as_deref(), Some("john@doe.com"));
        assert_eq!(entity.sensitive_context.as_deref(), Some("john@doe.com"));
        // Masked context is untouched
        assert_eq!(entity.masked_context.as_deref(), Some("[EMAIL] here"));

        let audits = audit_store.list_by_scan("s1").await.unwrap();
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].pii_count, 1);
        assert_eq!(audits[0].purpose, "investigation");
    }

    #[tokio::test]
    async fn test_reveal_leaves_plain_values_alone() {
        let (query, events, _, _) = service(true);
        events
            .append(&item_event("s1", "SP", "p-1", "not-encrypted"))
            .await
            .unwrap();

        let results = query
            .reveal_page_items("s1", "p-1", "test")
            .await
            .unwrap();
        assert_eq!(
            results[0].detected_entities[0].sensitive_value.as_deref(),
            Some("not-encrypted")
        );
    }

    #[tokio::test]
    async fn test_space_statuses_merge_checkpoints_and_counters() {
        let (query, events, _, checkpoints) = service(true);
        checkpoints
            .save(Checkpoint {
                scan_id: "s1".into(),
                space_key: "SP".into(),
                last_page_id: Some("p-1".into()),
                last_attachment_name: None,
                status: ScanStatus::Completed,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        events
            .append(&item_event("s1", "SP", "p-1", "enc::v"))
            .await
            .unwrap();

        let statuses = query.space_statuses("s1").await.unwrap();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].status, ScanStatus::Completed);
        assert_eq!(statuses[0].item_count, 1);
        assert_eq!(statuses[0].pii_count, 1);
        // One EMAIL weighs 5: Moyen
        assert_eq!(statuses[0].risk_level, "Moyen");
    }

    #[tokio::test]
    async fn test_last_scan_metadata() {
        let (query, events, _, _) = service(true);
        assert!(query.last_scan().await.unwrap().is_none());

        events
            .append(&ScanEvent::new("s1", ScanEventKind::MultiStart))
            .await
            .unwrap();
        events
            .append(&item_event("s1", "SP", "p-1", "enc::v"))
            .await
            .unwrap();

        let summary = query.last_scan().await.unwrap().unwrap();
        assert_eq!(summary.scan_id, "s1");
        assert_eq!(summary.status, ScanStatus::Running);
        assert_eq!(summary.event_counts.get("multiStart"), Some(&1));
        assert_eq!(summary.event_counts.get("item"), Some(&1));
    }

    fn checkpoint_in(status: ScanStatus) -> Checkpoint {
        Checkpoint {
            scan_id: "s1".into(),
            space_key: "SP".into(),
            last_page_id: None,
            last_attachment_name: None,
            status,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_scan_status_derivation() {
        // No checkpoints yet: the scan is still enumerating
        assert_eq!(scan_status(&[], false), ScanStatus::Running);
        // Every space done
        assert_eq!(
            scan_status(&[checkpoint_in(ScanStatus::Completed)], false),
            ScanStatus::Completed
        );
        // One space still running holds the scan open
        assert_eq!(
            scan_status(
                &[
                    checkpoint_in(ScanStatus::Completed),
                    checkpoint_in(ScanStatus::Running)
                ],
                false
            ),
            ScanStatus::Running
        );
        // A failed space does not fail the scan
        assert_eq!(
            scan_status(
                &[
                    checkpoint_in(ScanStatus::Completed),
                    checkpoint_in(ScanStatus::Failed)
                ],
                false
            ),
            ScanStatus::Running
        );
        // Pause is an explicit user action and wins
        assert_eq!(
            scan_status(
                &[
                    checkpoint_in(ScanStatus::Paused),
                    checkpoint_in(ScanStatus::Running)
                ],
                false
            ),
            ScanStatus::Paused
        );
        // A global enumeration failure fails the scan outright
        assert_eq!(
            scan_status(&[checkpoint_in(ScanStatus::Running)], true),
            ScanStatus::Failed
        );
    }
}
