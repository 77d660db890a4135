//! Audit of sensitive-data reveals and retention-based purge

use crate::ports::AuditStore;
use crate::types::AuditRecord;
use crate::Result;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Records every reveal of sensitive data and purges expired records
#[derive(Clone)]
pub struct AuditService {
    store: Arc<dyn AuditStore>,
    retention_days: i64,
}

impl AuditService {
    /// New service with the given retention window
    pub fn new(store: Arc<dyn AuditStore>, retention_days: i64) -> Self {
        Self {
            store,
            retention_days,
        }
    }

    /// Record one reveal; must be called before the data leaves the process
    pub async fn record_reveal(
        &self,
        scan_id: &str,
        purpose: &str,
        pii_count: u64,
    ) -> Result<AuditRecord> {
        let accessed_at = Utc::now();
        let record = AuditRecord {
            id: uuid::Uuid::new_v4(),
            scan_id: scan_id.to_string(),
            purpose: purpose.to_string(),
            pii_count,
            accessed_at,
            retention_until: accessed_at + ChronoDuration::days(self.retention_days),
        };
        self.store.record(&record).await?;
        Ok(record)
    }

    /// Audit records of a scan, newest first
    pub async fn list_by_scan(&self, scan_id: &str) -> Result<Vec<AuditRecord>> {
        self.store.list_by_scan(scan_id).await
    }

    /// Delete records whose retention expired
    pub async fn purge_expired(&self) -> Result<u64> {
        let purged = self.store.purge_expired(Utc::now()).await?;
        if purged > 0 {
            info!("Purged {} expired audit records", purged);
        }
        Ok(purged)
    }

    /// Spawn the periodic purge worker
    pub fn spawn_purge_task(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = service.purge_expired().await {
                    error!("Audit purge failed: {}", e);
                }
            }
        })
    }
}
