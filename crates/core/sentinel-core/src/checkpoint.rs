//! Checkpoint management: validated upserts and pause semantics

use crate::ports::CheckpointStore;
use crate::types::{Checkpoint, ScanStatus};
use crate::Result;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

/// Validated facade over the checkpoint store
///
/// Guards blank keys and stamps `updated_at` on every save. Pause skips
/// terminal checkpoints; a resume is the explicit path that re-opens a
/// Failed space.
#[derive(Clone)]
pub struct CheckpointManager {
    store: Arc<dyn CheckpointStore>,
}

impl CheckpointManager {
    /// New manager over the given store
    pub fn new(store: Arc<dyn CheckpointStore>) -> Self {
        Self { store }
    }

    /// Upsert a checkpoint; ignored when either key component is blank
    pub async fn save(&self, checkpoint: Checkpoint) -> Result<()> {
        if checkpoint.scan_id.trim().is_empty() || checkpoint.space_key.trim().is_empty() {
            warn!("Ignoring checkpoint with blank scan id or space key");
            return Ok(());
        }
        let mut checkpoint = checkpoint;
        checkpoint.updated_at = Utc::now();
        self.store.save(&checkpoint).await
    }

    /// Checkpoint for a `(scan, space)` pair
    pub async fn find_by_scan_and_space(
        &self,
        scan_id: &str,
        space_key: &str,
    ) -> Result<Option<Checkpoint>> {
        self.store.find_by_scan_and_space(scan_id, space_key).await
    }

    /// All checkpoints of a scan in `space_key` order
    pub async fn find_by_scan(&self, scan_id: &str) -> Result<Vec<Checkpoint>> {
        self.store.find_by_scan(scan_id).await
    }

    /// Latest checkpoint for a space across all scans
    pub async fn find_latest_by_space(&self, space_key: &str) -> Result<Option<Checkpoint>> {
        self.store.find_latest_by_space(space_key).await
    }

    /// Remove every checkpoint of a scan
    pub async fn delete_by_scan(&self, scan_id: &str) -> Result<()> {
        self.store.delete_by_scan(scan_id).await
    }

    /// Pause every non-terminal space of a scan
    ///
    /// Completed and Failed checkpoints are untouched. No-op on a blank
    /// scan id.
    pub async fn pause_scan(&self, scan_id: &str) -> Result<()> {
        if scan_id.trim().is_empty() {
            return Ok(());
        }
        for mut checkpoint in self.store.find_by_scan(scan_id).await? {
            if checkpoint.status.is_terminal() {
                continue;
            }
            checkpoint.status = ScanStatus::Paused;
            checkpoint.updated_at = Utc::now();
            debug!(
                "Pausing scan {} space {}",
                checkpoint.scan_id, checkpoint.space_key
            );
            self.store.save(&checkpoint).await?;
        }
        Ok(())
    }
}
