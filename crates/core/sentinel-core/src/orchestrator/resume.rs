//! Resume coordination: compute remaining work from checkpoints

use super::RunContext;
use crate::progress::ScanProgress;
use crate::resilience::retry_with_backoff;
use crate::types::{Checkpoint, Page, ScanEvent, ScanEventKind, ScanStatus};
use crate::Result;
use tracing::{info, warn};

/// What a resumed space still has to do
pub(super) enum ResumePlan {
    /// The space already completed; emit nothing
    AlreadyComplete,
    /// Drive the remaining pages with the given accounting
    Run {
        /// Pages still to process
        remaining: Vec<Page>,
        /// Progress accounting across the interrupted runs
        progress: ScanProgress,
        /// Checkpoint the new run starts from
        base: Checkpoint,
    },
}

/// Remaining-work computation from a checkpoint and the current page list
///
/// An unknown `last_page_id` restarts the space from its first page. When an
/// attachment was in progress, the last page is not counted as analyzed and
/// is reprocessed in full.
pub(super) fn plan_resume(
    scan_id: &str,
    space_key: &str,
    checkpoint: Option<Checkpoint>,
    pages: Vec<Page>,
) -> ResumePlan {
    let original_total = pages.len();

    let Some(checkpoint) = checkpoint else {
        return ResumePlan::Run {
            remaining: pages,
            progress: ScanProgress::fresh(original_total),
            base: Checkpoint::running(scan_id, space_key),
        };
    };

    if checkpoint.status == ScanStatus::Completed {
        return ResumePlan::AlreadyComplete;
    }

    let idx: i64 = checkpoint
        .last_page_id
        .as_ref()
        .and_then(|id| pages.iter().position(|p| &p.id == id))
        .map(|i| i as i64)
        .unwrap_or(-1);

    let from = if checkpoint.last_attachment_name.is_some() {
        // The interrupted page is not yet analyzed: reprocess it entirely
        idx.max(0) as usize
    } else {
        (idx + 1) as usize
    };

    ResumePlan::Run {
        remaining: pages[from.min(original_total)..].to_vec(),
        progress: ScanProgress::resumed(from, original_total),
        base: checkpoint,
    }
}

impl RunContext {
    pub(super) async fn execute_resume(&mut self) {
        info!("Resuming scan {}", self.scan_id);
        if !self
            .emit(ScanEvent::new(
                self.scan_id.clone(),
                ScanEventKind::MultiStart,
            ))
            .await
        {
            return;
        }

        match self.orchestrator.source.list_spaces().await {
            Ok(spaces) if spaces.is_empty() => {
                self.emit(ScanEvent::new(
                    self.scan_id.clone(),
                    ScanEventKind::Error {
                        message: "no spaces found in the content source".to_string(),
                    },
                ))
                .await;
            }
            Ok(spaces) => {
                for space in spaces {
                    if !self.resume_space(&space.key).await {
                        return;
                    }
                }
            }
            Err(e) => {
                warn!("Resume of scan {} failed to list spaces: {}", self.scan_id, e);
                self.emit(ScanEvent::new(
                    self.scan_id.clone(),
                    ScanEventKind::Error {
                        message: format!("failed to list spaces: {}", e),
                    },
                ))
                .await;
            }
        }

        self.emit(ScanEvent::new(
            self.scan_id.clone(),
            ScanEventKind::MultiComplete,
        ))
        .await;
    }

    /// Resume one space. Returns false when the subscriber is gone; space
    /// preparation errors never abort the other spaces.
    async fn resume_space(&mut self, space_key: &str) -> bool {
        match self.prepare_resume(space_key).await {
            Ok(ResumePlan::AlreadyComplete) => {
                info!(
                    "Scan {} space {} already completed, skipping",
                    self.scan_id, space_key
                );
                true
            }
            Ok(ResumePlan::Run {
                remaining,
                progress,
                base,
            }) => self.drive_space(space_key, remaining, progress, base).await,
            Err(e) => self.fail_space(space_key, e).await,
        }
    }

    async fn prepare_resume(&self, space_key: &str) -> Result<ResumePlan> {
        let checkpoint = self
            .orchestrator
            .checkpoints
            .find_by_scan_and_space(&self.scan_id, space_key)
            .await?;

        if matches!(&checkpoint, Some(c) if c.status == ScanStatus::Completed) {
            return Ok(ResumePlan::AlreadyComplete);
        }

        let retry = self.orchestrator.config.retry.clone();
        let source = self.orchestrator.source.clone();
        let key = space_key.to_string();
        let pages = retry_with_backoff(&retry, move || {
            let source = source.clone();
            let key = key.clone();
            Box::pin(async move { source.list_pages(&key).await })
        })
        .await?;

        Ok(plan_resume(&self.scan_id, space_key, checkpoint, pages))
    }
}
