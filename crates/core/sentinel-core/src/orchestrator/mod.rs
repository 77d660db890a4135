//! Scan orchestration: the per-space state machine and global wrappers
//!
//! Each scan is a single logical producer feeding an mpsc channel. Pages
//! are processed sequentially, attachments before the page body, and every
//! persisted emission commits its event and checkpoint before the next item
//! starts. Per-item failures become `scanError` events; only enumeration
//! failures are fatal, and only for their own scope.

mod resume;

use crate::attachments::{AttachmentOutcome, AttachmentProcessor};
use crate::checkpoint::CheckpointManager;
use crate::config::ScanConfig;
use crate::masking::PiiContextExtractor;
use crate::ports::{Cipher, ContentSource, EventStore, PiiDetector, TextExtractor};
use crate::progress::{ProgressTracker, ScanProgress};
use crate::resilience::retry_with_backoff;
use crate::types::{
    page_url, AttachmentInfo, Checkpoint, Page, PiiEntity, ScanEvent, ScanEventKind, ScanResult,
    ScanStatus,
};
use crate::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Receiver side of a scan stream
pub type ScanEventReceiver = mpsc::Receiver<ScanEvent>;

enum RunKind {
    SingleSpace(String),
    ModifiedSince(String, DateTime<Utc>),
    AllSpaces,
    Resume,
}

/// Outcome of one step inside a space run
enum SpaceStep {
    /// Keep driving the space
    Continue,
    /// The subscriber hung up; stop issuing work
    SubscriberGone,
    /// The space ended with a fatal error; the scan moves on
    SpaceEnded,
}

/// Coordinates sources, detection, stores and subscribers for scans
#[derive(Clone)]
pub struct ScanOrchestrator {
    source: Arc<dyn ContentSource>,
    detector: Arc<dyn PiiDetector>,
    attachments: AttachmentProcessor,
    events: Arc<dyn EventStore>,
    checkpoints: CheckpointManager,
    cipher: Arc<dyn Cipher>,
    context: PiiContextExtractor,
    config: ScanConfig,
}

impl ScanOrchestrator {
    /// New orchestrator over the given collaborators
    pub fn new(
        source: Arc<dyn ContentSource>,
        extractor: Arc<dyn TextExtractor>,
        detector: Arc<dyn PiiDetector>,
        events: Arc<dyn EventStore>,
        checkpoints: CheckpointManager,
        cipher: Arc<dyn Cipher>,
        config: ScanConfig,
    ) -> Self {
        let config = config.clamped();
        Self {
            attachments: AttachmentProcessor::new(source.clone(), extractor, config.clone()),
            context: PiiContextExtractor::new(&config),
            source,
            detector,
            events,
            checkpoints,
            cipher,
            config,
        }
    }

    /// Checkpoint manager shared with this orchestrator
    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    /// Scan configuration in effect
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Content source in use
    pub fn source(&self) -> &Arc<dyn ContentSource> {
        &self.source
    }

    /// Start a new scan of a single space
    pub fn stream_space(&self, space_key: &str) -> (String, ScanEventReceiver) {
        let scan_id = uuid::Uuid::new_v4().to_string();
        let rx = self.spawn(scan_id.clone(), RunKind::SingleSpace(space_key.to_string()));
        (scan_id, rx)
    }

    /// Start an incremental scan over the pages of a space modified since
    /// the given instant
    pub fn stream_space_since(
        &self,
        space_key: &str,
        since: DateTime<Utc>,
    ) -> (String, ScanEventReceiver) {
        let scan_id = uuid::Uuid::new_v4().to_string();
        let rx = self.spawn(
            scan_id.clone(),
            RunKind::ModifiedSince(space_key.to_string(), since),
        );
        (scan_id, rx)
    }

    /// Start a new scan over every space of the source
    pub fn stream_all_spaces(&self) -> (String, ScanEventReceiver) {
        let scan_id = uuid::Uuid::new_v4().to_string();
        let rx = self.spawn(scan_id.clone(), RunKind::AllSpaces);
        (scan_id, rx)
    }

    /// Resume a previous scan from its checkpoints
    pub fn resume_all_spaces(&self, scan_id: &str) -> ScanEventReceiver {
        self.spawn(scan_id.to_string(), RunKind::Resume)
    }

    fn spawn(&self, scan_id: String, kind: RunKind) -> ScanEventReceiver {
        // Capacity 1: the producer never runs ahead of its subscriber, so a
        // hang-up is observed at the next emission
        let (tx, rx) = mpsc::channel(1);
        let mut run = RunContext {
            orchestrator: self.clone(),
            scan_id,
            tx,
        };
        tokio::spawn(async move {
            match run.orchestrator.config.scan_timeout {
                Some(limit) => {
                    if tokio::time::timeout(limit, run.execute(kind)).await.is_err() {
                        warn!("Scan {} timed out after {:?}", run.scan_id, limit);
                        run.emit(
                            ScanEvent::new(
                                run.scan_id.clone(),
                                ScanEventKind::Error {
                                    message: format!("scan timed out after {:?}", limit),
                                },
                            ),
                        )
                        .await;
                    }
                }
                None => {
                    run.execute(kind).await;
                }
            }
        });
        rx
    }
}

/// Mutable state of one scan run
struct RunContext {
    orchestrator: ScanOrchestrator,
    scan_id: String,
    tx: mpsc::Sender<ScanEvent>,
}

impl RunContext {
    async fn execute(&mut self, kind: RunKind) {
        match kind {
            RunKind::SingleSpace(space_key) => {
                self.scan_fresh_space(&space_key).await;
            }
            RunKind::ModifiedSince(space_key, since) => {
                self.scan_modified_space(&space_key, since).await;
            }
            RunKind::AllSpaces => self.execute_all_spaces().await,
            RunKind::Resume => self.execute_resume().await,
        }
        info!("Scan {} stream finished", self.scan_id);
    }

    async fn execute_all_spaces(&mut self) {
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
                    if !self.scan_fresh_space(&space.key).await {
                        return;
                    }
                }
            }
            Err(e) => {
                warn!("Scan {} failed to list spaces: {}", self.scan_id, e);
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

    /// Fresh scan of one space. Returns false when the subscriber is gone.
    async fn scan_fresh_space(&mut self, space_key: &str) -> bool {
        let retry = self.orchestrator.config.retry.clone();
        let source = self.orchestrator.source.clone();
        let key = space_key.to_string();
        let pages = retry_with_backoff(&retry, move || {
            let source = source.clone();
            let key = key.clone();
            Box::pin(async move { source.list_pages(&key).await })
        })
        .await;

        match pages {
            Ok(pages) => {
                let progress = ScanProgress::fresh(pages.len());
                let base = Checkpoint::running(self.scan_id.clone(), space_key);
                self.drive_space(space_key, pages, progress, base).await
            }
            Err(e) => self.fail_space(space_key, e).await,
        }
    }

    /// Incremental scan over the pages of a space modified since `since`.
    /// Returns false when the subscriber is gone.
    async fn scan_modified_space(&mut self, space_key: &str, since: DateTime<Utc>) -> bool {
        let retry = self.orchestrator.config.retry.clone();
        let source = self.orchestrator.source.clone();
        let key = space_key.to_string();
        let pages = retry_with_backoff(&retry, move || {
            let source = source.clone();
            let key = key.clone();
            Box::pin(async move { source.list_modified_since(&key, since).await })
        })
        .await;

        match pages {
            Ok(pages) => {
                let progress = ScanProgress::fresh(pages.len());
                let base = Checkpoint::running(self.scan_id.clone(), space_key);
                self.drive_space(space_key, pages, progress, base).await
            }
            Err(e) => self.fail_space(space_key, e).await,
        }
    }

    /// Mark a space failed after an enumeration error
    async fn fail_space(&mut self, space_key: &str, error: crate::SentinelError) -> bool {
        warn!(
            "Scan {} space {} enumeration failed: {}",
            self.scan_id, space_key, error
        );
        // Keep any existing resume point, only the status changes
        let mut checkpoint = self
            .orchestrator
            .checkpoints
            .find_by_scan_and_space(&self.scan_id, space_key)
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| Checkpoint::running(self.scan_id.clone(), space_key));
        checkpoint.status = ScanStatus::Failed;
        if let Err(e) = self.orchestrator.checkpoints.save(checkpoint).await {
            warn!("Failed to persist failed checkpoint: {}", e);
        }
        self.emit(
            ScanEvent::new(
                self.scan_id.clone(),
                ScanEventKind::Error {
                    message: format!("failed to enumerate space {}: {}", space_key, error),
                },
            )
            .in_space(space_key),
        )
        .await
    }

    /// Drive one space over its remaining pages
    ///
    /// `base` carries the checkpoint fields of the interrupted run so an
    /// immediately re-interrupted resume keeps its resume point. Returns
    /// false when the subscriber is gone.
    async fn drive_space(
        &mut self,
        space_key: &str,
        remaining: Vec<Page>,
        progress: ScanProgress,
        base: Checkpoint,
    ) -> bool {
        let pages_total = remaining.len();
        // Percentages are monotonic within the space's stream segment
        let mut tracker = ProgressTracker::new();
        let start_pct = tracker.observe(progress.at_start());
        if !self
            .emit(
                ScanEvent::new(
                    self.scan_id.clone(),
                    ScanEventKind::Start {
                        pages_total,
                        analysis_progress_percentage: start_pct,
                    },
                )
                .in_space(space_key),
            )
            .await
        {
            return false;
        }

        let mut checkpoint = base;
        checkpoint.status = ScanStatus::Running;
        if !self.save_checkpoint(checkpoint.clone()).await {
            return false;
        }

        for (i, page) in remaining.iter().enumerate() {
            let k = i + 1;
            let page_pct = tracker.observe(progress.at_page(k));
            let url = page_url(self.orchestrator.source.base_url(), &page.id);

            if !self
                .emit(
                    ScanEvent::new(
                        self.scan_id.clone(),
                        ScanEventKind::PageStart {
                            page_title: page.title.clone(),
                            page_url: Some(url.clone()),
                            page_index: k,
                            pages_total,
                            analysis_progress_percentage: page_pct,
                        },
                    )
                    .in_space(space_key)
                    .on_page(&page.id),
                )
                .await
            {
                return false;
            }

            if !self
                .process_attachments(space_key, page, page_pct, &mut checkpoint)
                .await
            {
                return false;
            }

            match self.process_body(space_key, page, &url, page_pct).await {
                SpaceStep::Continue => {}
                SpaceStep::SubscriberGone => return false,
                // A vanished page is fatal for the space but not the scan
                SpaceStep::SpaceEnded => return true,
            }

            // The page is fully analyzed: clear the attachment marker
            checkpoint.last_page_id = Some(page.id.clone());
            checkpoint.last_attachment_name = None;
            if !self.save_checkpoint(checkpoint.clone()).await {
                return false;
            }

            let done_pct = tracker.observe(progress.after_page(k));
            if !self
                .emit(
                    ScanEvent::new(
                        self.scan_id.clone(),
                        ScanEventKind::PageComplete {
                            analysis_progress_percentage: done_pct,
                        },
                    )
                    .in_space(space_key)
                    .on_page(&page.id),
                )
                .await
            {
                return false;
            }
        }

        let final_pct = tracker.observe(100);
        if !self
            .emit(
                ScanEvent::new(
                    self.scan_id.clone(),
                    ScanEventKind::Complete {
                        analysis_progress_percentage: final_pct,
                    },
                )
                .in_space(space_key),
            )
            .await
        {
            return false;
        }

        checkpoint.status = ScanStatus::Completed;
        self.save_checkpoint(checkpoint).await
    }

    async fn process_attachments(
        &mut self,
        space_key: &str,
        page: &Page,
        page_pct: u8,
        checkpoint: &mut Checkpoint,
    ) -> bool {
        let retry = self.orchestrator.config.retry.clone();
        let source = self.orchestrator.source.clone();
        let page_id = page.id.clone();
        let listed = retry_with_backoff(&retry, move || {
            let source = source.clone();
            let page_id = page_id.clone();
            Box::pin(async move { source.list_attachments(&page_id).await })
        })
        .await;

        let attachments = match listed {
            Ok(attachments) => attachments,
            Err(e) => {
                return self
                    .scan_error(space_key, Some(&page.id), None, &e.to_string())
                    .await;
            }
        };

        let processor = self.orchestrator.attachments.clone();
        let mut stream = processor.stream(&page.id, attachments);
        while let Some(outcome) = stream.next().await {
            match outcome {
                AttachmentOutcome::Extracted(attachment, text) => {
                    match self
                        .build_result(space_key, page, Some(&attachment), &text, page_pct)
                        .await
                    {
                        Ok(result) => {
                            let event = ScanEvent::new(
                                self.scan_id.clone(),
                                ScanEventKind::AttachmentItem(result),
                            )
                            .in_space(space_key)
                            .on_page(&page.id);
                            if !self.emit(event).await {
                                return false;
                            }
                            checkpoint.last_page_id = Some(page.id.clone());
                            checkpoint.last_attachment_name = Some(attachment.name.clone());
                            if !self.save_checkpoint(checkpoint.clone()).await {
                                return false;
                            }
                        }
                        Err(e) => {
                            if !self
                                .scan_error(
                                    space_key,
                                    Some(&page.id),
                                    Some(&attachment.name),
                                    &e.to_string(),
                                )
                                .await
                            {
                                return false;
                            }
                        }
                    }
                }
                AttachmentOutcome::Failed(attachment, e) => {
                    if !self
                        .scan_error(
                            space_key,
                            Some(&page.id),
                            Some(&attachment.name),
                            &e.to_string(),
                        )
                        .await
                    {
                        return false;
                    }
                }
            }
        }
        true
    }

    async fn process_body(
        &mut self,
        space_key: &str,
        page: &Page,
        url: &str,
        page_pct: u8,
    ) -> SpaceStep {
        let retry = self.orchestrator.config.retry.clone();
        let source = self.orchestrator.source.clone();
        let page_id = page.id.clone();
        let body = retry_with_backoff(&retry, move || {
            let source = source.clone();
            let page_id = page_id.clone();
            Box::pin(async move { source.fetch_page_body(&page_id).await })
        })
        .await;

        let body = match body {
            Ok(body) => body,
            Err(e @ crate::SentinelError::NotFound(_)) => {
                // The page vanished under the scan: the space ends here
                return if self.fail_space(space_key, e).await {
                    SpaceStep::SpaceEnded
                } else {
                    SpaceStep::SubscriberGone
                };
            }
            Err(e) => {
                return if self
                    .scan_error(space_key, Some(&page.id), None, &e.to_string())
                    .await
                {
                    SpaceStep::Continue
                } else {
                    SpaceStep::SubscriberGone
                };
            }
        };

        let delivered = match self.build_result(space_key, page, None, &body, page_pct).await {
            Ok(mut result) => {
                result.page_url = Some(url.to_string());
                let event = ScanEvent::new(self.scan_id.clone(), ScanEventKind::Item(result))
                    .in_space(space_key)
                    .on_page(&page.id);
                self.emit(event).await
            }
            Err(e) => {
                self.scan_error(space_key, Some(&page.id), None, &e.to_string())
                    .await
            }
        };
        if delivered {
            SpaceStep::Continue
        } else {
            SpaceStep::SubscriberGone
        }
    }

    /// Detect, enrich and encrypt one text into a result payload
    async fn build_result(
        &self,
        space_key: &str,
        page: &Page,
        attachment: Option<&AttachmentInfo>,
        text: &str,
        page_pct: u8,
    ) -> Result<ScanResult> {
        let outcome = self.orchestrator.detector.detect(text).await?;
        let entities: Vec<PiiEntity> = outcome
            .entities
            .iter()
            .map(|d| PiiEntity::from_detection(d, text))
            .collect();
        let summary = if outcome.statistics.is_empty() {
            ScanResult::summarize(&entities)
        } else {
            outcome.statistics.clone()
        };

        let result = ScanResult {
            scan_id: self.scan_id.clone(),
            space_key: space_key.to_string(),
            page_id: page.id.clone(),
            page_title: page.title.clone(),
            page_url: Some(page_url(self.orchestrator.source.base_url(), &page.id)),
            attachment_name: attachment.map(|a| a.name.clone()),
            attachment_type: attachment.map(|a| {
                a.mime_type.clone().unwrap_or_else(|| a.extension.clone())
            }),
            attachment_url: attachment.and_then(|a| a.url.clone()),
            source_content: text.to_string(),
            detected_entities: entities,
            summary,
            analysis_progress_percentage: page_pct,
            emitted_at: Utc::now(),
            is_final: true,
        };

        let mut result = self.orchestrator.context.enrich(result);
        self.encrypt_sensitive(&mut result)?;
        Ok(result)
    }

    /// Encrypt sensitive fields in place; already-encrypted values are kept
    fn encrypt_sensitive(&self, result: &mut ScanResult) -> Result<()> {
        let cipher = &self.orchestrator.cipher;
        for entity in &mut result.detected_entities {
            if let Some(value) = &entity.sensitive_value {
                if !cipher.is_encrypted(value) {
                    entity.sensitive_value = Some(cipher.encrypt(value)?);
                }
            }
            if let Some(context) = &entity.sensitive_context {
                if !cipher.is_encrypted(context) {
                    entity.sensitive_context = Some(cipher.encrypt(context)?);
                }
            }
        }
        Ok(())
    }

    async fn scan_error(
        &mut self,
        space_key: &str,
        page_id: Option<&str>,
        attachment_name: Option<&str>,
        message: &str,
    ) -> bool {
        debug!(
            "Scan {} space {} page {:?} item error: {}",
            self.scan_id, space_key, page_id, message
        );
        let mut event = ScanEvent::new(
            self.scan_id.clone(),
            ScanEventKind::ScanError {
                attachment_name: attachment_name.map(|s| s.to_string()),
                message: message.to_string(),
            },
        )
        .in_space(space_key);
        if let Some(page_id) = page_id {
            event = event.on_page(page_id);
        }
        self.emit(event).await
    }

    async fn save_checkpoint(&mut self, checkpoint: Checkpoint) -> bool {
        let retry = self.orchestrator.config.retry.clone();
        let manager = self.orchestrator.checkpoints.clone();
        let snapshot = checkpoint.clone();
        let saved = retry_with_backoff(&retry, move || {
            let manager = manager.clone();
            let snapshot = snapshot.clone();
            Box::pin(async move { manager.save(snapshot).await })
        })
        .await;

        if let Err(e) = saved {
            warn!(
                "Checkpoint write failed for scan {} space {}: {}",
                checkpoint.scan_id, checkpoint.space_key, e
            );
            return self
                .scan_error(
                    &checkpoint.space_key,
                    checkpoint.last_page_id.as_deref(),
                    None,
                    &format!("checkpoint write failed: {}", e),
                )
                .await;
        }
        true
    }

    /// Persist (with retry) then deliver an event
    ///
    /// Returns false once the subscriber is gone: the run stops issuing new
    /// work and the checkpoint stays at the last successful item. A store
    /// failure downgrades the emission to a live-only `scanError` so the
    /// persisted sequence stays dense.
    async fn emit(&mut self, mut event: ScanEvent) -> bool {
        if event.kind.is_persistent() {
            let store = self.orchestrator.events.clone();
            let retry = self.orchestrator.config.retry.clone();
            let to_store = event.clone();
            let appended = retry_with_backoff(&retry, move || {
                let store = store.clone();
                let to_store = to_store.clone();
                Box::pin(async move { store.append(&to_store).await })
            })
            .await;

            match appended {
                Ok(seq) => event.event_seq = seq,
                Err(e) => {
                    warn!(
                        "Event append failed for scan {} ({}): {}",
                        event.scan_id,
                        event.label(),
                        e
                    );
                    let fallback = ScanEvent {
                        scan_id: event.scan_id.clone(),
                        event_seq: 0,
                        space_key: event.space_key.clone(),
                        page_id: event.page_id.clone(),
                        ts: Utc::now(),
                        kind: ScanEventKind::ScanError {
                            attachment_name: None,
                            message: format!("event persistence failed: {}", e),
                        },
                    };
                    return self.tx.send(fallback).await.is_ok();
                }
            }
        }
        self.tx.send(event).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::MockPiiDetector;
    use crate::resilience::RetryConfig;
    use crate::testing::{
        FixtureExtractor, FixtureSource, InMemoryCheckpointStore, InMemoryEventStore, PlainCipher,
    };
    use crate::types::DetectionOutcome;
    use std::time::Duration;

    fn fast_config() -> ScanConfig {
        ScanConfig {
            retry: RetryConfig {
                max_retries: 1,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
                multiplier: 2.0,
            },
            ..ScanConfig::default()
        }
    }

    fn orchestrator_with(
        source: FixtureSource,
        detector: Arc<dyn PiiDetector>,
    ) -> (ScanOrchestrator, Arc<InMemoryEventStore>) {
        let events = Arc::new(InMemoryEventStore::new());
        let orchestrator = ScanOrchestrator::new(
            Arc::new(source),
            Arc::new(FixtureExtractor::passthrough()),
            detector,
            events.clone(),
            CheckpointManager::new(Arc::new(InMemoryCheckpointStore::new())),
            Arc::new(PlainCipher),
            fast_config(),
        );
        (orchestrator, events)
    }

    async fn collect(mut rx: ScanEventReceiver) -> Vec<ScanEvent> {
        let mut out = Vec::new();
        while let Some(event) = rx.recv().await {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn test_mockall_detector_is_invoked_per_text() {
        let source = FixtureSource::new("http://wiki")
            .with_space("SP", "Space")
            .with_page("SP", "p-1", "One", "body one")
            .with_page("SP", "p-2", "Two", "body two");

        let mut detector = MockPiiDetector::new();
        detector
            .expect_detect()
            .times(2)
            .returning(|_| Ok(DetectionOutcome::default()));

        let (orchestrator, _) = orchestrator_with(source, Arc::new(detector));
        let (_, rx) = orchestrator.stream_space("SP");
        let events = collect(rx).await;
        assert_eq!(events.last().unwrap().label(), "complete");
    }

    #[tokio::test]
    async fn test_store_failure_downgrades_to_live_scan_error() {
        let source = FixtureSource::new("http://wiki")
            .with_space("SP", "Space")
            .with_page("SP", "p-1", "One", "body");
        let detector = Arc::new(crate::testing::FixtureDetector::empty());

        let (orchestrator, events) = orchestrator_with(source, detector);
        // First append (the `start` event) fails through all retries
        events.fail_next_appends(2);

        let (scan_id, rx) = orchestrator.stream_space("SP");
        let emitted = collect(rx).await;

        // The live stream saw a scanError in place of the failed emission
        assert_eq!(emitted[0].label(), "scanError");
        assert_eq!(emitted[0].event_seq, 0);
        // The persisted sequence is still dense from 1
        let stored = events.list_by_scan(&scan_id).await.unwrap();
        let seqs: Vec<u64> = stored.iter().map(|e| e.event_seq).collect();
        assert_eq!(seqs, (1..=stored.len() as u64).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_cancellation_stops_new_work() {
        let source = FixtureSource::new("http://wiki")
            .with_space("SP", "Space")
            .with_page("SP", "p-1", "One", "body one")
            .with_page("SP", "p-2", "Two", "body two")
            .with_page("SP", "p-3", "Three", "body three");
        let detector = Arc::new(crate::testing::FixtureDetector::empty());

        let (orchestrator, events) = orchestrator_with(source, detector);
        let (scan_id, mut rx) = orchestrator.stream_space("SP");

        // Take the start event only, then hang up
        let first = rx.recv().await.unwrap();
        assert_eq!(first.label(), "start");
        drop(rx);

        // Give the producer time to observe the closed channel
        tokio::time::sleep(Duration::from_millis(50)).await;

        let stored = events.list_by_scan(&scan_id).await.unwrap();
        // No complete was persisted: the run stopped early
        assert!(stored.iter().all(|e| e.label() != "complete"));
    }
}
