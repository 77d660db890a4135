//! Attachment processing: filter, download, extract

use crate::config::ScanConfig;
use crate::ports::{ContentSource, TextExtractor};
use crate::resilience::retry_with_backoff;
use crate::types::AttachmentInfo;
use crate::{Result, SentinelError};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// Outcome for one attachment of a page
#[derive(Debug)]
pub enum AttachmentOutcome {
    /// Text was extracted and is ready for detection
    Extracted(AttachmentInfo, String),
    /// The attachment failed after retries; the page scan continues
    Failed(AttachmentInfo, SentinelError),
}

/// Produces a lazy sequence of `(attachment, text)` pairs for a page
///
/// The processor never detects anything itself; it yields text for the
/// orchestrator. Empty downloads and empty extractions are silent skips.
#[derive(Clone)]
pub struct AttachmentProcessor {
    source: Arc<dyn ContentSource>,
    extractor: Arc<dyn TextExtractor>,
    config: ScanConfig,
}

impl AttachmentProcessor {
    /// New processor over the given collaborators
    pub fn new(
        source: Arc<dyn ContentSource>,
        extractor: Arc<dyn TextExtractor>,
        config: ScanConfig,
    ) -> Self {
        Self {
            source,
            extractor,
            config,
        }
    }

    /// Keep only attachments whose extension is on the whitelist,
    /// preserving declared order
    pub fn filter_extractable(&self, attachments: Vec<AttachmentInfo>) -> Vec<AttachmentInfo> {
        attachments
            .into_iter()
            .filter(|a| self.config.is_extractable(&a.extension))
            .collect()
    }

    /// Lazy stream over the extractable attachments of a page
    pub fn stream<'a>(
        &'a self,
        page_id: &'a str,
        attachments: Vec<AttachmentInfo>,
    ) -> AttachmentTextStream<'a> {
        AttachmentTextStream {
            processor: self,
            page_id,
            queue: self.filter_extractable(attachments).into(),
        }
    }

    async fn extract_one(&self, page_id: &str, attachment: &AttachmentInfo) -> Result<Option<String>> {
        let source = self.source.clone();
        let page = page_id.to_string();
        let name = attachment.name.clone();
        let bytes = retry_with_backoff(&self.config.retry, move || {
            let source = source.clone();
            let page = page.clone();
            let name = name.clone();
            Box::pin(async move { source.download_attachment(&page, &name).await })
        })
        .await?;

        if bytes.is_empty() {
            debug!("Skipping empty attachment {} on page {}", attachment.name, page_id);
            return Ok(None);
        }

        match self.extractor.extract(attachment, &bytes).await? {
            Some(text) if !text.trim().is_empty() => Ok(Some(text)),
            _ => {
                debug!(
                    "Extractor skipped attachment {} on page {}",
                    attachment.name, page_id
                );
                Ok(None)
            }
        }
    }
}

/// Lazy iterator over attachment extraction outcomes
pub struct AttachmentTextStream<'a> {
    processor: &'a AttachmentProcessor,
    page_id: &'a str,
    queue: VecDeque<AttachmentInfo>,
}

impl AttachmentTextStream<'_> {
    /// Next non-skipped outcome, or `None` when the page is exhausted
    pub async fn next(&mut self) -> Option<AttachmentOutcome> {
        while let Some(attachment) = self.queue.pop_front() {
            match self.processor.extract_one(self.page_id, &attachment).await {
                Ok(Some(text)) => return Some(AttachmentOutcome::Extracted(attachment, text)),
                Ok(None) => continue,
                Err(e) => return Some(AttachmentOutcome::Failed(attachment, e)),
            }
        }
        None
    }
}
