//! Sentinel core
//!
//! This crate provides the scan orchestration engine for sweeping a wiki
//! corpus for personally identifiable information. It includes:
//!
//! - The resumable per-space scan state machine with ordered event streams
//! - Checkpoint management enabling resume-from-interruption
//! - The PII context extractor (masked and sensitive line windows)
//! - Severity classification and per-space risk rollups
//! - Subscriber fan-out with keepalive ticks
//! - Audit of sensitive-data reveals with retention-based purge
//!
//! Collaborators (wiki client, text extractor, PII detector, stores,
//! cipher) are capability traits in [`ports`]; implementations are
//! injected.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Re-export commonly used types
pub use uuid::Uuid;

// Core modules
pub mod attachments;
pub mod audit;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod fanout;
pub mod masking;
pub mod orchestrator;
pub mod ports;
pub mod progress;
pub mod query;
pub mod resilience;
pub mod security;
pub mod severity;
pub mod shutdown;
pub mod testing;
pub mod types;

pub use attachments::{AttachmentOutcome, AttachmentProcessor};
pub use audit::AuditService;
pub use checkpoint::CheckpointManager;
pub use config::{load_env, ScanConfig};
pub use error::{Result, SentinelError};
pub use fanout::{with_keepalive, SubscriberRegistry, SubscriberSlot};
pub use masking::{mask_token, EntitySpan, PiiContextExtractor};
pub use orchestrator::{ScanEventReceiver, ScanOrchestrator};
pub use progress::{progress_percentage, ProgressTracker, ScanProgress};
pub use query::{scan_status, ScanQueryService, ScanSummary, SpaceStatusSummary};
pub use security::AesGcmCipher;
pub use severity::{risk_of, severity_of, RiskLevel, Severity};
pub use shutdown::{ShutdownManager, ShutdownSignal};
pub use types::{
    AttachmentInfo, AuditRecord, Checkpoint, Detection, DetectionOutcome, Page, PiiEntity,
    ScanEvent, ScanEventKind, ScanResult, ScanStatus, Space,
};
