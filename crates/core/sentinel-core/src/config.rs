//! Configuration management and environment variable loading

use crate::resilience::RetryConfig;
use crate::{Result, SentinelError};
use std::env;
use std::time::Duration;

/// Load environment variables from a .env file
///
/// Safe to call multiple times; a missing file is not an error.
pub fn load_env() -> Result<()> {
    match dotenvy::dotenv() {
        Ok(path) => {
            tracing::info!("Loaded environment from: {}", path.display());
            Ok(())
        }
        Err(dotenvy::Error::LineParse(line, pos)) => Err(SentinelError::config(format!(
            "Failed to parse .env file at line {}, position {}",
            line, pos
        ))),
        Err(dotenvy::Error::Io(_)) => {
            tracing::warn!("No .env file found - using system environment variables only");
            Ok(())
        }
        Err(e) => Err(SentinelError::config(format!(
            "Failed to load .env file: {}",
            e
        ))),
    }
}

/// Get optional environment variable with default
pub fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get environment variable as boolean
pub fn get_env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| match v.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

/// Get environment variable as integer
pub fn get_env_int<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Attachment extensions that go through text extraction
pub const DEFAULT_EXTRACTABLE_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "ppt", "pptx", "xls", "xlsx", "rtf", "odt", "ods", "odp", "txt", "csv",
    "html", "htm",
];

/// Scan pipeline configuration, read-only after init
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Truncation cap for PII context windows
    pub context_max_length: usize,

    /// Half-size of the PII context window
    pub context_side_length: usize,

    /// Extension whitelist for attachment extraction (lowercase)
    pub extractable_extensions: Vec<String>,

    /// Whole-scan timeout, unbounded when absent
    pub scan_timeout: Option<Duration>,

    /// Idle interval before a keepalive tick on a live stream
    pub keepalive_interval: Duration,

    /// Audit record retention in days
    pub retention_days: i64,

    /// Cadence of the audit purge worker
    pub purge_interval: Duration,

    /// Whether reveal endpoints are enabled
    pub allow_secret_reveal: bool,

    /// Grace allowed to in-flight I/O on cancellation
    pub cancel_grace: Duration,

    /// Retry policy for store writes and transient source failures
    pub retry: RetryConfig,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            context_max_length: 200,
            context_side_length: 80,
            extractable_extensions: DEFAULT_EXTRACTABLE_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            scan_timeout: None,
            keepalive_interval: Duration::from_secs(15),
            retention_days: 730,
            purge_interval: Duration::from_secs(24 * 60 * 60),
            allow_secret_reveal: false,
            cancel_grace: Duration::from_secs(5),
            retry: RetryConfig::default(),
        }
    }
}

impl ScanConfig {
    /// Build configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let mut config = Self {
            context_max_length: get_env_int("SENTINEL_CONTEXT_MAX_LENGTH", 200),
            context_side_length: get_env_int("SENTINEL_CONTEXT_SIDE_LENGTH", 80),
            scan_timeout: env::var("SENTINEL_SCAN_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs),
            keepalive_interval: Duration::from_secs(get_env_int(
                "SENTINEL_KEEPALIVE_INTERVAL_SECS",
                15,
            )),
            retention_days: get_env_int("SENTINEL_AUDIT_RETENTION_DAYS", 730),
            purge_interval: Duration::from_secs(get_env_int(
                "SENTINEL_AUDIT_PURGE_INTERVAL_SECS",
                24 * 60 * 60,
            )),
            allow_secret_reveal: get_env_bool("SENTINEL_ALLOW_SECRET_REVEAL", false),
            ..defaults
        };
        if let Ok(raw) = env::var("SENTINEL_EXTRACTABLE_EXTENSIONS") {
            let list: Vec<String> = raw
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
            if !list.is_empty() {
                config.extractable_extensions = list;
            }
        }
        config.clamped()
    }

    /// Enforce the window guardrail: the two half-windows must fit the cap
    pub fn clamped(mut self) -> Self {
        if self.context_max_length == 0 {
            tracing::warn!("context_max_length of 0 is unusable, restoring default 200");
            self.context_max_length = 200;
        }
        let max_side = self.context_max_length / 2;
        if self.context_side_length > max_side {
            tracing::warn!(
                "context_side_length {} exceeds half of context_max_length {}, clamping to {}",
                self.context_side_length,
                self.context_max_length,
                max_side
            );
            self.context_side_length = max_side;
        }
        self
    }

    /// Whether an extension is on the extraction whitelist
    pub fn is_extractable(&self, extension: &str) -> bool {
        let ext = extension.to_lowercase();
        self.extractable_extensions.iter().any(|e| e == &ext)
    }
}
