//! Error types for sentinel core

use thiserror::Error;

/// Main error type for sentinel operations
#[derive(Debug, Error)]
pub enum SentinelError {
    /// Database operation error (from sqlx)
    #[error("Database error: {0}")]
    DatabaseSqlx(#[from] sqlx::Error),

    /// Database operation error (custom message)
    #[error("Database error: {0}")]
    Database(String),

    /// Content source error (listing, fetching, downloading)
    #[error("Source error: {0}")]
    Source(String),

    /// Space or page absent from the source
    #[error("Not found: {0}")]
    NotFound(String),

    /// Text extraction error
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// PII detection error
    #[error("Detection error: {0}")]
    Detection(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Encryption or decryption failure
    #[error("Cipher error: {0}")]
    Cipher(String),

    /// Reveal policy denied or authentication missing
    #[error("Policy denied: {0}")]
    PolicyDenied(String),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Subscriber channel closed before emission completed
    #[error("Stream cancelled: {0}")]
    Cancelled(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Convenient Result type using SentinelError
pub type Result<T> = std::result::Result<T, SentinelError>;

impl SentinelError {
    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        SentinelError::Database(msg.into())
    }

    /// Create a content source error
    pub fn source(msg: impl Into<String>) -> Self {
        SentinelError::Source(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        SentinelError::NotFound(msg.into())
    }

    /// Create an extraction error
    pub fn extraction(msg: impl Into<String>) -> Self {
        SentinelError::Extraction(msg.into())
    }

    /// Create a detection error
    pub fn detection(msg: impl Into<String>) -> Self {
        SentinelError::Detection(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        SentinelError::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        SentinelError::Validation(msg.into())
    }

    /// Create a cipher error
    pub fn cipher(msg: impl Into<String>) -> Self {
        SentinelError::Cipher(msg.into())
    }

    /// Create a policy denied error
    pub fn policy_denied(msg: impl Into<String>) -> Self {
        SentinelError::PolicyDenied(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        SentinelError::Timeout(msg.into())
    }

    /// Create a cancelled error
    pub fn cancelled(msg: impl Into<String>) -> Self {
        SentinelError::Cancelled(msg.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        SentinelError::Other(msg.into())
    }
}
