//! Custom error types for oaharvest.
//!
//! All library functions return `Result<T, HarvestError>` instead of using `unwrap()`.
//! Transport failures are classified as retryable so the retriever can back off
//! and try again; everything else is fatal.

use thiserror::Error;

/// Main error type for oaharvest operations.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// Network/HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Response body could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Rate limited by the upstream API
    #[error("Rate limited, retry after {0}s")]
    RateLimited(u64),

    /// Upstream API returned a non-success status
    #[error("API error: {code} - {message}")]
    Api {
        /// HTTP status code
        code: u16,
        /// Error message
        message: String,
    },

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV writer error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Retry ceiling reached for a transport failure
    #[error("Giving up after {attempts} failed attempts: {last_error}")]
    RetriesExhausted {
        /// Consecutive failed attempts
        attempts: u32,
        /// The last failure observed
        last_error: Box<HarvestError>,
    },
}

impl HarvestError {
    /// Whether the failure is a transport-level problem worth retrying.
    ///
    /// Network errors, rate limiting, non-2xx responses and malformed bodies
    /// are retryable. Configuration, file system and CSV errors are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HarvestError::Network(_)
                | HarvestError::Parse(_)
                | HarvestError::RateLimited(_)
                | HarvestError::Api { .. }
        )
    }
}

/// Result type alias using `HarvestError`
pub type Result<T> = std::result::Result<T, HarvestError>;
