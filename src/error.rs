//! Custom error types for paperwatch.
//!
//! All library functions return `Result<T, PaperwatchError>` instead of using `unwrap()`.
//! Failures that the pipeline is allowed to absorb (a single query, a single
//! citation lookup, a corrupt history file) are logged and degraded at the call
//! site; only the variants that reach the binary abort a run.

use thiserror::Error;

/// Main error type for paperwatch operations.
#[derive(Debug, Error)]
pub enum PaperwatchError {
    /// Network/HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Feed or payload parsing error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Rate limited by external API
    #[error("Rate limited, retry after {0}s")]
    RateLimited(u64),

    /// External API returned an error
    #[error("API error: {code} - {message}")]
    Api {
        /// HTTP status or provider error code
        code: i32,
        /// Error message from API
        message: String,
    },

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV report error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Keyword file missing or empty
    #[error("Taxonomy error: {0}")]
    Taxonomy(String),
}

/// Result type alias using `PaperwatchError`
pub type Result<T> = std::result::Result<T, PaperwatchError>;

/// Extension trait for adding context to Option types
pub trait OptionExt<T> {
    /// Convert Option to Result with a parse error message
    fn ok_or_parse(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_parse(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| PaperwatchError::Parse(msg.to_string()))
    }
}
