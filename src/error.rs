//! Error handling for the portsweep scanner
//!
//! Probe-level failures never show up here: a refused or timed-out connect is
//! an `Unreachable` outcome, not an error. What remains are request-level
//! failures (bad input, oversized ranges), configuration problems and
//! transport failures of the reply path.

use thiserror::Error;

/// Main error type for scanning operations
#[derive(Debug, Error)]
pub enum ScanError {
    /// A line that is neither a prefixed range nor a bare address.
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Target '{target}' expands to {count} addresses (limit is {limit})")]
    TooManyTargets { target: String, count: u128, limit: u64 },

    #[error("No targets given")]
    EmptyRequest,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ScanError {
    /// Whether the error was caused by the request text rather than the service.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            ScanError::InvalidTarget(_) | ScanError::TooManyTargets { .. } | ScanError::EmptyRequest
        )
    }
}

impl From<reqwest::Error> for ScanError {
    fn from(e: reqwest::Error) -> Self {
        ScanError::NetworkError(e.to_string())
    }
}

/// Result type alias for scan operations
pub type ScanResult<T> = Result<T, ScanError>;
