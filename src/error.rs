//! Error taxonomy for archive mirroring operations.
//!
//! Every upstream response and local failure is folded into one of these
//! kinds; the retry policy attached to each kind lives in the fetcher and
//! supervisor, not here.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for mirroring operations
pub type MirrorResult<T> = Result<T, MirrorError>;

/// Error kinds for capture and asset fetching
#[derive(Debug, Error)]
pub enum MirrorError {
    /// Unrecoverable configuration problem; aborts the process
    #[error("Configuration error: {0}")]
    FatalConfig(String),

    /// Archive returned 404 or 410 for the requested capture
    #[error("Capture not found: {0}")]
    NotFound(String),

    /// Archive returned 429; the whole process should pause
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// Network failure, timeout, or 5xx; may succeed on a later run
    #[error("Transient error: {0}")]
    Transient(String),

    /// Non-retryable 4xx response
    #[error("Permanent error: {0}")]
    Permanent(String),

    /// On-disk or database state contradicts recorded metadata
    #[error("Corruption detected: {0}")]
    Corruption(String),
}

impl MirrorError {
    /// Whether a later run could plausibly succeed where this one failed
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::RateLimited { .. })
    }
}

impl From<reqwest::Error> for MirrorError {
    fn from(err: reqwest::Error) -> Self {
        // Connection, DNS, and timeout failures are all worth a later retry
        Self::Transient(format!("{err:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(MirrorError::Transient("timeout".into()).is_transient());
        assert!(
            MirrorError::RateLimited {
                retry_after: Duration::from_secs(60)
            }
            .is_transient()
        );
        assert!(!MirrorError::NotFound("gone".into()).is_transient());
        assert!(!MirrorError::Permanent("403".into()).is_transient());
    }
}
