// Error types for uploaders

use std::time::Duration;
use thiserror::Error;

use crate::retry::IsRetryable;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("file too large: {size} bytes exceeds the {limit} byte limit")]
    FileTooLarge { size: u64, limit: u64 },

    /// Transport failure or server-side error, worth retrying
    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited, retry after {retry_after}s")]
    RateLimited { retry_after: u64 },

    /// Telegram refused the request (bad chat, no rights, bad caption)
    #[error("telegram rejected the upload ({code}): {description}")]
    Rejected { code: i64, description: String },

    #[error("io error: {0}")]
    Io(String),
}

impl IsRetryable for UploadError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimited { .. })
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => Some(Duration::from_secs(*retry_after)),
            _ => None,
        }
    }
}
