// Error types for video fetchers

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::retry::IsRetryable;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DownloadError {
    /// Network timeout while talking to the platform
    #[error("network timeout: {0}")]
    NetworkTimeout(String),

    /// Connection refused/reset or DNS failure
    #[error("network error: {0}")]
    Network(String),

    /// Platform throttled the request (429, captcha, bot check)
    #[error("rate limited by platform: {0}")]
    RateLimited(String),

    /// Video is private, deleted, geo-blocked or DRM-protected
    #[error("video unavailable: {0}")]
    Unavailable(String),

    /// yt-dlp (or python) not found in system
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// Extractor rejected the URL
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to parse yt-dlp JSON output
    #[error("parse error: {0}")]
    ParseError(String),

    /// Extractor finished but no media file was produced
    #[error("downloaded file not found for {0}")]
    FileMissing(String),

    /// Command execution failed
    #[error("execution error: {0}")]
    ExecutionError(String),

    /// Unknown error with details
    #[error("{0}")]
    Unknown(String),
}

impl DownloadError {
    /// Classify yt-dlp stderr output into an error kind.
    pub fn from_stderr(stderr: &str) -> Self {
        lazy_static::lazy_static! {
            static ref HTTP_ERROR_RE: Regex = Regex::new(r"HTTP Error (\d{3})").unwrap();
        }

        let detail = summarize(stderr);
        let s = stderr.to_lowercase();

        if let Some(status) = HTTP_ERROR_RE
            .captures(stderr)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u16>().ok())
        {
            match status {
                429 => return Self::RateLimited(detail),
                403 | 404 | 410 | 451 => return Self::Unavailable(detail),
                500..=599 => return Self::Network(detail),
                _ => {}
            }
        }

        // Timeouts
        if s.contains("timed out") || s.contains("timeout") {
            return Self::NetworkTimeout(detail);
        }

        // Throttling
        if s.contains("too many requests")
            || s.contains("rate limit")
            || s.contains("captcha")
            || s.contains("confirm you're not a bot")
        {
            return Self::RateLimited(detail);
        }

        // Transport failures
        if s.contains("connection reset")
            || s.contains("connection refused")
            || s.contains("temporary failure in name resolution")
            || s.contains("network is unreachable")
            || s.contains("remote end closed connection")
        {
            return Self::Network(detail);
        }

        // Permanent restrictions
        if s.contains("private video")
            || s.contains("video unavailable")
            || s.contains("has been removed")
            || s.contains("not available in your country")
            || s.contains("drm")
            || s.contains("members only")
            || s.contains("sign in to confirm your age")
        {
            return Self::Unavailable(detail);
        }

        if s.contains("unsupported url") || s.contains("is not a valid url") {
            return Self::InvalidUrl(detail);
        }

        if s.contains("command not found") || s.contains("no such file or directory") {
            return Self::ToolNotFound(detail);
        }

        Self::Unknown(detail)
    }
}

impl IsRetryable for DownloadError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkTimeout(_) | Self::Network(_) | Self::RateLimited(_)
        )
    }
}

impl From<String> for DownloadError {
    fn from(s: String) -> Self {
        Self::from_stderr(&s)
    }
}

/// Keep the `ERROR:` lines of yt-dlp output, falling back to the first few lines.
fn summarize(stderr: &str) -> String {
    let errors: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with("ERROR:"))
        .collect();

    let lines = if errors.is_empty() {
        stderr
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .take(3)
            .collect::<Vec<_>>()
    } else {
        errors
    };

    lines.join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_detection() {
        let err = DownloadError::from_stderr("ERROR: Read timed out. (read timeout=20)");
        assert!(matches!(err, DownloadError::NetworkTimeout(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_rate_limit_detection() {
        let err = DownloadError::from_stderr("ERROR: HTTP Error 429: Too Many Requests");
        assert!(matches!(err, DownloadError::RateLimited(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_http_status_classification() {
        let err = DownloadError::from_stderr("ERROR: [vk] 123: HTTP Error 503: Service Unavailable");
        assert!(matches!(err, DownloadError::Network(_)));
        assert!(err.is_retryable());

        let err = DownloadError::from_stderr("ERROR: [rutube] abc: HTTP Error 404: Not Found");
        assert!(matches!(err, DownloadError::Unavailable(_)));
    }

    #[test]
    fn test_unavailable_is_permanent() {
        let err = DownloadError::from_stderr("ERROR: [youtube] abc: Private video");
        assert!(matches!(err, DownloadError::Unavailable(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_unsupported_url() {
        let err = DownloadError::from_stderr("ERROR: Unsupported URL: https://example.com");
        assert!(matches!(err, DownloadError::InvalidUrl(_)));
    }

    #[test]
    fn test_summary_keeps_error_lines() {
        let stderr = "WARNING: something\nERROR: first\nnoise\nERROR: second\n";
        match DownloadError::from_stderr(stderr) {
            DownloadError::Unknown(detail) => assert_eq!(detail, "ERROR: first | ERROR: second"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
