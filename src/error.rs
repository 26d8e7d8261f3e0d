// Crate-level error taxonomy
//
// Per-item errors are stored inside result records and never abort a batch.
// Only `Configuration` is meant to reach the binary boundary.

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::caption::TemplateError;
use crate::config::ConfigError;
use crate::downloader::errors::DownloadError;
use crate::platform::{ContentType, Platform};
use crate::upload::UploadError;

#[derive(Debug, Clone, Error)]
pub enum Error {
    /// URL matches no supported platform
    #[error("unsupported platform: {url}")]
    UnsupportedPlatform { url: String },

    #[error(transparent)]
    Download(#[from] DownloadError),

    /// Upload not attempted because the download failed
    #[error("download failed")]
    DownloadSkipped,

    /// No destination configured for this platform and content type
    #[error("no destination configured for {platform}/{content_type}")]
    UnresolvedEntity {
        platform: Platform,
        content_type: ContentType,
    },

    #[error("caption template: {0}")]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("cancelled")]
    Cancelled,

    #[error("configuration: {0}")]
    Configuration(#[from] ConfigError),
}

impl Error {
    /// Stable machine-readable kind, used in JSON reports
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedPlatform { .. } => "unsupported_platform",
            Self::Cancelled => "cancelled",
            Self::Download(_) => "download",
            Self::DownloadSkipped => "download_skipped",
            Self::UnresolvedEntity { .. } => "unresolved_entity",
            Self::Template(_) => "template",
            Self::Upload(_) => "upload",
            Self::Configuration(_) => "configuration",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl Serialize for Error {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let mut s = serializer.serialize_struct("Error", 2)?;
        s.serialize_field("kind", self.kind())?;
        s.serialize_field("message", &self.to_string())?;
        s.end()
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_message() {
        let err = Error::UnsupportedPlatform {
            url: "https://bad-url".into(),
        };
        assert_eq!(err.kind(), "unsupported_platform");
        assert_eq!(err.to_string(), "unsupported platform: https://bad-url");

        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "unsupported_platform");
    }

    #[test]
    fn test_download_error_is_wrapped() {
        let err: Error = DownloadError::Unavailable("Private video".into()).into();
        assert_eq!(err.kind(), "download");
        assert_eq!(err.to_string(), "video unavailable: Private video");
        assert!(!err.is_cancelled());
        assert!(Error::Cancelled.is_cancelled());
    }

    #[test]
    fn test_unresolved_entity_message() {
        let err = Error::UnresolvedEntity {
            platform: Platform::YouTube,
            content_type: ContentType::Short,
        };
        assert_eq!(err.to_string(), "no destination configured for youtube/short");
    }
}
