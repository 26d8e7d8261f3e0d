// Data models for download requests and results

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::Error;
use crate::platform::PlatformInfo;

/// One input URL, created once per batch entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadRequest {
    /// Unique id, keys the staging path
    pub id: Uuid,
    pub url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub requested_at: OffsetDateTime,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: url.into(),
            requested_at: OffsetDateTime::now_utc(),
        }
    }
}

/// A request that passed platform resolution and is ready for the pool
#[derive(Debug, Clone)]
pub struct PendingDownload {
    pub request: DownloadRequest,
    pub platform_info: PlatformInfo,
}

/// Video metadata as emitted by yt-dlp `--dump-json`.
///
/// Kept as an opaque key/value bag; the typed accessors treat empty strings
/// as missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(Map<String, Value>);

impl Metadata {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    /// First non-empty string among `keys`
    pub fn str_of(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .filter_map(|k| self.0.get(*k).and_then(Value::as_str))
            .map(str::trim)
            .find(|s| !s.is_empty())
    }

    /// Integer field, accepting floats and numeric strings
    pub fn int(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.str_of(&["id"])
    }

    pub fn title(&self) -> Option<&str> {
        self.str_of(&["fulltitle", "title"])
    }

    pub fn author(&self) -> Option<&str> {
        self.str_of(&["uploader", "channel", "creator"])
    }

    pub fn description(&self) -> Option<&str> {
        self.str_of(&["description"])
    }

    /// Duration in whole seconds
    pub fn duration(&self) -> Option<u64> {
        self.int("duration").and_then(|d| u64::try_from(d).ok())
    }

    pub fn source_url(&self) -> Option<&str> {
        self.str_of(&["webpage_url", "original_url"])
    }

    /// Path of the produced media file, if yt-dlp reported one
    pub fn filepath(&self) -> Option<PathBuf> {
        self.get("requested_downloads")
            .and_then(Value::as_array)
            .and_then(|downloads| downloads.first())
            .and_then(|d| d.get("filepath"))
            .and_then(Value::as_str)
            .or_else(|| self.str_of(&["filepath", "_filename"]))
            .map(PathBuf::from)
    }

    pub fn view_count(&self) -> Option<i64> {
        self.int("view_count")
    }

    /// Extractor name as reported by yt-dlp (`youtube`, `vk`, ...)
    pub fn extractor(&self) -> Option<&str> {
        self.str_of(&["extractor_key", "extractor"])
    }

    /// Formats offered by the platform, in yt-dlp order
    pub fn formats(&self) -> Vec<FormatInfo> {
        self.get("formats")
            .and_then(Value::as_array)
            .map(|formats| {
                formats
                    .iter()
                    .filter_map(|f| serde_json::from_value(f.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// One entry of yt-dlp's `formats` list
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FormatInfo {
    #[serde(default)]
    pub format_id: String,
    pub ext: Option<String>,
    pub resolution: Option<String>,
    pub format_note: Option<String>,
}

/// A finished fetch: media file on disk plus its metadata
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedVideo {
    pub path: PathBuf,
    pub metadata: Metadata,
}

#[derive(Debug, Clone)]
pub enum DownloadOutcome {
    Success { local_path: PathBuf, metadata: Metadata },
    Failure { reason: Error },
}

/// Produced exactly once per request by the pool
#[derive(Debug, Clone)]
pub struct DownloadResult {
    pub request: DownloadRequest,
    pub platform_info: PlatformInfo,
    pub outcome: DownloadOutcome,
}

impl DownloadResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, DownloadOutcome::Success { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(value: Value) -> Metadata {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_accessors_skip_empty_values() {
        let m = meta(json!({
            "fulltitle": "",
            "title": "Fallback title",
            "uploader": null,
            "channel": "Chan",
            "duration": 61.7,
            "view_count": "1200"
        }));
        assert_eq!(m.title(), Some("Fallback title"));
        assert_eq!(m.author(), Some("Chan"));
        assert_eq!(m.duration(), Some(61));
        assert_eq!(m.int("view_count"), Some(1200));
        assert_eq!(m.description(), None);
    }

    #[test]
    fn test_formats() {
        let m = meta(json!({
            "formats": [
                {"format_id": "18", "ext": "mp4", "resolution": "640x360", "format_note": "360p"},
                {"format_id": "sb0", "ext": "mhtml", "resolution": null},
                "garbage"
            ]
        }));
        let formats = m.formats();
        assert_eq!(formats.len(), 2);
        assert_eq!(formats[0].format_id, "18");
        assert_eq!(formats[0].format_note.as_deref(), Some("360p"));
        assert_eq!(formats[1].resolution, None);
        assert!(Metadata::default().formats().is_empty());
    }

    #[test]
    fn test_filepath_prefers_requested_downloads() {
        let m = meta(json!({
            "_filename": "/tmp/a.webm",
            "requested_downloads": [{"filepath": "/tmp/a.mp4"}]
        }));
        assert_eq!(m.filepath(), Some(PathBuf::from("/tmp/a.mp4")));

        let m = meta(json!({"_filename": "/tmp/b.mkv"}));
        assert_eq!(m.filepath(), Some(PathBuf::from("/tmp/b.mkv")));
    }

    #[test]
    fn test_requests_get_distinct_ids() {
        let a = DownloadRequest::new("https://youtube.com/watch?v=A");
        let b = DownloadRequest::new("https://youtube.com/watch?v=A");
        assert_ne!(a.id, b.id);
    }
}
