// Platform resolution - maps a URL to a platform and content type
//
// Resolution is purely syntactic: no network requests are made. The host
// picks the platform, path segments pick the content type.

mod profile;
mod registry;

pub use profile::{load_overrides, PlatformOverride, PlatformProfile};
pub use registry::{PlatformEntry, PlatformRegistry};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::error::Error;

/// Supported source platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    YouTube,
    Vk,
    TikTok,
    Rutube,
}

impl Platform {
    pub const ALL: [Platform; 4] = [Self::YouTube, Self::Vk, Self::TikTok, Self::Rutube];

    /// Lowercase key used in config files, cookie names and staging dirs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::YouTube => "youtube",
            Self::Vk => "vk",
            Self::TikTok => "tiktok",
            Self::Rutube => "rutube",
        }
    }

    /// Human-readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::YouTube => "YouTube",
            Self::Vk => "VK",
            Self::TikTok => "TikTok",
            Self::Rutube => "Rutube",
        }
    }

    fn from_host(host: &str) -> Option<Self> {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        let host = host
            .strip_prefix("www.")
            .or_else(|| host.strip_prefix("m."))
            .unwrap_or(&host);

        match host {
            "youtube.com" | "music.youtube.com" | "youtu.be" | "youtube-nocookie.com" => {
                Some(Self::YouTube)
            }
            "vk.com" | "vk.ru" | "vkvideo.ru" => Some(Self::Vk),
            "tiktok.com" | "vm.tiktok.com" | "vt.tiktok.com" => Some(Self::TikTok),
            "rutube.ru" => Some(Self::Rutube),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown platform '{}'", s))
    }
}

/// Content classification, drives caption template and destination topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Video,
    Short,
    Clip,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Short => "short",
            Self::Clip => "clip",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of URL classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlatformInfo {
    pub platform: Platform,
    pub content_type: ContentType,
}

impl fmt::Display for PlatformInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.platform, self.content_type)
    }
}

/// Classify a URL.
///
/// Fails with [`Error::UnsupportedPlatform`] for malformed URLs, non-http
/// schemes and hosts outside the supported set.
pub fn resolve(url: &str) -> Result<PlatformInfo, Error> {
    let unsupported = || Error::UnsupportedPlatform {
        url: url.to_string(),
    };

    let parsed = Url::parse(url.trim()).map_err(|_| unsupported())?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(unsupported());
    }

    let platform = parsed
        .host_str()
        .and_then(Platform::from_host)
        .ok_or_else(unsupported)?;

    let segments: Vec<String> = parsed
        .path_segments()
        .map(|s| {
            s.filter(|seg| !seg.is_empty())
                .map(|seg| seg.to_ascii_lowercase())
                .collect()
        })
        .unwrap_or_default();

    let content_type = classify(platform, &segments);

    Ok(PlatformInfo {
        platform,
        content_type,
    })
}

fn classify(platform: Platform, segments: &[String]) -> ContentType {
    match platform {
        Platform::TikTok => ContentType::Short,
        Platform::Vk => {
            if segments.iter().any(|s| s.starts_with("clip")) {
                ContentType::Clip
            } else {
                ContentType::Video
            }
        }
        Platform::YouTube | Platform::Rutube => {
            if segments.iter().any(|s| s == "shorts") {
                ContentType::Short
            } else {
                ContentType::Video
            }
        }
    }
}
