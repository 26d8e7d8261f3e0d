// Per-platform download profile: format selector, cookies, staging dir

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::Platform;
use crate::caption;
use crate::config::{ConfigError, Settings};

const DEFAULT_FORMAT: &str = "best";
/// Prefer AAC audio so the merged mp4 plays inline in Telegram
const YOUTUBE_FORMAT: &str = "bestvideo+bestaudio[acodec^=mp4a]/bestvideo*+bestaudio/best";

/// One entry of `platforms.json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PlatformOverride {
    pub format: Option<String>,
    /// Cookie file name, relative to the cookies dir unless absolute
    pub cookies: Option<String>,
    pub download_dir: Option<PathBuf>,
    #[serde(default)]
    pub extra_args: Vec<String>,
    pub caption_template: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformProfile {
    pub platform: Platform,
    /// yt-dlp `-f` selector
    pub format: String,
    /// Netscape cookie file, passed only when it exists
    pub cookies: PathBuf,
    /// Staging directory for this platform
    pub download_dir: PathBuf,
    pub extra_args: Vec<String>,
    pub caption_template: Option<String>,
}

impl PlatformProfile {
    pub fn new(platform: Platform, settings: &Settings, over: Option<&PlatformOverride>) -> Self {
        let over = over.cloned().unwrap_or_default();

        let default_format = match platform {
            Platform::YouTube => YOUTUBE_FORMAT,
            _ => DEFAULT_FORMAT,
        };

        let cookie_name = over
            .cookies
            .unwrap_or_else(|| format!("{}.txt", platform.as_str()));

        Self {
            platform,
            format: over.format.unwrap_or_else(|| default_format.to_string()),
            cookies: settings.cookies_dir.join(cookie_name),
            download_dir: over
                .download_dir
                .unwrap_or_else(|| settings.downloads_dir.join(platform.as_str())),
            extra_args: over.extra_args,
            caption_template: over.caption_template,
        }
    }

    pub fn cookies_if_present(&self) -> Option<&Path> {
        self.cookies.is_file().then_some(self.cookies.as_path())
    }
}

/// Load `platforms.json`. A missing file means no overrides.
pub fn load_overrides(path: &Path) -> Result<HashMap<Platform, PlatformOverride>, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "No platforms file, using defaults");
            return Ok(HashMap::new());
        }
        Err(e) => {
            return Err(ConfigError::Io {
                path: path.display().to_string(),
                message: e.to_string(),
            })
        }
    };

    let raw: HashMap<String, PlatformOverride> =
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    let mut overrides = HashMap::with_capacity(raw.len());
    for (name, over) in raw {
        let platform: Platform = name.parse().map_err(|reason| ConfigError::Invalid {
            key: "platforms".to_string(),
            value: name.clone(),
            reason,
        })?;

        // A broken template fails only the affected uploads, not startup.
        if let Some(template) = &over.caption_template {
            if let Err(e) = caption::validate(template) {
                tracing::warn!(platform = %platform, error = %e, "Invalid caption template");
            }
        }

        overrides.insert(platform, over);
    }

    tracing::info!(path = %path.display(), count = overrides.len(), "Loaded platform overrides");
    Ok(overrides)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings::from_lookup(|k| match k {
            "CONFIG_DIR" => Some("/cfg".into()),
            "DOWNLOADS_DIR" => Some("/dl".into()),
            _ => None,
        })
        .unwrap()
    }

    #[test]
    fn test_defaults() {
        let s = settings();
        let yt = PlatformProfile::new(Platform::YouTube, &s, None);
        assert_eq!(yt.format, YOUTUBE_FORMAT);
        assert_eq!(yt.cookies, PathBuf::from("/cfg/cookies/youtube.txt"));
        assert_eq!(yt.download_dir, PathBuf::from("/dl/youtube"));

        let vk = PlatformProfile::new(Platform::Vk, &s, None);
        assert_eq!(vk.format, "best");
        assert!(vk.cookies_if_present().is_none());
    }

    #[test]
    fn test_overrides_apply() {
        let over = PlatformOverride {
            format: Some("worst".into()),
            cookies: Some("tt.txt".into()),
            download_dir: Some("/tmp/tt".into()),
            extra_args: vec!["--no-part".into()],
            caption_template: Some("{title}".into()),
        };
        let p = PlatformProfile::new(Platform::TikTok, &settings(), Some(&over));
        assert_eq!(p.format, "worst");
        assert_eq!(p.cookies, PathBuf::from("/cfg/cookies/tt.txt"));
        assert_eq!(p.download_dir, PathBuf::from("/tmp/tt"));
        assert_eq!(p.extra_args, vec!["--no-part".to_string()]);
    }

    #[test]
    fn test_load_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("platforms.json");

        assert!(load_overrides(&path).unwrap().is_empty());

        std::fs::write(&path, r#"{"rutube": {"format": "best[height<=720]"}}"#).unwrap();
        let overrides = load_overrides(&path).unwrap();
        assert_eq!(
            overrides[&Platform::Rutube].format.as_deref(),
            Some("best[height<=720]")
        );

        std::fs::write(&path, r#"{"dailymotion": {}}"#).unwrap();
        assert!(matches!(
            load_overrides(&path),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
