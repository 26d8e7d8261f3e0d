// External tool detection (yt-dlp, ffmpeg)
//
// Detection spawns `which` and `--version` synchronously; async callers go
// through `detect_all` / `find`, which run it on the blocking pool.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ToolType {
    YtDlp,
    Ffmpeg,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "yt-dlp",
            ToolType::Ffmpeg => "ffmpeg",
        }
    }

    fn version_arg(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "--version",
            ToolType::Ffmpeg => "-version",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub tool_type: ToolType,
    pub version: Option<String>,
    pub path: Option<String>,
    pub is_available: bool,
}

/// Locates external binaries. An explicit yt-dlp path wins over detection.
#[derive(Debug, Clone, Default)]
pub struct ToolManager {
    ytdlp_override: Option<PathBuf>,
}

impl ToolManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ytdlp_path(mut self, path: Option<PathBuf>) -> Self {
        self.ytdlp_override = path;
        self
    }

    pub fn get_tool_info(&self, tool_type: ToolType) -> ToolInfo {
        let path = self.locate(tool_type);
        let version = path
            .as_deref()
            .and_then(|p| Self::get_version(p, tool_type));

        ToolInfo {
            name: tool_type.as_str().to_string(),
            tool_type,
            version,
            is_available: path.as_deref().map(|p| Path::new(p).exists()).unwrap_or(false),
            path,
        }
    }

    pub fn get_all_tools(&self) -> Vec<ToolInfo> {
        vec![
            self.get_tool_info(ToolType::YtDlp),
            self.get_tool_info(ToolType::Ffmpeg),
        ]
    }

    /// [`ToolManager::get_all_tools`] on the blocking thread pool
    pub async fn detect_all(&self) -> Vec<ToolInfo> {
        let manager = self.clone();
        tokio::task::spawn_blocking(move || manager.get_all_tools())
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Tool detection failed");
                Vec::new()
            })
    }

    /// [`ToolManager::locate`] on the blocking thread pool
    pub async fn find(&self, tool_type: ToolType) -> Option<String> {
        let manager = self.clone();
        tokio::task::spawn_blocking(move || manager.locate(tool_type))
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(tool = tool_type.as_str(), error = %e, "Tool lookup failed");
                None
            })
    }

    /// Find a tool binary: override, common install paths, then `which`.
    pub fn locate(&self, tool_type: ToolType) -> Option<String> {
        if tool_type == ToolType::YtDlp {
            if let Some(path) = &self.ytdlp_override {
                return Some(path.display().to_string());
            }
        }

        let binary_name = tool_type.as_str();

        let common_paths = [
            format!("/opt/homebrew/bin/{}", binary_name),
            format!("/usr/local/bin/{}", binary_name),
            format!("/usr/bin/{}", binary_name),
        ];

        if let Some(path) = common_paths.into_iter().find(|p| Path::new(p).exists()) {
            return Some(path);
        }

        let output = Command::new("which").arg(binary_name).output().ok()?;
        if !output.status.success() {
            return None;
        }
        let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!path.is_empty()).then_some(path)
    }

    fn get_version(path: &str, tool_type: ToolType) -> Option<String> {
        match Command::new(path).arg(tool_type.version_arg()).output() {
            Ok(output) if output.status.success() => {
                // ffmpeg prints a banner; the first line carries the version
                String::from_utf8_lossy(&output.stdout)
                    .lines()
                    .next()
                    .map(|l| l.trim().to_string())
            }
            _ => None,
        }
    }
}
