// Runtime settings loaded from the environment and `.env` files

use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MAX_PARALLEL: usize = 5;
pub const MAX_PARALLEL_LIMIT: usize = 10;
pub const DEFAULT_BOT_API_URL: &str = "https://api.telegram.org";

/// Cloud Bot API upload limit
const CLOUD_UPLOAD_LIMIT_MB: u64 = 50;
/// Self-hosted Bot API servers accept files up to 2 GB
const LOCAL_UPLOAD_LIMIT_MB: u64 = 2000;

const DEFAULT_DOWNLOAD_RETRIES: u32 = 2;
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 1800;

pub const PARALLEL_KEY: &str = "MAX_PARALLEL_DOWNLOADS";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{key} is not set")]
    Missing { key: String },

    #[error("invalid {key} '{value}': {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },

    #[error("cannot access {path}: {message}")]
    Io { path: String, message: String },

    #[error("malformed {path}: {message}")]
    Parse { path: String, message: String },
}

impl ConfigError {
    fn io(path: &Path, err: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

/// Credentials needed by the upload flow only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramCredentials {
    pub api_id: i64,
    pub api_hash: String,
    pub bot_token: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub config_dir: PathBuf,
    /// `.env` file that `config set-parallel` writes to
    pub env_file: PathBuf,
    pub cookies_dir: PathBuf,
    pub downloads_dir: PathBuf,
    pub entities_file: PathBuf,
    pub platforms_file: PathBuf,

    pub telegram_api_id: Option<i64>,
    pub telegram_api_hash: Option<String>,
    pub bot_token: Option<String>,
    pub youtube_api_key: Option<String>,
    pub bot_api_url: String,
    pub max_upload_mb: u64,

    /// Download concurrency, always within 1..=10
    pub max_parallel: usize,
    pub download_retries: u32,
    pub download_timeout: Duration,

    pub ytdlp_path: Option<PathBuf>,
    pub ytdlp_python: Option<String>,
    pub proxy: Option<String>,
}

impl Settings {
    /// Read settings from the process environment and `.env` files.
    ///
    /// Precedence is process environment, then `<config_dir>/.env` (the file
    /// `config set-parallel` writes), then `./.env`. `CONFIG_DIR` itself comes
    /// from the process environment or `./.env`. The process environment is
    /// never modified.
    pub fn from_env() -> Result<Self, ConfigError> {
        let local = read_env_file(Path::new(".env"))?;
        let none = HashMap::new();
        let config_dir = config_dir_from(|k| layered(k, |k| std::env::var(k).ok(), &none, &local));
        let config = read_env_file(&config_dir.join(".env"))?;

        Self::from_lookup(|k| layered(k, |k| std::env::var(k).ok(), &config, &local))
    }

    /// Build settings from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let path_or = |key: &str, default: PathBuf| get(key).map(PathBuf::from).unwrap_or(default);

        let config_dir = config_dir_from(&lookup);
        let cache_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".cache")
            .join("social");

        let bot_api_url = get("TELEGRAM_BOT_API_URL")
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BOT_API_URL.to_string());
        let default_limit = if bot_api_url == DEFAULT_BOT_API_URL {
            CLOUD_UPLOAD_LIMIT_MB
        } else {
            LOCAL_UPLOAD_LIMIT_MB
        };

        let max_parallel = match get(PARALLEL_KEY) {
            Some(raw) => clamp_parallel(parse_number::<i64>(PARALLEL_KEY, &raw)?),
            None => DEFAULT_MAX_PARALLEL,
        };

        let download_retries = get("DOWNLOAD_RETRIES")
            .map(|raw| parse_number::<u32>("DOWNLOAD_RETRIES", &raw))
            .transpose()?
            .unwrap_or(DEFAULT_DOWNLOAD_RETRIES)
            .min(crate::retry::MAX_RETRIES);

        let timeout_secs = get("DOWNLOAD_TIMEOUT_SECS")
            .map(|raw| parse_number::<u64>("DOWNLOAD_TIMEOUT_SECS", &raw))
            .transpose()?
            .unwrap_or(DEFAULT_DOWNLOAD_TIMEOUT_SECS)
            .max(1);

        Ok(Self {
            env_file: config_dir.join(".env"),
            cookies_dir: path_or("COOKIES_DIR", config_dir.join("cookies")),
            downloads_dir: path_or("DOWNLOADS_DIR", cache_dir.join("downloads")),
            entities_file: path_or("ENTITIES_FILE", config_dir.join("entities.json")),
            platforms_file: path_or("PLATFORMS_FILE", config_dir.join("platforms.json")),
            config_dir,

            telegram_api_id: get("TELEGRAM_API_ID")
                .map(|raw| parse_number::<i64>("TELEGRAM_API_ID", &raw))
                .transpose()?,
            telegram_api_hash: get("TELEGRAM_API_HASH"),
            bot_token: get("BOT_TOKEN"),
            youtube_api_key: get("YOUTUBE_API_KEY"),
            bot_api_url,
            max_upload_mb: get("TELEGRAM_MAX_UPLOAD_MB")
                .map(|raw| parse_number::<u64>("TELEGRAM_MAX_UPLOAD_MB", &raw))
                .transpose()?
                .unwrap_or(default_limit),

            max_parallel,
            download_retries,
            download_timeout: Duration::from_secs(timeout_secs),

            ytdlp_path: get("YTDLP_PATH").map(PathBuf::from),
            ytdlp_python: get("YTDLP_PYTHON"),
            proxy: get("PROXY"),
        })
    }

    /// Credentials for the upload flow, failing on the first missing one.
    pub fn require_telegram(&self) -> Result<TelegramCredentials, ConfigError> {
        let missing = |key: &str| ConfigError::Missing {
            key: key.to_string(),
        };

        let api_id = self
            .telegram_api_id
            .filter(|id| *id != 0)
            .ok_or_else(|| missing("TELEGRAM_API_ID"))?;
        let api_hash = self
            .telegram_api_hash
            .clone()
            .ok_or_else(|| missing("TELEGRAM_API_HASH"))?;
        let bot_token = self.bot_token.clone().ok_or_else(|| missing("BOT_TOKEN"))?;

        Ok(TelegramCredentials {
            api_id,
            api_hash,
            bot_token,
        })
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }

    /// Settings as displayed by `config show`, secrets masked
    pub fn view(&self) -> SettingsView {
        let path = |p: &Path| p.display().to_string();
        SettingsView {
            config_dir: path(&self.config_dir),
            env_file: path(&self.env_file),
            cookies_dir: path(&self.cookies_dir),
            downloads_dir: path(&self.downloads_dir),
            entities_file: path(&self.entities_file),
            platforms_file: path(&self.platforms_file),
            max_parallel_downloads: self.max_parallel,
            download_retries: self.download_retries,
            download_timeout_secs: self.download_timeout.as_secs(),
            telegram_api_id: self.telegram_api_id.map(|id| mask(&id.to_string())),
            telegram_api_hash: self.telegram_api_hash.as_deref().map(mask),
            bot_token: self.bot_token.as_deref().map(mask),
            youtube_api_key: self.youtube_api_key.as_deref().map(mask),
            bot_api_url: self.bot_api_url.clone(),
            max_upload_mb: self.max_upload_mb,
            proxy: self.proxy.clone(),
        }
    }
}

/// Printable snapshot of [`Settings`]
#[derive(Debug, Clone, Serialize)]
pub struct SettingsView {
    pub config_dir: String,
    pub env_file: String,
    pub cookies_dir: String,
    pub downloads_dir: String,
    pub entities_file: String,
    pub platforms_file: String,
    pub max_parallel_downloads: usize,
    pub download_retries: u32,
    pub download_timeout_secs: u64,
    pub telegram_api_id: Option<String>,
    pub telegram_api_hash: Option<String>,
    pub bot_token: Option<String>,
    pub youtube_api_key: Option<String>,
    pub bot_api_url: String,
    pub max_upload_mb: u64,
    pub proxy: Option<String>,
}

impl SettingsView {
    pub fn rows(&self) -> Vec<(&'static str, String)> {
        let opt = |v: &Option<String>| v.clone().unwrap_or_else(|| "(not set)".to_string());
        vec![
            ("CONFIG_DIR", self.config_dir.clone()),
            ("ENV_FILE", self.env_file.clone()),
            ("COOKIES_DIR", self.cookies_dir.clone()),
            ("DOWNLOADS_DIR", self.downloads_dir.clone()),
            ("ENTITIES_FILE", self.entities_file.clone()),
            ("PLATFORMS_FILE", self.platforms_file.clone()),
            ("MAX_PARALLEL_DOWNLOADS", self.max_parallel_downloads.to_string()),
            ("DOWNLOAD_RETRIES", self.download_retries.to_string()),
            ("DOWNLOAD_TIMEOUT_SECS", self.download_timeout_secs.to_string()),
            ("TELEGRAM_API_ID", opt(&self.telegram_api_id)),
            ("TELEGRAM_API_HASH", opt(&self.telegram_api_hash)),
            ("BOT_TOKEN", opt(&self.bot_token)),
            ("YOUTUBE_API_KEY", opt(&self.youtube_api_key)),
            ("TELEGRAM_BOT_API_URL", self.bot_api_url.clone()),
            ("TELEGRAM_MAX_UPLOAD_MB", self.max_upload_mb.to_string()),
            ("PROXY", opt(&self.proxy)),
        ]
    }
}

/// Clamp a requested concurrency into 1..=10, logging when it was out of range.
pub fn clamp_parallel(requested: i64) -> usize {
    let clamped = requested.clamp(1, MAX_PARALLEL_LIMIT as i64) as usize;
    if clamped as i64 != requested {
        tracing::warn!(requested, clamped, "{} out of range, clamped", PARALLEL_KEY);
    }
    clamped
}

/// Write `MAX_PARALLEL_DOWNLOADS=<n>` into an env file, replacing an
/// existing assignment or appending one. Creates the file if needed.
pub fn persist_parallel(env_file: &Path, value: usize) -> Result<(), ConfigError> {
    if !(1..=MAX_PARALLEL_LIMIT).contains(&value) {
        return Err(ConfigError::Invalid {
            key: PARALLEL_KEY.to_string(),
            value: value.to_string(),
            reason: format!("must be between 1 and {}", MAX_PARALLEL_LIMIT),
        });
    }

    if let Some(parent) = env_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::io(parent, e))?;
    }

    let existing = match std::fs::read_to_string(env_file) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(ConfigError::io(env_file, e)),
    };

    let assignment = format!("{}={}", PARALLEL_KEY, value);
    let mut replaced = false;
    let mut lines: Vec<String> = existing
        .lines()
        .map(|line| {
            let is_key = line
                .trim_start()
                .strip_prefix(PARALLEL_KEY)
                .map(|rest| rest.trim_start().starts_with('='))
                .unwrap_or(false);
            if is_key && !replaced {
                replaced = true;
                assignment.clone()
            } else {
                line.to_string()
            }
        })
        .collect();

    if !replaced {
        lines.push(assignment);
    }

    let mut content = lines.join("\n");
    content.push('\n');
    std::fs::write(env_file, content).map_err(|e| ConfigError::io(env_file, e))?;

    tracing::info!(path = %env_file.display(), value, "Persisted {}", PARALLEL_KEY);
    Ok(())
}

/// Parse a `.env` file without touching the process environment.
/// A missing file reads as empty.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let parse_error = |e: dotenvy::Error| ConfigError::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    };

    let iter = match dotenvy::from_path_iter(path) {
        Ok(iter) => iter,
        Err(e) if e.not_found() => return Ok(HashMap::new()),
        Err(e) => return Err(parse_error(e)),
    };
    let vars = iter
        .collect::<Result<HashMap<_, _>, _>>()
        .map_err(parse_error)?;

    tracing::debug!(path = %path.display(), count = vars.len(), "Loaded .env");
    Ok(vars)
}

/// First hit wins: process, then config-dir file, then local file
fn layered<P>(
    key: &str,
    process: P,
    config: &HashMap<String, String>,
    local: &HashMap<String, String>,
) -> Option<String>
where
    P: Fn(&str) -> Option<String>,
{
    process(key)
        .or_else(|| config.get(key).cloned())
        .or_else(|| local.get(key).cloned())
}

fn config_dir_from<F>(lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    lookup("CONFIG_DIR")
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config")
                .join("social")
        })
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
        key: key.to_string(),
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

/// Keep the first and last two characters of a secret.
fn mask(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 6 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}****{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[("CONFIG_DIR", "/cfg")]).unwrap();
        assert_eq!(s.max_parallel, DEFAULT_MAX_PARALLEL);
        assert_eq!(s.env_file, PathBuf::from("/cfg/.env"));
        assert_eq!(s.cookies_dir, PathBuf::from("/cfg/cookies"));
        assert_eq!(s.entities_file, PathBuf::from("/cfg/entities.json"));
        assert_eq!(s.bot_api_url, DEFAULT_BOT_API_URL);
        assert_eq!(s.max_upload_mb, 50);
        assert_eq!(s.download_retries, 2);
        assert!(s.proxy.is_none());
    }

    #[test]
    fn test_parallel_is_clamped() {
        assert_eq!(settings(&[(PARALLEL_KEY, "25")]).unwrap().max_parallel, 10);
        assert_eq!(settings(&[(PARALLEL_KEY, "0")]).unwrap().max_parallel, 1);
        assert_eq!(settings(&[(PARALLEL_KEY, " 3 ")]).unwrap().max_parallel, 3);
        assert!(matches!(
            settings(&[(PARALLEL_KEY, "many")]),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_custom_bot_api_raises_limit() {
        let s = settings(&[("TELEGRAM_BOT_API_URL", "http://localhost:8081/")]).unwrap();
        assert_eq!(s.bot_api_url, "http://localhost:8081");
        assert_eq!(s.max_upload_mb, 2000);
    }

    #[test]
    fn test_require_telegram() {
        let s = settings(&[("TELEGRAM_API_ID", "123"), ("TELEGRAM_API_HASH", "h")]).unwrap();
        assert_eq!(
            s.require_telegram(),
            Err(ConfigError::Missing {
                key: "BOT_TOKEN".into()
            })
        );

        let s = settings(&[
            ("TELEGRAM_API_ID", "123"),
            ("TELEGRAM_API_HASH", "h"),
            ("BOT_TOKEN", "1:abc"),
        ])
        .unwrap();
        assert_eq!(s.require_telegram().unwrap().api_id, 123);

        assert!(settings(&[("TELEGRAM_API_ID", "abc")]).is_err());
    }

    #[test]
    fn test_secrets_are_masked() {
        let s = settings(&[("BOT_TOKEN", "123456:ABCDEFG")]).unwrap();
        let view = s.view();
        assert_eq!(view.bot_token.as_deref(), Some("12****FG"));
        assert!(view.telegram_api_hash.is_none());
    }

    #[test]
    fn test_persist_parallel_updates_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let env = dir.path().join("nested").join(".env");

        persist_parallel(&env, 4).unwrap();
        assert_eq!(std::fs::read_to_string(&env).unwrap(), "MAX_PARALLEL_DOWNLOADS=4\n");

        std::fs::write(&env, "BOT_TOKEN=x\nMAX_PARALLEL_DOWNLOADS=2\nPROXY=y\n").unwrap();
        persist_parallel(&env, 7).unwrap();
        assert_eq!(
            std::fs::read_to_string(&env).unwrap(),
            "BOT_TOKEN=x\nMAX_PARALLEL_DOWNLOADS=7\nPROXY=y\n"
        );

        assert!(persist_parallel(&env, 11).is_err());
        assert!(persist_parallel(&env, 0).is_err());
    }

    #[test]
    fn test_persisted_parallel_beats_local_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let local_file = dir.path().join(".env");
        let config_file = dir.path().join("config").join(".env");
        std::fs::write(&local_file, "MAX_PARALLEL_DOWNLOADS=2\nPROXY=socks5://local\n").unwrap();
        persist_parallel(&config_file, 7).unwrap();

        let local = read_env_file(&local_file).unwrap();
        let config = read_env_file(&config_file).unwrap();
        let no_process = |_: &str| None;

        let s = Settings::from_lookup(|k| layered(k, no_process, &config, &local)).unwrap();
        assert_eq!(s.max_parallel, 7);
        assert_eq!(s.proxy.as_deref(), Some("socks5://local"));

        let process = |k: &str| (k == PARALLEL_KEY).then(|| "3".to_string());
        let s = Settings::from_lookup(|k| layered(k, process, &config, &local)).unwrap();
        assert_eq!(s.max_parallel, 3);
    }

    #[test]
    fn test_read_env_file_missing_and_malformed() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_env_file(&dir.path().join("absent.env")).unwrap().is_empty());

        let bad = dir.path().join("bad.env");
        std::fs::write(&bad, "GOOD=1\nBROKEN='unterminated\n").unwrap();
        assert!(matches!(
            read_env_file(&bad),
            Err(ConfigError::Parse { .. })
        ));
    }
}
