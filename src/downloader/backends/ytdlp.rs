// yt-dlp fetcher
//
// Runs the native `yt-dlp` binary when available and falls back to
// `python3 -m yt_dlp` when the binary cannot be started. Media lands at
// `<output_stem>.<ext>`; metadata comes from `--dump-json`.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use crate::downloader::errors::DownloadError;
use crate::downloader::models::{FetchedVideo, Metadata};
use crate::downloader::tools::{ToolManager, ToolType};
use crate::downloader::traits::{FetchOptions, VideoFetcher};
use crate::downloader::utils::{cleanup_partial, find_output, proxy_args, run_output_with_timeout};

/// Socket-level timeout handed to yt-dlp, independent of the run timeout
const SOCKET_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Runner {
    Binary(String),
    Python(String),
}

impl Runner {
    fn command(&self, args: Vec<String>) -> (String, Vec<String>) {
        match self {
            Runner::Binary(path) => (path.clone(), args),
            Runner::Python(python) => {
                let mut full = vec!["-m".to_string(), "yt_dlp".to_string()];
                full.extend(args);
                (python.clone(), full)
            }
        }
    }
}

pub struct YtDlpFetcher {
    runners: Vec<Runner>,
}

impl YtDlpFetcher {
    /// Probe for the yt-dlp binary; `python` overrides the interpreter used
    /// for the module fallback.
    pub async fn detect(tools: &ToolManager, python: Option<String>) -> Self {
        Self::with_binary(tools.find(ToolType::YtDlp).await, python)
    }

    pub fn with_binary(binary: Option<String>, python: Option<String>) -> Self {
        let mut runners = Vec::new();
        if let Some(path) = binary {
            runners.push(Runner::Binary(path));
        }
        runners.push(Runner::Python(
            python.unwrap_or_else(|| "python3".to_string()),
        ));

        tracing::debug!(runners = ?runners, "yt-dlp fetcher configured");
        Self { runners }
    }

    /// Run yt-dlp with the first runner that can be started.
    async fn run(&self, args: Vec<String>, limit: Duration) -> Result<Vec<u8>, DownloadError> {
        let mut last_err = DownloadError::ToolNotFound("yt-dlp".to_string());

        for runner in &self.runners {
            let (program, full_args) = runner.command(args.clone());
            tracing::debug!(program = %program, "Running yt-dlp");

            let output = match run_output_with_timeout(&program, &full_args, limit).await {
                Ok(output) => output,
                Err(e @ DownloadError::ToolNotFound(_)) => {
                    tracing::debug!(program = %program, error = %e, "Runner unavailable, trying next");
                    last_err = e;
                    continue;
                }
                Err(e) => return Err(e),
            };

            if output.status.success() {
                return Ok(output.stdout);
            }

            let stderr = String::from_utf8_lossy(&output.stderr);
            // `python3 -m yt_dlp` without the module installed
            if matches!(runner, Runner::Python(_)) && stderr.contains("No module named yt_dlp") {
                last_err = DownloadError::ToolNotFound(format!("{}: yt_dlp module missing", program));
                continue;
            }
            return Err(DownloadError::from_stderr(&stderr));
        }

        Err(last_err)
    }

    fn common_args(options: &FetchOptions) -> Vec<String> {
        let mut args = vec![
            "--dump-json".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--no-progress".to_string(),
            "--socket-timeout".to_string(),
            SOCKET_TIMEOUT_SECS.to_string(),
        ];

        if let Some(cookies) = &options.cookies {
            args.push("--cookies".to_string());
            args.push(cookies.display().to_string());
        }
        args.extend(proxy_args(options.proxy.as_deref()));
        args
    }

    fn fetch_args(url: &str, options: &FetchOptions) -> Vec<String> {
        let mut args = Self::common_args(options);
        args.extend([
            "--no-simulate".to_string(),
            "-f".to_string(),
            options.format.clone(),
            "--merge-output-format".to_string(),
            "mp4".to_string(),
            "-o".to_string(),
            format!("{}.%(ext)s", options.output_stem.display()),
        ]);
        args.extend(options.extra_args.iter().cloned());
        args.push("--".to_string());
        args.push(url.to_string());
        args
    }

    fn probe_args(url: &str, options: &FetchOptions) -> Vec<String> {
        let mut args = Self::common_args(options);
        args.push("--skip-download".to_string());
        args.extend(options.extra_args.iter().cloned());
        args.push("--".to_string());
        args.push(url.to_string());
        args
    }

    async fn download(&self, url: &str, options: &FetchOptions) -> Result<FetchedVideo, DownloadError> {
        if let Some(dir) = options.output_stem.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                DownloadError::ExecutionError(format!("Cannot create {}: {}", dir.display(), e))
            })?;
        }

        let stdout = self.run(Self::fetch_args(url, options), options.timeout).await?;
        let metadata = parse_metadata(&stdout)?;

        // The JSON is printed before merging, so the reported name may carry
        // the pre-merge extension.
        let path = metadata
            .filepath()
            .filter(|p| p.is_file() && p.starts_with(stem_dir(&options.output_stem)))
            .or_else(|| find_output(&options.output_stem))
            .ok_or_else(|| DownloadError::FileMissing(url.to_string()))?;

        Ok(FetchedVideo { path, metadata })
    }
}

#[async_trait]
impl VideoFetcher for YtDlpFetcher {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn probe(&self, url: &str, options: &FetchOptions) -> Result<Metadata, DownloadError> {
        let stdout = self.run(Self::probe_args(url, options), options.timeout).await?;
        parse_metadata(&stdout)
    }

    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<FetchedVideo, DownloadError> {
        let result = self.download(url, options).await;
        if result.is_err() {
            let removed = cleanup_partial(&options.output_stem);
            if removed > 0 {
                tracing::debug!(removed, "Removed partial files after failed fetch");
            }
        }
        result
    }
}

fn stem_dir(stem: &Path) -> &Path {
    stem.parent().unwrap_or(stem)
}

/// yt-dlp prints one JSON object per line; the last one describes the video.
fn parse_metadata(stdout: &[u8]) -> Result<Metadata, DownloadError> {
    let text = String::from_utf8_lossy(stdout);
    let line = text
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| l.starts_with('{'))
        .ok_or_else(|| DownloadError::ParseError("yt-dlp printed no JSON".to_string()))?;

    Metadata::from_json_bytes(line.as_bytes())
        .map_err(|e| DownloadError::ParseError(format!("Invalid JSON: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn options() -> FetchOptions {
        FetchOptions {
            output_stem: PathBuf::from("/dl/youtube/1234"),
            format: "best".to_string(),
            cookies: Some(PathBuf::from("/cfg/cookies/youtube.txt")),
            proxy: None,
            timeout: Duration::from_secs(60),
            extra_args: vec!["--no-part".to_string()],
        }
    }

    #[test]
    fn test_fetch_args() {
        let args = YtDlpFetcher::fetch_args("https://youtu.be/x", &options());
        let joined = args.join(" ");
        assert!(joined.contains("-f best"));
        assert!(joined.contains("-o /dl/youtube/1234.%(ext)s"));
        assert!(joined.contains("--cookies /cfg/cookies/youtube.txt"));
        assert!(joined.contains("--no-part"));
        assert!(!joined.contains("--proxy"));
        assert_eq!(args.last().map(String::as_str), Some("https://youtu.be/x"));
    }

    #[test]
    fn test_probe_args_skip_download() {
        let args = YtDlpFetcher::probe_args("https://youtu.be/x", &options());
        assert!(args.contains(&"--skip-download".to_string()));
        assert!(!args.contains(&"--no-simulate".to_string()));
    }

    #[test]
    fn test_binary_runner_comes_first() {
        let fetcher = YtDlpFetcher::with_binary(Some("/usr/bin/yt-dlp".to_string()), None);
        assert_eq!(
            fetcher.runners,
            vec![
                Runner::Binary("/usr/bin/yt-dlp".to_string()),
                Runner::Python("python3".to_string()),
            ]
        );

        let fetcher = YtDlpFetcher::with_binary(None, Some("/venv/bin/python".to_string()));
        assert_eq!(fetcher.runners, vec![Runner::Python("/venv/bin/python".to_string())]);
    }

    #[test]
    fn test_python_runner_prefixes_module() {
        let (program, args) = Runner::Python("python3".into()).command(vec!["--version".into()]);
        assert_eq!(program, "python3");
        assert_eq!(args, vec!["-m", "yt_dlp", "--version"]);
    }

    #[test]
    fn test_parse_metadata_takes_last_json_line() {
        let stdout = b"[info] something\n{\"id\": \"a\"}\n{\"id\": \"b\", \"title\": \"B\"}\n";
        let m = parse_metadata(stdout).unwrap();
        assert_eq!(m.id(), Some("b"));

        assert!(matches!(
            parse_metadata(b"no json here"),
            Err(DownloadError::ParseError(_))
        ));
    }
}
