//! Command-line front end. Builds the pipeline from settings and prints
//! batch reports; all real work goes through [`Pipeline`].

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::{persist_parallel, Settings, SettingsView, MAX_PARALLEL_LIMIT, PARALLEL_KEY};
use crate::downloader::{DownloaderPool, ToolInfo, ToolManager, YtDlpFetcher};
use crate::entity::EntityMap;
use crate::pipeline::Pipeline;
use crate::platform::{load_overrides, PlatformRegistry};
use crate::retry::RetryConfig;
use crate::upload::{TelegramBotUploader, UploadSequencer};

#[derive(Debug, Parser)]
#[command(
    name = "social",
    version,
    about = "Download social platform videos and republish them to Telegram"
)]
pub struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Download videos to the local staging directory
    Download {
        /// URLs, comma-separated lists, or files with one URL per line
        #[arg(required = true)]
        urls: Vec<String>,
        /// Write files here instead of the per-platform staging directory
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// yt-dlp format selector for this run
        #[arg(short, long)]
        format: Option<String>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Download videos and upload them to the configured Telegram topics
    Upload {
        /// URLs, comma-separated lists, or files with one URL per line
        #[arg(required = true)]
        urls: Vec<String>,
        /// Parallel downloads for this run
        #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=MAX_PARALLEL_LIMIT as i64))]
        parallel: Option<u8>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show video metadata without downloading
    Info {
        url: String,
        /// Print raw metadata as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect or change configuration
    Config {
        #[command(subcommand)]
        sub: ConfigCommands,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show effective settings (secrets masked) and external tools
    Show {
        #[arg(long)]
        json: bool,
    },
    /// Persist MAX_PARALLEL_DOWNLOADS (1-10) into the config .env
    SetParallel {
        #[arg(value_parser = clap::value_parser!(u8).range(1..=MAX_PARALLEL_LIMIT as i64))]
        value: u8,
    },
}

/// Run one command. Per-item failures are part of the report, not errors.
pub async fn run(cli: Cli, cancel: CancellationToken) -> anyhow::Result<()> {
    let settings = Settings::from_env().context("Failed to load configuration")?;
    let mut out = std::io::stdout();

    match cli.command {
        Commands::Config { sub } => config_command(&settings, sub, &mut out).await,
        command => {
            let pipeline = build_pipeline(&settings, &command).await?;
            execute(command, &pipeline, &cancel, &mut out).await
        }
    }
}

/// Run a batch command on a ready pipeline and write its report to `out`.
pub async fn execute<W: Write>(
    command: Commands,
    pipeline: &Pipeline,
    cancel: &CancellationToken,
    out: &mut W,
) -> anyhow::Result<()> {
    match command {
        Commands::Download { urls, json, .. } => {
            let urls = parse_url_args(&urls)?;
            let report = pipeline.download(&urls, cancel).await;
            write_report(out, &report, json)
        }
        Commands::Upload {
            urls,
            parallel,
            json,
        } => {
            let urls = parse_url_args(&urls)?;
            let report = pipeline
                .upload(&urls, parallel.map(usize::from), cancel)
                .await?;
            write_report(out, &report, json)
        }
        Commands::Info { url, json } => {
            match pipeline.info(&url, cancel).await {
                Ok(info) if json => writeln!(out, "{}", serde_json::to_string_pretty(&info.metadata)?)?,
                Ok(info) => writeln!(out, "{}", info)?,
                Err(e) => eprintln!("✗ {}: {}", url, e),
            }
            Ok(())
        }
        Commands::Config { .. } => bail!("config commands do not run a pipeline"),
    }
}

async fn build_pipeline(settings: &Settings, command: &Commands) -> anyhow::Result<Pipeline> {
    match command {
        Commands::Upload { .. } => build_upload_pipeline(settings).await,
        Commands::Download { output, format, .. } => {
            let pool = build_pool(settings, build_registry(settings).await?)?
                .with_output_dir(output.clone())
                .with_format(format.clone());
            Ok(Pipeline::new(pool))
        }
        _ => Ok(Pipeline::new(build_pool(settings, build_registry(settings).await?)?)),
    }
}

async fn config_command<W: Write>(
    settings: &Settings,
    sub: ConfigCommands,
    out: &mut W,
) -> anyhow::Result<()> {
    match sub {
        ConfigCommands::Show { json } => show_config(settings, json, out).await,
        ConfigCommands::SetParallel { value } => {
            persist_parallel(&settings.env_file, usize::from(value))?;
            writeln!(
                out,
                "✓ MAX_PARALLEL_DOWNLOADS set to {} in {}",
                value,
                settings.env_file.display()
            )?;
            if let Some(current) = shadowing_parallel(usize::from(value)) {
                tracing::warn!(
                    persisted = value,
                    effective = %current,
                    "MAX_PARALLEL_DOWNLOADS is set in the process environment and overrides the config file"
                );
            }
            Ok(())
        }
    }
}

async fn build_registry(settings: &Settings) -> anyhow::Result<Arc<PlatformRegistry>> {
    let overrides = load_overrides(&settings.platforms_file)?;
    let tools = ToolManager::new().with_ytdlp_path(settings.ytdlp_path.clone());
    let fetcher = Arc::new(YtDlpFetcher::detect(&tools, settings.ytdlp_python.clone()).await);
    Ok(Arc::new(PlatformRegistry::uniform(settings, &overrides, fetcher)))
}

fn build_pool(settings: &Settings, registry: Arc<PlatformRegistry>) -> anyhow::Result<DownloaderPool> {
    std::fs::create_dir_all(&settings.downloads_dir).with_context(|| {
        format!(
            "Cannot create downloads directory {}",
            settings.downloads_dir.display()
        )
    })?;

    Ok(DownloaderPool::from_settings(registry, settings))
}

async fn build_upload_pipeline(settings: &Settings) -> anyhow::Result<Pipeline> {
    let credentials = settings.require_telegram()?;
    let entities = EntityMap::load(&settings.entities_file)?;
    if entities.is_empty() {
        tracing::warn!(path = %settings.entities_file.display(), "Entity map is empty");
    }

    let registry = build_registry(settings).await?;
    let captions = registry.caption_config();
    let pool = build_pool(settings, registry)?;

    let uploader = TelegramBotUploader::new(
        settings.bot_api_url.clone(),
        credentials.bot_token,
        settings.max_upload_bytes(),
    )?;
    let sequencer = UploadSequencer::new(Arc::new(uploader), Arc::new(entities), Arc::new(captions))
        .with_retry(RetryConfig::default().with_max_retries(settings.download_retries));

    Ok(Pipeline::new(pool).with_sequencer(sequencer))
}

fn write_report<W, T>(out: &mut W, report: &T, json: bool) -> anyhow::Result<()>
where
    W: Write,
    T: Serialize + std::fmt::Display,
{
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(report)?)?;
    } else {
        writeln!(out, "{}", report)?;
    }
    Ok(())
}

/// Process environment value of MAX_PARALLEL_DOWNLOADS when it differs from
/// what was just persisted. The process environment wins over `.env` files.
fn shadowing_parallel(persisted: usize) -> Option<String> {
    std::env::var(PARALLEL_KEY)
        .ok()
        .filter(|v| v.trim().parse::<usize>().ok() != Some(persisted))
}

#[derive(Serialize)]
struct ConfigReport {
    settings: SettingsView,
    tools: Vec<ToolInfo>,
}

async fn show_config<W: Write>(settings: &Settings, json: bool, out: &mut W) -> anyhow::Result<()> {
    let tools = ToolManager::new()
        .with_ytdlp_path(settings.ytdlp_path.clone())
        .detect_all()
        .await;
    let report = ConfigReport {
        settings: settings.view(),
        tools,
    };

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
        return Ok(());
    }

    for (key, value) in report.settings.rows() {
        writeln!(out, "{:<24} {}", key, value)?;
    }
    writeln!(out)?;
    for tool in &report.tools {
        let mark = if tool.is_available { "✓" } else { "✗" };
        writeln!(
            out,
            "{} {:<8} {} {}",
            mark,
            tool.name,
            tool.path.as_deref().unwrap_or("not found"),
            tool.version.as_deref().unwrap_or("")
        )?;
    }
    Ok(())
}

/// Expand URL arguments: plain URLs, comma-separated lists, or files with
/// one URL per line (`#` comments and blank lines skipped).
pub fn parse_url_args(args: &[String]) -> anyhow::Result<Vec<String>> {
    let mut urls = Vec::new();

    for arg in args {
        let path = Path::new(arg);
        if !arg.contains("://") && path.is_file() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Cannot read URL file {}", path.display()))?;
            urls.extend(
                content
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty() && !l.starts_with('#'))
                    .map(str::to_string),
            );
        } else {
            urls.extend(
                arg.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            );
        }
    }

    if urls.is_empty() {
        bail!("No URLs given");
    }
    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url_args_mixed() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("urls.txt");
        std::fs::write(
            &list,
            "# weekly batch\nhttps://vk.com/video-1_2\n\n  https://rutube.ru/video/abc/  \n",
        )
        .unwrap();

        let urls = parse_url_args(&[
            "https://youtube.com/watch?v=A, https://youtu.be/B".to_string(),
            list.display().to_string(),
        ])
        .unwrap();

        assert_eq!(
            urls,
            vec![
                "https://youtube.com/watch?v=A",
                "https://youtu.be/B",
                "https://vk.com/video-1_2",
                "https://rutube.ru/video/abc/",
            ]
        );
    }

    #[test]
    fn test_parse_url_args_empty() {
        assert!(parse_url_args(&[" , ".to_string()]).is_err());
    }

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from([
            "social",
            "upload",
            "https://youtube.com/watch?v=A",
            "https://bad-url",
            "--parallel",
            "2",
        ])
        .unwrap();
        match cli.command {
            Commands::Upload { urls, parallel, json } => {
                assert_eq!(urls.len(), 2);
                assert_eq!(parallel, Some(2));
                assert!(!json);
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(Cli::try_parse_from(["social", "upload", "x", "--parallel", "11"]).is_err());
        assert!(Cli::try_parse_from(["social", "config", "set-parallel", "0"]).is_err());
        assert!(Cli::try_parse_from(["social", "-v", "config", "show", "--json"]).is_ok());
    }
}
