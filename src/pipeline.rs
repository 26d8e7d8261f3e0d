//! Batch orchestration: resolve -> download -> upload -> report
//!
//! Every input URL yields exactly one [`ItemReport`], in input order, no
//! matter how many items fail or in which order downloads complete.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::caption;
use crate::config::ConfigError;
use crate::downloader::models::{
    DownloadOutcome, DownloadRequest, DownloadResult, Metadata, PendingDownload,
};
use crate::downloader::DownloaderPool;
use crate::error::Error;
use crate::platform::{self, PlatformInfo};
use crate::upload::{UploadOutcome, UploadSequencer};

/// Batch lifecycle. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Downloading,
    Uploading,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Download,
    Upload,
}

#[derive(Debug)]
struct BatchState {
    state: JobState,
}

impl BatchState {
    fn new() -> Self {
        Self {
            state: JobState::Pending,
        }
    }

    fn advance(&mut self, next: JobState) {
        if next > self.state {
            tracing::debug!(from = ?self.state, to = ?next, "Batch state");
            self.state = next;
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    Downloaded { path: PathBuf },
    Uploaded { message_id: i64 },
    Failed { reason: Error },
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    pub url: String,
    pub platform_info: Option<PlatformInfo>,
    #[serde(flatten)]
    pub status: ItemStatus,
}

impl ItemReport {
    pub fn is_success(&self) -> bool {
        !matches!(self.status, ItemStatus::Failed { .. })
    }

    fn failed(url: String, platform_info: Option<PlatformInfo>, reason: Error) -> Self {
        Self {
            url,
            platform_info,
            status: ItemStatus::Failed { reason },
        }
    }
}

impl fmt::Display for ItemReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.is_success() { "✓" } else { "✗" };
        write!(f, "{} {}", mark, self.url)?;
        if let Some(info) = &self.platform_info {
            write!(f, " [{}]", info)?;
        }
        match &self.status {
            ItemStatus::Downloaded { path } => write!(f, " -> {}", path.display()),
            ItemStatus::Uploaded { message_id } => write!(f, " -> message {}", message_id),
            ItemStatus::Failed { reason } => write!(f, ": {}", reason),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub mode: Mode,
    pub state: JobState,
    pub items: Vec<ItemReport>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|i| i.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.succeeded()
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for item in &self.items {
            writeln!(f, "{}", item)?;
        }
        write!(
            f,
            "{} of {} succeeded, {} failed",
            self.succeeded(),
            self.items.len(),
            self.failed()
        )
    }
}

/// Result of `info`: classification plus raw metadata
#[derive(Debug, Clone, Serialize)]
pub struct InfoReport {
    pub url: String,
    pub platform_info: PlatformInfo,
    pub metadata: Metadata,
}

impl fmt::Display for InfoReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.metadata;
        let or_dash = |v: Option<&str>| v.unwrap_or("-").to_string();

        let rows = [
            ("Title", or_dash(m.title())),
            ("Author", or_dash(m.author())),
            (
                "Duration",
                m.duration().map_or("-".to_string(), |d| format!("{}s", d)),
            ),
            (
                "Views",
                m.view_count().map_or("-".to_string(), caption::format_count),
            ),
            ("Published", caption::publish_date(m).unwrap_or_else(|| "-".to_string())),
            (
                "Platform",
                format!(
                    "{} ({})",
                    self.platform_info.platform.display_name(),
                    self.platform_info.content_type
                ),
            ),
            ("Extractor", or_dash(m.extractor())),
            ("Video ID", or_dash(m.id())),
            ("URL", or_dash(m.source_url().or(Some(self.url.as_str())))),
        ];
        for (i, (key, value)) in rows.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{:<11} {}", format!("{}:", key), value)?;
        }

        let formats = m.formats();
        if !formats.is_empty() {
            write!(f, "\n\nAvailable formats: {}", formats.len())?;
            for format in &formats {
                write!(
                    f,
                    "\n  {:<12} {:<6} {:<12} {}",
                    format.format_id,
                    format.ext.as_deref().unwrap_or("-"),
                    format.resolution.as_deref().unwrap_or("-"),
                    format.format_note.as_deref().unwrap_or("")
                )?;
            }
        }
        Ok(())
    }
}

/// One slot per input URL: either rejected up front or queued for download
enum Slot {
    Rejected(ItemReport),
    Queued,
}

pub struct Pipeline {
    pool: DownloaderPool,
    sequencer: Option<UploadSequencer>,
}

impl Pipeline {
    pub fn new(pool: DownloaderPool) -> Self {
        Self {
            pool,
            sequencer: None,
        }
    }

    pub fn with_sequencer(mut self, sequencer: UploadSequencer) -> Self {
        self.sequencer = Some(sequencer);
        self
    }

    /// Resolve and download; stops after the download stage.
    pub async fn download(&self, urls: &[String], cancel: &CancellationToken) -> BatchReport {
        let mut batch = BatchState::new();
        let (slots, pending) = prepare(urls);

        batch.advance(JobState::Downloading);
        let results = self.pool.download_all(pending, cancel).await;

        let reports = results.into_iter().map(|r| {
            let status = match r.outcome {
                DownloadOutcome::Success { local_path, .. } => {
                    ItemStatus::Downloaded { path: local_path }
                }
                DownloadOutcome::Failure { reason } => ItemStatus::Failed { reason },
            };
            ItemReport {
                url: r.request.url,
                platform_info: Some(r.platform_info),
                status,
            }
        });

        batch.advance(JobState::Completed);
        finish(Mode::Download, batch.state, slots, reports)
    }

    /// Full pipeline. `parallel` overrides the download bound for this batch.
    pub async fn upload(
        &self,
        urls: &[String],
        parallel: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<BatchReport, Error> {
        let sequencer = self.sequencer.as_ref().ok_or_else(|| {
            Error::Configuration(ConfigError::Missing {
                key: "BOT_TOKEN".to_string(),
            })
        })?;

        let pool = match parallel {
            Some(n) => self.pool.clone().with_max_parallel(n),
            None => self.pool.clone(),
        };

        let mut batch = BatchState::new();
        let (slots, pending) = prepare(urls);

        batch.advance(JobState::Downloading);
        let downloads = pool.download_all(pending, cancel).await;

        batch.advance(JobState::Uploading);
        let uploads = sequencer.upload_all(downloads, cancel).await;

        let reports = uploads.into_iter().map(|u| {
            let DownloadResult {
                request,
                platform_info,
                outcome: download_outcome,
            } = u.download;

            let status = match (u.outcome, download_outcome) {
                (UploadOutcome::Success { message_id }, _) => ItemStatus::Uploaded { message_id },
                // Report why the download failed rather than the skip itself
                (
                    UploadOutcome::Failure {
                        reason: Error::DownloadSkipped,
                    },
                    DownloadOutcome::Failure { reason },
                ) => ItemStatus::Failed { reason },
                (UploadOutcome::Failure { reason }, _) => ItemStatus::Failed { reason },
            };

            ItemReport {
                url: request.url,
                platform_info: Some(platform_info),
                status,
            }
        });

        batch.advance(JobState::Completed);
        Ok(finish(Mode::Upload, batch.state, slots, reports))
    }

    /// Resolve and probe metadata. Never writes media or uploads.
    pub async fn info(&self, url: &str, cancel: &CancellationToken) -> Result<InfoReport, Error> {
        let platform_info = platform::resolve(url)?;
        let item = PendingDownload {
            request: DownloadRequest::new(url),
            platform_info,
        };

        let metadata = self.pool.probe(&item, cancel).await?;
        Ok(InfoReport {
            url: url.to_string(),
            platform_info,
            metadata,
        })
    }
}

/// Classify every URL; unsupported ones are reported without downloading.
fn prepare(urls: &[String]) -> (Vec<Slot>, Vec<PendingDownload>) {
    let mut slots = Vec::with_capacity(urls.len());
    let mut pending = Vec::new();

    for url in urls {
        match platform::resolve(url) {
            Ok(platform_info) => {
                pending.push(PendingDownload {
                    request: DownloadRequest::new(url.as_str()),
                    platform_info,
                });
                slots.push(Slot::Queued);
            }
            Err(reason) => {
                tracing::warn!(url = %url, "Unsupported URL, skipping");
                slots.push(Slot::Rejected(ItemReport::failed(url.clone(), None, reason)));
            }
        }
    }

    (slots, pending)
}

/// Merge rejected slots and processed items back into input order.
fn finish(
    mode: Mode,
    state: JobState,
    slots: Vec<Slot>,
    processed: impl Iterator<Item = ItemReport>,
) -> BatchReport {
    let mut processed = processed;
    let items: Vec<ItemReport> = slots
        .into_iter()
        .filter_map(|slot| match slot {
            Slot::Rejected(report) => Some(report),
            Slot::Queued => processed.next(),
        })
        .collect();

    let report = BatchReport { mode, state, items };
    tracing::info!(
        mode = ?report.mode,
        total = report.items.len(),
        succeeded = report.succeeded(),
        failed = report.failed(),
        "Batch completed"
    );
    report
}
