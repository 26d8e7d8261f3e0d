// Bounded-concurrency download pool
//
// Every pending download gets its own task. A semaphore permit is taken at
// admission, before the task touches its fetcher, so no more than
// `max_parallel` fetches ever run at once. Results come back in input order.

use futures::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::errors::DownloadError;
use super::models::{DownloadOutcome, DownloadResult, Metadata, PendingDownload};
use super::traits::FetchOptions;
use super::utils::cleanup_partial;
use crate::config::{clamp_parallel, Settings};
use crate::error::Error;
use crate::platform::{PlatformEntry, PlatformRegistry};
use crate::retry::{with_retry, RetryConfig};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1800);

#[derive(Debug, Clone)]
pub struct DownloaderPool {
    registry: Arc<PlatformRegistry>,
    max_parallel: usize,
    retry: RetryConfig,
    timeout: Duration,
    proxy: Option<String>,
    /// Replaces the per-platform staging dir (`download --output`)
    output_dir: Option<PathBuf>,
    /// Replaces the per-platform format selector (`download --format`)
    format: Option<String>,
}

impl DownloaderPool {
    pub fn new(registry: Arc<PlatformRegistry>, max_parallel: usize) -> Self {
        Self {
            registry,
            max_parallel: clamp_parallel(max_parallel as i64),
            retry: RetryConfig::default(),
            timeout: DEFAULT_TIMEOUT,
            proxy: None,
            output_dir: None,
            format: None,
        }
    }

    /// Pool configured from settings: concurrency, retries, timeout, proxy
    pub fn from_settings(registry: Arc<PlatformRegistry>, settings: &Settings) -> Self {
        Self::new(registry, settings.max_parallel)
            .with_retry(RetryConfig::default().with_max_retries(settings.download_retries))
            .with_timeout(settings.download_timeout)
            .with_proxy(settings.proxy.clone())
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = clamp_parallel(max_parallel as i64);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_output_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.output_dir = dir;
        self
    }

    pub fn with_format(mut self, format: Option<String>) -> Self {
        self.format = format;
        self
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Download every pending item, at most `max_parallel` at a time.
    ///
    /// Returns exactly one result per input, in input order. Failures never
    /// abort siblings. After `cancel` fires, queued items resolve to
    /// `Cancelled` and in-flight fetches are killed and cleaned up.
    pub async fn download_all(
        &self,
        pending: Vec<PendingDownload>,
        cancel: &CancellationToken,
    ) -> Vec<DownloadResult> {
        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        tracing::info!(
            count = pending.len(),
            max_parallel = self.max_parallel,
            "Starting downloads"
        );

        let mut fallbacks = Vec::with_capacity(pending.len());
        let mut handles = Vec::with_capacity(pending.len());

        for item in pending {
            fallbacks.push(item.clone());

            let pool = self.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();

            handles.push(tokio::spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };
                let Some(_permit) = permit else {
                    return failure(item, Error::Cancelled);
                };
                if cancel.is_cancelled() {
                    return failure(item, Error::Cancelled);
                }
                pool.download_one(item, &cancel).await
            }));
        }

        join_all(handles)
            .await
            .into_iter()
            .zip(fallbacks)
            .map(|(joined, item)| {
                joined.unwrap_or_else(|e| {
                    tracing::error!(url = %item.request.url, error = %e, "Download task panicked");
                    failure(
                        item,
                        Error::Download(DownloadError::Unknown(format!(
                            "download task failed: {}",
                            e
                        ))),
                    )
                })
            })
            .collect()
    }

    async fn download_one(&self, item: PendingDownload, cancel: &CancellationToken) -> DownloadResult {
        let Some(entry) = self.registry.get(item.platform_info.platform) else {
            let platform = item.platform_info.platform;
            return failure(
                item,
                Error::Download(DownloadError::ExecutionError(format!(
                    "no fetcher registered for {}",
                    platform
                ))),
            );
        };

        let options = self.options_for(entry, &item);
        let stem = options.output_stem.clone();
        let url = item.request.url.as_str();
        let fetcher = &entry.fetcher;
        let options_ref = &options;

        tracing::info!(
            request_id = %item.request.id,
            url,
            platform = %item.platform_info,
            fetcher = fetcher.name(),
            "Download started"
        );

        let attempt = with_retry(&self.retry, move || fetcher.fetch(url, options_ref));

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let removed = cleanup_partial(&stem);
                tracing::warn!(request_id = %item.request.id, url, removed, "Download cancelled");
                DownloadOutcome::Failure { reason: Error::Cancelled }
            }
            result = attempt => match result {
                Ok(video) => {
                    tracing::info!(
                        request_id = %item.request.id,
                        url,
                        path = %video.path.display(),
                        "Download finished"
                    );
                    DownloadOutcome::Success {
                        local_path: video.path,
                        metadata: video.metadata,
                    }
                }
                Err(e) => {
                    tracing::warn!(request_id = %item.request.id, url, error = %e, "Download failed");
                    DownloadOutcome::Failure { reason: e.into() }
                }
            },
        };

        DownloadResult {
            request: item.request,
            platform_info: item.platform_info,
            outcome,
        }
    }

    /// Fetch metadata only, with the same retry policy as downloads.
    pub async fn probe(
        &self,
        item: &PendingDownload,
        cancel: &CancellationToken,
    ) -> Result<Metadata, Error> {
        let entry = self.registry.get(item.platform_info.platform).ok_or_else(|| {
            Error::Download(DownloadError::ExecutionError(format!(
                "no fetcher registered for {}",
                item.platform_info.platform
            )))
        })?;

        let options = self.options_for(entry, item);
        let url = item.request.url.as_str();
        let fetcher = &entry.fetcher;
        let options_ref = &options;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = with_retry(&self.retry, move || fetcher.probe(url, options_ref)) => {
                result.map_err(Error::from)
            }
        }
    }

    fn options_for(&self, entry: &PlatformEntry, item: &PendingDownload) -> FetchOptions {
        let dir = self
            .output_dir
            .clone()
            .unwrap_or_else(|| entry.profile.download_dir.clone());
        let stem = dir.join(item.request.id.to_string());

        let mut options =
            FetchOptions::from_profile(&entry.profile, stem, self.proxy.clone(), self.timeout);
        if let Some(format) = &self.format {
            options.format = format.clone();
        }
        options
    }
}

fn failure(item: PendingDownload, reason: Error) -> DownloadResult {
    DownloadResult {
        request: item.request,
        platform_info: item.platform_info,
        outcome: DownloadOutcome::Failure { reason },
    }
}
