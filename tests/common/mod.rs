//! Test doubles shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use rand::Rng;
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use social_downloader::config::Settings;
use social_downloader::downloader::{
    DownloadError, DownloaderPool, FetchOptions, FetchedVideo, Metadata, VideoFetcher,
};
use social_downloader::entity::Destination;
use social_downloader::platform::PlatformRegistry;
use social_downloader::retry::RetryConfig;
use social_downloader::upload::{UploadError, Uploader};

/// Retries without real waiting
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_retries: 2,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff_multiplier: 2.0,
        jitter: false,
    }
}

pub fn settings(root: &Path) -> Settings {
    let config_dir = root.join("config");
    let downloads_dir = root.join("downloads");
    Settings::from_lookup(move |key| match key {
        "CONFIG_DIR" => Some(config_dir.display().to_string()),
        "DOWNLOADS_DIR" => Some(downloads_dir.display().to_string()),
        _ => None,
    })
    .expect("test settings")
}

pub fn pool(root: &Path, fetcher: Arc<FakeFetcher>, max_parallel: usize) -> DownloaderPool {
    let settings = settings(root);
    let registry = PlatformRegistry::uniform(&settings, &HashMap::new(), fetcher);
    DownloaderPool::new(Arc::new(registry), max_parallel).with_retry(fast_retry())
}

/// Fetcher that writes a small file after a random delay and records
/// the peak number of concurrent fetches.
///
/// URLs containing `fail` fail permanently, URLs containing `flaky` fail
/// once with a transient error.
#[derive(Default)]
pub struct FakeFetcher {
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub calls: AtomicUsize,
    attempts: Mutex<HashMap<String, usize>>,
    max_delay_ms: u64,
    hang: bool,
}

impl FakeFetcher {
    pub fn new(max_delay_ms: u64) -> Self {
        Self {
            max_delay_ms,
            ..Self::default()
        }
    }

    /// Every fetch blocks until cancelled
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    pub fn peak(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn metadata(url: &str) -> Metadata {
        serde_json::from_value(json!({
            "id": url.rsplit('=').next().unwrap_or("x"),
            "title": format!("Video {}", url),
            "webpage_url": url,
            "uploader": "Tester",
            "view_count": 16354,
            "timestamp": 1_704_445_500
        }))
        .expect("metadata")
    }

    async fn simulate(&self, url: &str, options: &FetchOptions) -> Result<FetchedVideo, DownloadError> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let n = attempts.entry(url.to_string()).or_insert(0);
            *n += 1;
            *n
        };

        if self.hang {
            std::future::pending::<()>().await;
        }

        let delay = if self.max_delay_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(1..=self.max_delay_ms)
        };
        tokio::time::sleep(Duration::from_millis(delay)).await;

        if url.contains("fail") {
            return Err(DownloadError::Unavailable("Private video".into()));
        }
        if url.contains("flaky") && attempt == 1 {
            return Err(DownloadError::Network("connection reset".into()));
        }

        if let Some(dir) = options.output_stem.parent() {
            tokio::fs::create_dir_all(dir).await.unwrap();
        }
        let path = PathBuf::from(format!("{}.mp4", options.output_stem.display()));
        tokio::fs::write(&path, b"fake video").await.unwrap();

        Ok(FetchedVideo {
            path,
            metadata: Self::metadata(url),
        })
    }
}

#[async_trait]
impl VideoFetcher for FakeFetcher {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn probe(&self, url: &str, _options: &FetchOptions) -> Result<Metadata, DownloadError> {
        Ok(Self::metadata(url))
    }

    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<FetchedVideo, DownloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        struct Guard<'a>(&'a AtomicUsize);
        impl Drop for Guard<'_> {
            fn drop(&mut self) {
                self.0.fetch_sub(1, Ordering::SeqCst);
            }
        }
        let _guard = Guard(&self.in_flight);

        self.simulate(url, options).await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentVideo {
    pub path: PathBuf,
    pub destination: Destination,
    pub caption: String,
}

/// Uploader that records calls and detects overlapping uploads
#[derive(Default)]
pub struct FakeUploader {
    busy: AtomicBool,
    pub overlapped: AtomicBool,
    pub sent: Mutex<Vec<SentVideo>>,
    next_id: AtomicI64,
}

impl FakeUploader {
    pub fn sent(&self) -> Vec<SentVideo> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Uploader for FakeUploader {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn send(
        &self,
        path: &Path,
        destination: &Destination,
        caption: &str,
    ) -> Result<i64, UploadError> {
        if self.busy.swap(true, Ordering::SeqCst) {
            self.overlapped.store(true, Ordering::SeqCst);
        }

        let delay = rand::thread_rng().gen_range(1..=5);
        tokio::time::sleep(Duration::from_millis(delay)).await;

        self.sent.lock().unwrap().push(SentVideo {
            path: path.to_path_buf(),
            destination: *destination,
            caption: caption.to_string(),
        });

        self.busy.store(false, Ordering::SeqCst);
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst) + 100)
    }
}
