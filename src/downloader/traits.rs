// Fetcher trait definition

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

use super::errors::DownloadError;
use super::models::{FetchedVideo, Metadata};
use crate::platform::PlatformProfile;

/// Per-call options derived from the platform profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    /// Output path without extension; the extractor picks the extension
    pub output_stem: PathBuf,
    pub format: String,
    pub cookies: Option<PathBuf>,
    pub proxy: Option<String>,
    /// Per-attempt limit for the whole extractor run
    pub timeout: Duration,
    pub extra_args: Vec<String>,
}

impl FetchOptions {
    pub fn from_profile(
        profile: &PlatformProfile,
        output_stem: PathBuf,
        proxy: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            output_stem,
            format: profile.format.clone(),
            cookies: profile.cookies_if_present().map(PathBuf::from),
            proxy,
            timeout,
            extra_args: profile.extra_args.clone(),
        }
    }
}

/// Capability of one platform backend
#[async_trait]
pub trait VideoFetcher: Send + Sync {
    /// Name of the fetcher (for logging)
    fn name(&self) -> &'static str;

    /// Read metadata without downloading media
    async fn probe(&self, url: &str, options: &FetchOptions) -> Result<Metadata, DownloadError>;

    /// Download media to `options.output_stem.<ext>`
    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<FetchedVideo, DownloadError>;
}
