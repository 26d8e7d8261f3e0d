// Sequential uploader: one upload in flight, in submission order

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::traits::Uploader;
use crate::caption::{self, CaptionConfig};
use crate::downloader::models::{DownloadOutcome, DownloadResult, Metadata};
use crate::entity::EntityMap;
use crate::error::Error;
use crate::platform::PlatformInfo;
use crate::retry::{with_retry, RetryConfig};

#[derive(Debug, Clone)]
pub enum UploadOutcome {
    Success { message_id: i64 },
    Failure { reason: Error },
}

/// Produced once per download result, in the same order
#[derive(Debug, Clone)]
pub struct UploadResult {
    pub download: DownloadResult,
    pub outcome: UploadOutcome,
}

pub struct UploadSequencer {
    uploader: Arc<dyn Uploader>,
    entities: Arc<EntityMap>,
    captions: Arc<CaptionConfig>,
    retry: RetryConfig,
}

impl UploadSequencer {
    pub fn new(
        uploader: Arc<dyn Uploader>,
        entities: Arc<EntityMap>,
        captions: Arc<CaptionConfig>,
    ) -> Self {
        Self {
            uploader,
            entities,
            captions,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Upload successful downloads one at a time.
    ///
    /// Failed downloads are recorded as skipped without touching the
    /// uploader. Once `cancel` fires no new upload starts.
    pub async fn upload_all(
        &self,
        results: Vec<DownloadResult>,
        cancel: &CancellationToken,
    ) -> Vec<UploadResult> {
        let mut uploads = Vec::with_capacity(results.len());

        for (index, download) in results.into_iter().enumerate() {
            let outcome = if cancel.is_cancelled() {
                UploadOutcome::Failure {
                    reason: Error::Cancelled,
                }
            } else {
                match self.upload_one(&download, cancel).await {
                    Ok(message_id) => UploadOutcome::Success { message_id },
                    Err(reason) => {
                        tracing::warn!(
                            index,
                            url = %download.request.url,
                            error = %reason,
                            "Upload not completed"
                        );
                        UploadOutcome::Failure { reason }
                    }
                }
            };

            uploads.push(UploadResult { download, outcome });
        }

        uploads
    }

    async fn upload_one(
        &self,
        download: &DownloadResult,
        cancel: &CancellationToken,
    ) -> Result<i64, Error> {
        let (path, metadata) = match &download.outcome {
            DownloadOutcome::Success {
                local_path,
                metadata,
            } => (local_path.as_path(), metadata),
            DownloadOutcome::Failure { .. } => return Err(Error::DownloadSkipped),
        };

        let destination = self.entities.resolve(&download.platform_info)?;
        let caption = self.caption_for(&download.platform_info, metadata)?;

        tracing::info!(
            url = %download.request.url,
            group_id = destination.group_id,
            topic_id = destination.topic_id,
            uploader = self.uploader.name(),
            "Upload started"
        );

        let uploader = &self.uploader;
        let destination_ref = &destination;
        let caption_ref = caption.as_str();
        let attempt = with_retry(&self.retry, move || {
            uploader.send(path, destination_ref, caption_ref)
        });

        let message_id = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = attempt => result?,
        };

        tracing::info!(url = %download.request.url, message_id, "Upload finished");
        Ok(message_id)
    }

    fn caption_for(&self, info: &PlatformInfo, metadata: &Metadata) -> Result<String, Error> {
        Ok(caption::build(info, metadata, &self.captions)?)
    }
}
