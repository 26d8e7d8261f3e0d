// Uploader trait definition

use async_trait::async_trait;
use std::path::Path;

use super::errors::UploadError;
use crate::entity::Destination;

/// Publishes one media file with a caption
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Name of the uploader (for logging)
    fn name(&self) -> &'static str;

    /// Send the file and return the id of the posted message
    async fn send(
        &self,
        path: &Path,
        destination: &Destination,
        caption: &str,
    ) -> Result<i64, UploadError>;
}
