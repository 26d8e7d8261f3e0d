// Downloader module - fetchers, pool and supporting utilities

pub mod backends;
pub mod errors;
pub mod models;
pub mod pool;
pub mod tools;
pub mod traits;
pub mod utils;

pub use backends::YtDlpFetcher;
pub use errors::DownloadError;
pub use models::{
    DownloadOutcome, DownloadRequest, DownloadResult, FetchedVideo, FormatInfo, Metadata,
    PendingDownload,
};
pub use pool::DownloaderPool;
pub use tools::{ToolInfo, ToolManager, ToolType};
pub use traits::{FetchOptions, VideoFetcher};
