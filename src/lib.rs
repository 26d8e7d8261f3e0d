//! Download videos from social platforms (YouTube, VK, TikTok, Rutube) with
//! yt-dlp and republish them to Telegram forum topics.
//!
//! The [`pipeline::Pipeline`] ties together URL resolution, a bounded
//! download pool and a strictly sequential uploader.

pub mod caption;
pub mod cli;
pub mod config;
pub mod downloader;
pub mod entity;
pub mod error;
pub mod pipeline;
pub mod platform;
pub mod retry;
pub mod upload;

pub use error::{Error, Result};
pub use pipeline::{BatchReport, ItemReport, ItemStatus, JobState, Pipeline};
