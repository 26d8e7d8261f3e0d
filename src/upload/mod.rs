// Upload module - Telegram publishing

pub mod errors;
pub mod sequencer;
pub mod telegram;
pub mod traits;

pub use errors::UploadError;
pub use sequencer::{UploadOutcome, UploadResult, UploadSequencer};
pub use telegram::TelegramBotUploader;
pub use traits::Uploader;
