// Telegram Bot API uploader (`sendVideo`)
//
// Streams the file as multipart form data. Works against the cloud API and
// against a self-hosted Bot API server, which accepts larger files. Captions
// arrive as Telegram HTML from the caption builder.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio_util::io::ReaderStream;

use super::errors::UploadError;
use super::traits::Uploader;
use crate::entity::Destination;

/// Telegram caption limit, in characters
const MAX_CAPTION_CHARS: usize = 1024;
/// The General topic of a forum is addressed by omitting the thread id
const GENERAL_TOPIC_ID: i64 = 1;

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    result: Option<SentMessage>,
    error_code: Option<i64>,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

pub struct TelegramBotUploader {
    client: reqwest::Client,
    api_url: String,
    token: String,
    max_upload_bytes: u64,
}

impl TelegramBotUploader {
    pub fn new(
        api_url: impl Into<String>,
        token: impl Into<String>,
        max_upload_bytes: u64,
    ) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| UploadError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            max_upload_bytes,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendVideo", self.api_url, self.token)
    }

    async fn video_part(&self, path: &Path) -> Result<Part, UploadError> {
        let meta = tokio::fs::metadata(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => UploadError::FileNotFound(path.display().to_string()),
            _ => UploadError::Io(format!("{}: {}", path.display(), e)),
        })?;

        if meta.len() > self.max_upload_bytes {
            return Err(UploadError::FileTooLarge {
                size: meta.len(),
                limit: self.max_upload_bytes,
            });
        }

        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| UploadError::Io(format!("{}: {}", path.display(), e)))?;
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video.mp4".to_string());

        Part::stream_with_length(body, meta.len())
            .file_name(file_name)
            .mime_str("video/mp4")
            .map_err(|e| UploadError::Io(e.to_string()))
    }
}

#[async_trait]
impl Uploader for TelegramBotUploader {
    fn name(&self) -> &'static str {
        "telegram-bot-api"
    }

    async fn send(
        &self,
        path: &Path,
        destination: &Destination,
        caption: &str,
    ) -> Result<i64, UploadError> {
        let mut form = Form::new()
            .text("chat_id", destination.group_id.to_string())
            .text("caption", truncate_caption(caption))
            .text("parse_mode", "HTML")
            .text("supports_streaming", "true");
        if destination.topic_id != GENERAL_TOPIC_ID {
            form = form.text("message_thread_id", destination.topic_id.to_string());
        }
        form = form.part("video", self.video_part(path).await?);

        tracing::debug!(
            chat_id = destination.group_id,
            topic_id = destination.topic_id,
            path = %path.display(),
            "Sending video"
        );

        // Errors carry the request URL, which contains the bot token.
        let response = self
            .client
            .post(self.endpoint())
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::Network(e.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| UploadError::Network(e.without_url().to_string()))?;

        interpret_response(status.as_u16(), &body)
    }
}

fn interpret_response(status: u16, body: &str) -> Result<i64, UploadError> {
    let Ok(parsed) = serde_json::from_str::<ApiResponse>(body) else {
        let description = body.chars().take(200).collect::<String>();
        return Err(if status >= 500 {
            UploadError::Network(format!("HTTP {}: {}", status, description))
        } else {
            UploadError::Rejected {
                code: i64::from(status),
                description,
            }
        });
    };

    if parsed.ok {
        return parsed
            .result
            .map(|m| m.message_id)
            .ok_or_else(|| UploadError::Rejected {
                code: i64::from(status),
                description: "response has no message".to_string(),
            });
    }

    let code = parsed.error_code.unwrap_or(i64::from(status));
    let description = parsed.description.unwrap_or_default();

    match code {
        429 => Err(UploadError::RateLimited {
            retry_after: parsed.parameters.and_then(|p| p.retry_after).unwrap_or(1),
        }),
        c if c >= 500 => Err(UploadError::Network(format!("{}: {}", c, description))),
        _ => Err(UploadError::Rejected { code, description }),
    }
}

/// Splits Telegram HTML into tags, entities and single characters
fn html_units(mut rest: &str) -> impl Iterator<Item = &str> + '_ {
    std::iter::from_fn(move || {
        let c = rest.chars().next()?;
        let len = match c {
            '<' => rest.find('>').map_or(rest.len(), |e| e + 1),
            '&' => rest.find(';').map_or(1, |e| e + 1),
            _ => c.len_utf8(),
        };
        let (unit, tail) = rest.split_at(len);
        rest = tail;
        Some(unit)
    })
}

/// Cut to the visible-character limit without splitting a tag or an
/// entity. A link cut in the middle is closed after the ellipsis.
fn truncate_caption(caption: &str) -> String {
    let visible = html_units(caption).filter(|u| !u.starts_with('<')).count();
    if visible <= MAX_CAPTION_CHARS {
        return caption.to_string();
    }

    let mut out = String::with_capacity(caption.len());
    let mut kept = 0;
    let mut open_link = false;

    for unit in html_units(caption) {
        if unit.starts_with('<') {
            open_link = unit.starts_with("<a ");
        } else if kept == MAX_CAPTION_CHARS - 1 {
            break;
        } else {
            kept += 1;
        }
        out.push_str(unit);
    }

    out.push('…');
    if open_link {
        out.push_str("</a>");
    }
    out
}
