mod common;

use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use social_downloader::caption::CaptionConfig;
use social_downloader::downloader::{DownloadOutcome, DownloadRequest, DownloadResult, Metadata};
use social_downloader::entity::{Destination, EntityMap};
use social_downloader::platform::{self, ContentType, Platform};
use social_downloader::upload::{
    TelegramBotUploader, UploadError, UploadOutcome, UploadSequencer, Uploader,
};

fn video_file(dir: &tempfile::TempDir, size: usize) -> PathBuf {
    let path = dir.path().join("clip.mp4");
    std::fs::write(&path, vec![b'v'; size]).unwrap();
    path
}

fn ok_response(message_id: i64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "ok": true,
        "result": { "message_id": message_id, "chat": { "id": -1001 } }
    }))
}

#[tokio::test]
async fn test_send_video_to_topic() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/botTOKEN/sendVideo"))
        .and(body_string_contains("message_thread_id"))
        .and(body_string_contains("-1001"))
        .respond_with(ok_response(77))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = video_file(&dir, 64);
    let uploader = TelegramBotUploader::new(server.uri(), "TOKEN", 1024).unwrap();

    let message_id = uploader
        .send(
            &file,
            &Destination {
                group_id: -1001,
                topic_id: 5,
            },
            "<a href=\"https://youtu.be/x\">Title</a>",
        )
        .await
        .unwrap();

    assert_eq!(message_id, 77);
}

#[tokio::test]
async fn test_oversized_file_is_not_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ok_response(1))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = video_file(&dir, 2048);
    let uploader = TelegramBotUploader::new(server.uri(), "TOKEN", 1024).unwrap();

    let err = uploader
        .send(
            &file,
            &Destination {
                group_id: -1001,
                topic_id: 5,
            },
            "caption",
        )
        .await
        .unwrap_err();

    assert_eq!(
        err,
        UploadError::FileTooLarge {
            size: 2048,
            limit: 1024
        }
    );
}

#[tokio::test]
async fn test_rejected_request_keeps_token_out_of_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: message thread not found"
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = video_file(&dir, 16);
    let uploader = TelegramBotUploader::new(server.uri(), "SECRET", 1024).unwrap();

    let err = uploader
        .send(
            &file,
            &Destination {
                group_id: -1001,
                topic_id: 9,
            },
            "caption",
        )
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::Rejected { code: 400, .. }));
    assert!(!err.to_string().contains("SECRET"));
}

#[tokio::test]
async fn test_sequencer_retries_after_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/botTOKEN/sendVideo"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "ok": false,
            "error_code": 429,
            "description": "Too Many Requests: retry after 0",
            "parameters": { "retry_after": 0 }
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/botTOKEN/sendVideo"))
        .respond_with(ok_response(78))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = video_file(&dir, 32);
    let uploader = TelegramBotUploader::new(server.uri(), "TOKEN", 1024).unwrap();
    let entities = EntityMap::new().with(Platform::Rutube, -1003, &[(ContentType::Video, 30)]);
    let sequencer = UploadSequencer::new(
        Arc::new(uploader),
        Arc::new(entities),
        Arc::new(CaptionConfig::default()),
    )
    .with_retry(common::fast_retry());

    let url = "https://rutube.ru/video/abc/";
    let download = DownloadResult {
        request: DownloadRequest::new(url),
        platform_info: platform::resolve(url).unwrap(),
        outcome: DownloadOutcome::Success {
            local_path: file,
            metadata: Metadata::default(),
        },
    };

    let uploads = sequencer
        .upload_all(vec![download], &CancellationToken::new())
        .await;

    assert!(matches!(
        uploads[0].outcome,
        UploadOutcome::Success { message_id: 78 }
    ));
}

#[tokio::test]
async fn test_caption_is_sent_as_escaped_html() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/botTOKEN/sendVideo"))
        .and(body_string_contains("HTML"))
        .and(body_string_contains(
            "<a href=\"https://youtube.com/watch?v=A\">my_cool_clip *NEW &lt;3</a>",
        ))
        .and(body_string_contains("👤 dev_ops"))
        .respond_with(ok_response(79))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = video_file(&dir, 32);
    let uploader = TelegramBotUploader::new(server.uri(), "TOKEN", 1024).unwrap();
    let entities = EntityMap::new().with(Platform::YouTube, -1001, &[(ContentType::Video, 10)]);
    let sequencer = UploadSequencer::new(
        Arc::new(uploader),
        Arc::new(entities),
        Arc::new(CaptionConfig::default()),
    )
    .with_retry(common::fast_retry());

    let url = "https://youtube.com/watch?v=A";
    let metadata: Metadata = serde_json::from_value(json!({
        "title": "my_cool_clip *NEW <3",
        "webpage_url": url,
        "channel": "dev_ops"
    }))
    .unwrap();
    let download = DownloadResult {
        request: DownloadRequest::new(url),
        platform_info: platform::resolve(url).unwrap(),
        outcome: DownloadOutcome::Success {
            local_path: file,
            metadata,
        },
    };

    let uploads = sequencer
        .upload_all(vec![download], &CancellationToken::new())
        .await;

    assert!(matches!(
        uploads[0].outcome,
        UploadOutcome::Success { message_id: 79 }
    ));
}
