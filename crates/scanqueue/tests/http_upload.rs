mod common;

use axum::http::StatusCode;
use chrono::Utc;
use common::{dead_address, spawn_backend};
use scanqueue::scans::connectivity::probe_once;
use scanqueue::scans::{HttpUploader, QueuedScan, ScanImage, ScanStatus, UploadOutcome, Uploader};
use std::time::Duration;

fn scan(image: ScanImage) -> QueuedScan {
    QueuedScan {
        id: "scan_1700000000000_abcdefghi".into(),
        image,
        timestamp: Utc::now(),
        status: ScanStatus::Syncing,
        retries: 1,
        last_error: None,
        updated_at: Utc::now(),
    }
}

#[tokio::test]
async fn delivered_on_success_with_image_as_multipart_file() {
    let backend = spawn_backend(StatusCode::OK).await;
    let uploader = HttpUploader::new(backend.predict_url(), Duration::from_secs(5)).unwrap();
    let image = ScanImage::from_bytes(vec![0x89, b'P', b'N', b'G', 1, 2, 3], "image/png");

    let outcome = uploader.upload(&scan(image.clone())).await;
    assert_eq!(outcome, UploadOutcome::Delivered);

    let received = backend.received.lock().unwrap().clone();
    assert_eq!(received.len(), 1);
    let part = &received[0];
    assert_eq!(part.name, "file");
    assert_eq!(part.file_name.as_deref(), Some("scan.jpg"));
    assert_eq!(part.content_type.as_deref(), Some("image/png"));
    assert_eq!(part.bytes, image.bytes);
}

#[tokio::test]
async fn server_error_is_rejected_with_status_and_body() {
    let backend = spawn_backend(StatusCode::INTERNAL_SERVER_ERROR).await;
    let uploader = HttpUploader::new(backend.predict_url(), Duration::from_secs(5)).unwrap();

    let outcome = uploader
        .upload(&scan(ScanImage::from_bytes(vec![1, 2, 3], "image/jpeg")))
        .await;

    assert_eq!(
        outcome,
        UploadOutcome::Rejected {
            status: 500,
            reason: "model unavailable".into(),
        }
    );
    assert!(!outcome.is_delivered());
}

#[tokio::test]
async fn unreachable_backend_is_a_transport_failure() {
    let base = dead_address().await;
    let uploader =
        HttpUploader::new(format!("{base}/api/v2/predict"), Duration::from_secs(2)).unwrap();

    let outcome = uploader
        .upload(&scan(ScanImage::from_bytes(vec![1], "image/jpeg")))
        .await;

    assert!(
        matches!(outcome, UploadOutcome::TransportFailure(_)),
        "got {outcome:?}"
    );
}

#[tokio::test]
async fn bad_content_type_still_uploads() {
    let backend = spawn_backend(StatusCode::OK).await;
    let uploader = HttpUploader::new(backend.predict_url(), Duration::from_secs(5)).unwrap();

    let outcome = uploader
        .upload(&scan(ScanImage::from_bytes(vec![1, 2], "not a mime type")))
        .await;

    assert_eq!(outcome, UploadOutcome::Delivered);
    assert_eq!(backend.received.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn probe_reports_backend_health() {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .unwrap();

    let backend = spawn_backend(StatusCode::OK).await;
    assert!(probe_once(&client, &backend.health_url()).await);

    let base = dead_address().await;
    assert!(!probe_once(&client, &format!("{base}/health")).await);
}
