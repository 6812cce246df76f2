#![allow(dead_code)]

use async_trait::async_trait;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use scanqueue::scans::{
    EventBus, OfflineScanQueue, QueueEvent, QueuedScan, ScanImage, ScanRepo, UploadOutcome,
    Uploader,
};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

pub async fn setup_db() -> SqlitePool {
    // one connection: each in-memory connection is a separate database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("failed to open in-memory sqlite");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations failed");

    pool
}

pub fn image(tag: u8) -> ScanImage {
    ScanImage::from_bytes(vec![0xFF, 0xD8, 0xFF, tag], "image/jpeg")
}

pub fn queue_with(pool: &SqlitePool, uploader: Arc<dyn Uploader>) -> OfflineScanQueue {
    OfflineScanQueue::new(ScanRepo::new(pool.clone()), uploader, EventBus::new(64))
}

/// Records every upload and answers from a per-id script (default: delivered).
#[derive(Clone)]
pub struct RecordingUploader {
    calls: Arc<Mutex<Vec<String>>>,
    script: Arc<Mutex<HashMap<String, UploadOutcome>>>,
    fallback: UploadOutcome,
}

impl RecordingUploader {
    pub fn delivering() -> Self {
        Self::answering(UploadOutcome::Delivered)
    }

    pub fn answering(fallback: UploadOutcome) -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            script: Arc::new(Mutex::new(HashMap::new())),
            fallback,
        }
    }

    pub fn script(&self, id: &str, outcome: UploadOutcome) {
        self.script.lock().unwrap().insert(id.to_string(), outcome);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Uploader for RecordingUploader {
    async fn upload(&self, scan: &QueuedScan) -> UploadOutcome {
        self.calls.lock().unwrap().push(scan.id.clone());
        self.script
            .lock()
            .unwrap()
            .get(&scan.id)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

pub fn server_error() -> UploadOutcome {
    UploadOutcome::Rejected {
        status: 500,
        reason: "model unavailable".into(),
    }
}

/// Waits (bounded) for the first event matching `pred`, skipping others.
pub async fn wait_for<F>(rx: &mut broadcast::Receiver<QueueEvent>, mut pred: F) -> QueueEvent
where
    F: FnMut(&QueueEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let ev = rx.recv().await.expect("event bus closed");
            if pred(&ev) {
                return ev;
            }
        }
    })
    .await
    .expect("timed out waiting for queue event")
}

// ----------------------------
// Fake classification backend
// ----------------------------

#[derive(Debug, Clone)]
pub struct ReceivedPart {
    pub name: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

pub struct MockBackend {
    pub base_url: String,
    pub received: Arc<Mutex<Vec<ReceivedPart>>>,
}

impl MockBackend {
    pub fn predict_url(&self) -> String {
        format!("{}/api/v2/predict", self.base_url)
    }

    pub fn health_url(&self) -> String {
        format!("{}/health", self.base_url)
    }
}

type BackendState = (StatusCode, Arc<Mutex<Vec<ReceivedPart>>>);

async fn predict(
    State((status, received)): State<BackendState>,
    mut multipart: Multipart,
) -> (StatusCode, &'static str) {
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.unwrap().to_vec();
        received.lock().unwrap().push(ReceivedPart {
            name,
            file_name,
            content_type,
            bytes,
        });
    }

    if status.is_success() {
        (status, r#"{"disease":"healthy","confidence":0.97}"#)
    } else {
        (status, "model unavailable")
    }
}

/// Serves `POST /api/v2/predict` answering `status`, plus `GET /health`.
pub async fn spawn_backend(status: StatusCode) -> MockBackend {
    let received = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/api/v2/predict", post(predict))
        .route("/health", get(|| async { "ok" }))
        .with_state((status, received.clone()));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockBackend {
        base_url: format!("http://{addr}"),
        received,
    }
}

/// An address nothing listens on.
pub async fn dead_address() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}
