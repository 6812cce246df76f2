use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::time::Duration;

use crate::scans::model::QueuedScan;

const UPLOAD_FIELD: &str = "file";
const UPLOAD_FILE_NAME: &str = "scan.jpg";
const REASON_MAX_CHARS: usize = 200;

/// Result of one delivery attempt. The replay loop only branches on the tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Delivered,
    /// The collaborator answered, but not with 2xx.
    Rejected { status: u16, reason: String },
    /// Never got an answer: DNS, connect, TLS, timeout.
    TransportFailure(String),
}

impl UploadOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, UploadOutcome::Delivered)
    }

    pub fn reason(&self) -> Option<String> {
        match self {
            UploadOutcome::Delivered => None,
            UploadOutcome::Rejected { status, reason } if reason.is_empty() => {
                Some(format!("HTTP {status}"))
            }
            UploadOutcome::Rejected { status, reason } => Some(format!("HTTP {status}: {reason}")),
            UploadOutcome::TransportFailure(reason) => Some(reason.clone()),
        }
    }
}

#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, scan: &QueuedScan) -> UploadOutcome;
}

/// Posts the image as multipart form data to the classification endpoint.
#[derive(Clone)]
pub struct HttpUploader {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpUploader {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, endpoint))
    }

    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    fn image_part(scan: &QueuedScan) -> Part {
        match Part::bytes(scan.image.bytes.clone())
            .file_name(UPLOAD_FILE_NAME)
            .mime_str(&scan.image.content_type)
        {
            Ok(part) => part,
            Err(err) => {
                tracing::warn!(
                    scan_id = %scan.id,
                    content_type = %scan.image.content_type,
                    error = %err,
                    "unusable content type, uploading as octet-stream"
                );
                Part::bytes(scan.image.bytes.clone()).file_name(UPLOAD_FILE_NAME)
            }
        }
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn upload(&self, scan: &QueuedScan) -> UploadOutcome {
        let form = Form::new().part(UPLOAD_FIELD, Self::image_part(scan));

        let resp = match self.client.post(&self.endpoint).multipart(form).send().await {
            Ok(resp) => resp,
            Err(err) => return UploadOutcome::TransportFailure(err.to_string()),
        };

        let status = resp.status();
        if status.is_success() {
            return UploadOutcome::Delivered;
        }

        let body = resp.text().await.unwrap_or_default();
        UploadOutcome::Rejected {
            status: status.as_u16(),
            reason: body.trim().chars().take(REASON_MAX_CHARS).collect(),
        }
    }
}
