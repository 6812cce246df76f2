// crates/scanqueue/src/api/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scans::{QueuedScan, ScanStatus, StatusCounts};

/// A queued scan without its image bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSummary {
    pub id: String,
    pub status: ScanStatus,
    pub timestamp: DateTime<Utc>,
    pub retries: i32,
    pub last_error: Option<String>,
    pub content_type: String,
    pub image_bytes: usize,
    pub updated_at: DateTime<Utc>,
}

impl From<&QueuedScan> for ScanSummary {
    fn from(scan: &QueuedScan) -> Self {
        Self {
            id: scan.id.clone(),
            status: scan.status,
            timestamp: scan.timestamp,
            retries: scan.retries,
            last_error: scan.last_error.clone(),
            content_type: scan.image.content_type.clone(),
            image_bytes: scan.image.len(),
            updated_at: scan.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EnqueueScanRequest {
    /// Base64 or a `data:` URL.
    pub image_data: String,
    pub captured_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EnqueueScanResponse {
    pub id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CountResponse {
    #[serde(flatten)]
    pub counts: StatusCounts,
    pub online: bool,
}

#[derive(Debug, Deserialize)]
pub struct ListScansQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct PurgeQuery {
    pub older_than_secs: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PurgeResponse {
    pub purged: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RetryFailedResponse {
    pub requeued: u64,
}
