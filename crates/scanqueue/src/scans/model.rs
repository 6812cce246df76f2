use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::QueueError;

pub const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Pending,
    Syncing,
    Synced,
    Failed,
}

impl ScanStatus {
    pub const ALL: [ScanStatus; 4] = [
        ScanStatus::Pending,
        ScanStatus::Syncing,
        ScanStatus::Synced,
        ScanStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Pending => "pending",
            ScanStatus::Syncing => "syncing",
            ScanStatus::Synced => "synced",
            ScanStatus::Failed => "failed",
        }
    }
}

impl FromStr for ScanStatus {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(ScanStatus::Pending),
            "syncing" => Ok(ScanStatus::Syncing),
            "synced" => Ok(ScanStatus::Synced),
            "failed" => Ok(ScanStatus::Failed),
            other => Err(QueueError::InvalidStatus(other.to_string())),
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A captured image in transportable form.
#[derive(Clone, PartialEq, Eq)]
pub struct ScanImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl ScanImage {
    pub fn from_bytes(bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            bytes,
            content_type: content_type.into(),
        }
    }

    /// Accepts either bare base64 or a `data:<mime>;base64,<payload>` URL.
    pub fn from_base64(input: &str) -> Result<Self, QueueError> {
        let input = input.trim();

        let (content_type, payload) = match input.strip_prefix("data:") {
            Some(rest) => {
                let (header, payload) = rest
                    .split_once(',')
                    .ok_or_else(|| QueueError::InvalidImage("data URL has no payload".into()))?;
                let mut parts = header.split(';');
                let mime = parts.next().unwrap_or_default().trim();
                if !parts.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
                    return Err(QueueError::InvalidImage(
                        "only base64 data URLs are supported".into(),
                    ));
                }
                let mime = if mime.is_empty() {
                    DEFAULT_CONTENT_TYPE
                } else {
                    mime
                };
                (mime.to_string(), payload)
            }
            None => (DEFAULT_CONTENT_TYPE.to_string(), input),
        };

        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|e| QueueError::InvalidImage(e.to_string()))?;
        if bytes.is_empty() {
            return Err(QueueError::InvalidImage("image is empty".into()));
        }

        Ok(Self {
            bytes,
            content_type,
        })
    }

    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.content_type,
            STANDARD.encode(&self.bytes)
        )
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

// Images can be megabytes; keep them out of logs.
impl fmt::Debug for ScanImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanImage")
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct QueuedScan {
    pub id: String,
    pub image: ScanImage,
    pub timestamp: DateTime<Utc>,
    pub status: ScanStatus,
    pub retries: i32,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Row shape of `scan_queue`; converted into `QueuedScan` with status validation.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ScanRow {
    pub id: String,
    pub image_data: Vec<u8>,
    pub content_type: String,
    pub timestamp_ms: i64,
    pub status: String,
    pub retries: i32,
    pub last_error: Option<String>,
    pub updated_at_ms: i64,
}

impl TryFrom<ScanRow> for QueuedScan {
    type Error = QueueError;

    fn try_from(row: ScanRow) -> Result<Self, Self::Error> {
        Ok(Self {
            status: row.status.parse()?,
            id: row.id,
            image: ScanImage {
                bytes: row.image_data,
                content_type: row.content_type,
            },
            timestamp: millis_to_utc(row.timestamp_ms),
            retries: row.retries,
            last_error: row.last_error,
            updated_at: millis_to_utc(row.updated_at_ms),
        })
    }
}

pub(crate) fn millis_to_utc(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub total: i64,
    pub pending: i64,
    pub syncing: i64,
    pub synced: i64,
    pub failed: i64,
}

impl StatusCounts {
    pub(crate) fn add(&mut self, status: ScanStatus, n: i64) {
        match status {
            ScanStatus::Pending => self.pending += n,
            ScanStatus::Syncing => self.syncing += n,
            ScanStatus::Synced => self.synced += n,
            ScanStatus::Failed => self.failed += n,
        }
        self.total += n;
    }
}
