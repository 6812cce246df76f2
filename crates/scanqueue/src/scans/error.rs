use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    /// The local store could not be opened, read or written.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("scan not found: {0}")]
    NotFound(String),

    #[error("invalid scan status: {0}")]
    InvalidStatus(String),

    #[error("invalid image data: {0}")]
    InvalidImage(String),
}

impl QueueError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, QueueError::NotFound(_))
    }
}
