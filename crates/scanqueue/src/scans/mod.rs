pub mod connectivity;
pub mod error;
pub mod events;
pub mod ids;
pub mod maintenance;
pub mod model;
pub mod queue;
pub mod repo;
pub mod retry;
pub mod upload;

pub use connectivity::{Connectivity, LinkState};
pub use error::QueueError;
pub use events::{EventBus, QueueEvent};
pub use model::{QueuedScan, ScanImage, ScanStatus, StatusCounts};
pub use queue::{OfflineScanQueue, QueueWorker, ReplayReport, WorkerOptions};
pub use repo::ScanRepo;
pub use retry::RetryPolicy;
pub use upload::{HttpUploader, UploadOutcome, Uploader};
