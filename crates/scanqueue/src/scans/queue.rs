use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use crate::scans::connectivity::LinkState;
use crate::scans::error::QueueError;
use crate::scans::events::{EventBus, QueueEvent};
use crate::scans::ids::new_scan_id;
use crate::scans::maintenance::cutoff_ago;
use crate::scans::model::{QueuedScan, ScanImage, ScanStatus, StatusCounts};
use crate::scans::repo::ScanRepo;
use crate::scans::retry::{classify_outcome, RetryPolicy};
use crate::scans::upload::{UploadOutcome, Uploader};

/// Tally of one replay pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub pass_id: Uuid,
    /// Size of the pending snapshot taken at the start of the pass.
    pub attempted: usize,
    pub synced: usize,
    pub failed: usize,
    /// Failed uploads the retry policy sent back to `pending`.
    pub requeued: usize,
    /// Snapshot entries deleted or changed by someone else mid-pass.
    pub skipped: usize,
    /// Entries whose state could not be written back.
    pub errors: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerOptions {
    /// How long synced scans are kept before housekeeping deletes them.
    pub synced_retention: Duration,
    pub maintenance_interval: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            synced_retention: Duration::from_secs(24 * 60 * 60),
            maintenance_interval: Duration::from_secs(60 * 60),
        }
    }
}

/// Durable queue of scans captured without connectivity.
///
/// Every write goes through one async lock so two status updates for the same
/// scan can never interleave. Reads (`count`, `list_pending`, ...) take no lock.
/// Replay passes are serialized by a second lock and upload strictly one scan
/// at a time.
#[derive(Clone)]
pub struct OfflineScanQueue {
    repo: ScanRepo,
    uploader: Arc<dyn Uploader>,
    events: EventBus,
    retry: RetryPolicy,
    write_lock: Arc<Mutex<()>>,
    replay_lock: Arc<Mutex<()>>,
}

impl OfflineScanQueue {
    pub fn new(repo: ScanRepo, uploader: Arc<dyn Uploader>, events: EventBus) -> Self {
        Self {
            repo,
            uploader,
            events,
            retry: RetryPolicy::default(),
            write_lock: Arc::new(Mutex::new(())),
            replay_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    // ----------------------------
    // Enqueue
    // ----------------------------

    pub async fn enqueue(&self, image: ScanImage) -> Result<String, QueueError> {
        self.enqueue_captured_at(image, Utc::now()).await
    }

    pub async fn enqueue_captured_at(
        &self,
        image: ScanImage,
        captured_at: DateTime<Utc>,
    ) -> Result<String, QueueError> {
        let scan = QueuedScan {
            id: new_scan_id(),
            image,
            timestamp: captured_at,
            status: ScanStatus::Pending,
            retries: 0,
            last_error: None,
            updated_at: Utc::now(),
        };

        {
            let _write = self.write_lock.lock().await;
            self.repo.insert(&scan).await?;
        }

        tracing::debug!(scan_id = %scan.id, bytes = scan.image.len(), "scan queued");
        self.events.publish(QueueEvent::ScanQueued {
            id: scan.id.clone(),
        });

        Ok(scan.id)
    }

    // ----------------------------
    // Reads
    // ----------------------------

    pub async fn get(&self, id: &str) -> Result<Option<QueuedScan>, QueueError> {
        self.repo.get(id).await
    }

    /// Pending scans, oldest capture first.
    pub async fn list_pending(&self) -> Result<Vec<QueuedScan>, QueueError> {
        self.repo.list_by_status(ScanStatus::Pending).await
    }

    pub async fn list(
        &self,
        status: Option<ScanStatus>,
        limit: i64,
    ) -> Result<Vec<QueuedScan>, QueueError> {
        self.repo.list(status, limit).await
    }

    pub async fn count(&self) -> Result<i64, QueueError> {
        self.repo.count().await
    }

    pub async fn status_counts(&self) -> Result<StatusCounts, QueueError> {
        self.repo.status_counts().await
    }

    // ----------------------------
    // Writes
    // ----------------------------

    /// Any of the four statuses is accepted as a target; odd transitions such
    /// as synced -> pending are allowed.
    pub async fn mark_status(&self, id: &str, status: ScanStatus) -> Result<(), QueueError> {
        let _write = self.write_lock.lock().await;
        self.repo.set_status(id, status).await
    }

    /// Removing an unknown id fails with `NotFound`.
    pub async fn remove(&self, id: &str) -> Result<(), QueueError> {
        let _write = self.write_lock.lock().await;
        self.repo.delete(id).await
    }

    pub async fn purge_synced(&self, older_than: Duration) -> Result<u64, QueueError> {
        let cutoff = cutoff_ago(older_than);
        let _write = self.write_lock.lock().await;
        self.repo.purge_synced_before(cutoff).await
    }

    /// A `syncing` row at startup belongs to a process that died mid-upload.
    pub async fn recover_interrupted(&self) -> Result<u64, QueueError> {
        let _write = self.write_lock.lock().await;
        let ids = self
            .repo
            .move_all(ScanStatus::Syncing, ScanStatus::Pending)
            .await?;
        Ok(ids.len() as u64)
    }

    /// Manual reset of one scan back to `pending`.
    pub async fn retry(&self, id: &str) -> Result<(), QueueError> {
        self.mark_status(id, ScanStatus::Pending).await?;
        self.events.publish(QueueEvent::ScanRequeued { id: id.to_string() });
        Ok(())
    }

    pub async fn retry_failed(&self) -> Result<u64, QueueError> {
        let ids = {
            let _write = self.write_lock.lock().await;
            self.repo
                .move_all(ScanStatus::Failed, ScanStatus::Pending)
                .await?
        };

        let n = ids.len() as u64;
        for id in ids {
            self.events.publish(QueueEvent::ScanRequeued { id });
        }
        Ok(n)
    }

    // ----------------------------
    // Replay
    // ----------------------------

    /// One pass over the scans that are pending right now. Scans enqueued while
    /// the pass runs wait for the next one. A failed upload never stops the
    /// pass; only failing to take the snapshot does.
    pub async fn replay_pending(&self) -> Result<ReplayReport, QueueError> {
        let _pass = self.replay_lock.lock().await;

        let pass_id = Uuid::new_v4();
        let span = tracing::info_span!("replay", %pass_id);
        self.replay_snapshot(pass_id).instrument(span).await
    }

    async fn replay_snapshot(&self, pass_id: Uuid) -> Result<ReplayReport, QueueError> {
        let snapshot = self.list_pending().await?;

        let mut report = ReplayReport {
            pass_id,
            attempted: snapshot.len(),
            ..Default::default()
        };

        if snapshot.is_empty() {
            tracing::debug!("nothing pending");
            return Ok(report);
        }

        tracing::info!(pending = snapshot.len(), "replaying offline scans");

        for scan in &snapshot {
            if let Err(err) = self.sync_one(scan, &mut report).await {
                report.errors += 1;
                tracing::error!(scan_id = %scan.id, error = %err, "could not record sync state");
            }
        }

        tracing::info!(
            synced = report.synced,
            failed = report.failed,
            requeued = report.requeued,
            skipped = report.skipped,
            errors = report.errors,
            "replay pass finished"
        );
        self.events.publish(QueueEvent::ReplayFinished {
            synced: report.synced,
            failed: report.failed,
        });

        Ok(report)
    }

    async fn sync_one(&self, scan: &QueuedScan, report: &mut ReplayReport) -> Result<(), QueueError> {
        let attempts = {
            let _write = self.write_lock.lock().await;
            self.repo.begin_attempt(&scan.id).await?
        };
        let Some(attempts) = attempts else {
            report.skipped += 1;
            tracing::debug!(scan_id = %scan.id, "no longer pending, skipping");
            return Ok(());
        };

        let outcome = self.uploader.upload(scan).await;

        if let Err(err) = self.settle(scan, &outcome, attempts, report).await {
            self.release_attempt(&scan.id).await;
            return Err(err);
        }
        Ok(())
    }

    /// Writes the upload result back and publishes the matching event.
    async fn settle(
        &self,
        scan: &QueuedScan,
        outcome: &UploadOutcome,
        attempts: i32,
        report: &mut ReplayReport,
    ) -> Result<(), QueueError> {
        let Some(class) = classify_outcome(outcome) else {
            {
                let _write = self.write_lock.lock().await;
                self.repo.mark_synced(&scan.id).await?;
            }
            report.synced += 1;
            tracing::info!(scan_id = %scan.id, attempts, "scan synced");
            self.events.publish(QueueEvent::ScanSynced {
                id: scan.id.clone(),
            });
            return Ok(());
        };

        let next = self.retry.status_after_failure(class, attempts);
        let reason = outcome.reason().unwrap_or_default();
        {
            let _write = self.write_lock.lock().await;
            self.repo.record_failure(&scan.id, next, &reason).await?;
        }

        if next == ScanStatus::Pending {
            report.requeued += 1;
            tracing::warn!(scan_id = %scan.id, attempts, %reason, "upload failed, will retry");
            self.events.publish(QueueEvent::ScanRequeued {
                id: scan.id.clone(),
            });
        } else {
            report.failed += 1;
            tracing::warn!(scan_id = %scan.id, attempts, %reason, "upload failed");
            self.events.publish(QueueEvent::ScanFailed {
                id: scan.id.clone(),
                reason,
            });
        }

        Ok(())
    }

    /// Result could not be recorded: hand the scan back to `pending` so the
    /// next pass picks it up instead of leaving it in `syncing`. A delivered
    /// scan may be uploaded twice this way.
    async fn release_attempt(&self, id: &str) {
        let _write = self.write_lock.lock().await;
        match self.repo.release_attempt(id).await {
            Ok(true) => tracing::warn!(scan_id = %id, "returned scan to pending after write-back error"),
            Ok(false) => {}
            Err(err) => tracing::error!(scan_id = %id, error = %err, "scan left in syncing until restart"),
        }
    }

    // ----------------------------
    // Worker lifecycle
    // ----------------------------

    /// Spawns the loop that replays on every offline -> online transition and
    /// runs synced-scan housekeeping. If the source already reports online, a
    /// first pass runs right away so a backlog from an earlier session is not
    /// stranded.
    pub fn start(&self, link: watch::Receiver<LinkState>, opts: WorkerOptions) -> QueueWorker {
        let (stop_tx, stop_rx) = oneshot::channel();
        let queue = self.clone();
        let handle = tokio::spawn(async move { queue.run(link, opts, stop_rx).await });

        QueueWorker {
            stop_tx: Some(stop_tx),
            handle,
        }
    }

    async fn run(
        self,
        mut link: watch::Receiver<LinkState>,
        opts: WorkerOptions,
        mut stop: oneshot::Receiver<()>,
    ) {
        match self.recover_interrupted().await {
            Ok(n) if n > 0 => tracing::info!(recovered = n, "reset interrupted uploads to pending"),
            Ok(_) => {}
            Err(err) => tracing::error!(error = %err, "could not recover interrupted uploads"),
        }

        let initial = *link.borrow_and_update();
        let mut was_online = initial.online;
        let mut handled = initial.reconnects;
        if initial.online {
            self.replay_logged().await;
        }

        let every = opts.maintenance_interval.max(Duration::from_secs(1));
        let mut housekeeping =
            tokio::time::interval_at(tokio::time::Instant::now() + every, every);

        loop {
            tokio::select! {
                _ = &mut stop => break,
                changed = link.changed() => {
                    if changed.is_err() {
                        tracing::info!("connectivity source closed, stopping queue worker");
                        break;
                    }
                    let now = *link.borrow_and_update();
                    // reconnects that happened while a pass ran still count
                    if now.online && now.reconnects != handled {
                        handled = now.reconnects;
                        tracing::info!(reconnects = now.reconnects, "connection restored, syncing pending scans");
                        self.replay_logged().await;
                    } else if !now.online && was_online {
                        tracing::info!("connection lost, new scans stay queued");
                    }
                    was_online = now.online;
                }
                _ = housekeeping.tick() => {
                    match self.purge_synced(opts.synced_retention).await {
                        Ok(n) if n > 0 => tracing::info!(purged = n, "removed expired synced scans"),
                        Ok(_) => {}
                        Err(err) => tracing::error!(error = %err, "housekeeping failed"),
                    }
                }
            }
        }
    }

    async fn replay_logged(&self) {
        if let Err(err) = self.replay_pending().await {
            tracing::error!(error = %err, "replay pass aborted");
        }
    }
}

/// Handle to a running queue loop. Dropping it stops the loop too.
pub struct QueueWorker {
    stop_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl QueueWorker {
    /// Waits for an in-flight pass to finish, then ends the loop.
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Err(err) = (&mut self.handle).await {
            tracing::error!(error = %err, "queue worker ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
