use scanqueue::api;
use scanqueue::config;
use scanqueue::db;
use scanqueue::logging;

use scanqueue::scans::connectivity::spawn_probe;
use scanqueue::scans::{
    Connectivity, EventBus, HttpUploader, OfflineScanQueue, QueueEvent, ScanRepo,
};

use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::Config::from_env()?;
    logging::init("sync-agent", &cfg.log_format);

    tracing::info!(
        database_url = %cfg.database_url,
        upload_url = %cfg.upload_url(),
        health_url = %cfg.health_url(),
        api = %cfg.admin_addr.clone().unwrap_or_else(|| "disabled".to_string()),
        retry_policy = ?cfg.retry_policy(),
        synced_retention_secs = cfg.synced_retention_secs,
        maintenance_interval_secs = cfg.maintenance_interval_secs,
        probe_interval_secs = cfg.probe_interval_secs,
        "sync-agent starting"
    );

    let pool = db::make_pool(&cfg.database_url).await?;
    if cfg.migrate_on_startup {
        db::run_migrations(&pool).await?;
    }

    let http = reqwest::Client::builder()
        .timeout(cfg.upload_timeout())
        .build()?;
    let uploader = HttpUploader::with_client(http.clone(), cfg.upload_url());

    let events = EventBus::new(cfg.event_buffer);
    let queue = OfflineScanQueue::new(ScanRepo::new(pool), Arc::new(uploader), events)
        .with_retry_policy(cfg.retry_policy());

    // Start offline; the first probe flips us online if the backend answers.
    let connectivity = Connectivity::new(false);
    let probe_handle = spawn_probe(
        http,
        cfg.health_url(),
        cfg.probe_interval(),
        connectivity.clone(),
    );

    let worker = queue.start(connectivity.subscribe(), cfg.worker_options());

    // ---- Event log task ----
    let mut rx = queue.subscribe();
    let events_handle = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(QueueEvent::ScanSynced { id }) => tracing::info!(scan_id = %id, "scan-synced"),
                Ok(QueueEvent::ScanFailed { id, reason }) => {
                    tracing::warn!(scan_id = %id, %reason, "scan-failed")
                }
                Ok(other) => tracing::debug!(event = ?other, "queue event"),
                Err(RecvError::Lagged(n)) => tracing::warn!(skipped = n, "event log lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    // ---- API task ----
    let api_addr = cfg.admin_addr.clone();
    let app = api::router(api::ApiState {
        queue: queue.clone(),
        connectivity: connectivity.clone(),
        max_image_bytes: cfg.max_image_bytes,
    });

    let api_handle = tokio::spawn(async move {
        if let Some(addr) = api_addr {
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            tracing::info!("status api listening on http://{addr}");
            axum::serve(listener, app).await?;
        } else {
            std::future::pending::<()>().await;
        }
        Ok::<(), anyhow::Error>(())
    });

    let result = tokio::select! {
        res = api_handle => res.map_err(anyhow::Error::from).and_then(|r| r),
        res = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested");
            res.map_err(anyhow::Error::from)
        }
    };

    probe_handle.abort();
    worker.stop().await;
    events_handle.abort();
    tracing::info!("sync-agent stopped");

    result
}
