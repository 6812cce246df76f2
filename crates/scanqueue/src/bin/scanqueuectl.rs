use scanqueue::config::Config;
use scanqueue::db;
use scanqueue::scans::{
    EventBus, HttpUploader, OfflineScanQueue, ScanImage, ScanRepo, ScanStatus,
};
use std::env;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!(
            "scanqueuectl <command>\n\
             Commands:\n\
             - count\n\
             - list [pending|syncing|synced|failed]\n\
             - enqueue <image-path>\n\
             - retry <scan_id>\n\
             - retry-failed\n\
             - remove <scan_id>\n\
             - purge [hours]\n\
             - sync\n\
             \n\
             Uses SCANQ_DATABASE_URL (or DATABASE_URL) and SCANQ_UPLOAD_BASE_URL.\n"
        );
        std::process::exit(2);
    }

    let cfg = Config::from_env()?;
    let pool = db::make_pool(&cfg.database_url).await?;
    if cfg.migrate_on_startup {
        db::run_migrations(&pool).await?;
    }

    let uploader = HttpUploader::new(cfg.upload_url(), cfg.upload_timeout())?;
    let queue = OfflineScanQueue::new(
        ScanRepo::new(pool),
        Arc::new(uploader),
        EventBus::new(cfg.event_buffer),
    )
    .with_retry_policy(cfg.retry_policy());

    match args[1].as_str() {
        "count" => show_counts(&queue).await?,
        "list" => {
            let status = args
                .get(2)
                .map(|s| s.parse::<ScanStatus>())
                .transpose()?;
            list(&queue, status).await?;
        }
        "enqueue" => {
            let path = args.get(2).ok_or_else(|| anyhow::anyhow!("usage: scanqueuectl enqueue <image-path>"))?;
            let id = enqueue_file(&queue, Path::new(path)).await?;
            println!("+ queued {id}");
        }
        "retry" => {
            let id = args.get(2).ok_or_else(|| anyhow::anyhow!("usage: scanqueuectl retry <scan_id>"))?;
            queue.retry(id).await?;
            println!("{id} -> pending");
        }
        "retry-failed" => {
            let n = queue.retry_failed().await?;
            println!("requeued {n} failed scans");
        }
        "remove" => {
            let id = args.get(2).ok_or_else(|| anyhow::anyhow!("usage: scanqueuectl remove <scan_id>"))?;
            queue.remove(id).await?;
            println!("removed {id}");
        }
        "purge" => {
            let hours: u64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(24);
            let n = queue
                .purge_synced(Duration::from_secs(hours * 60 * 60))
                .await?;
            println!("purged {n} synced scans older than {hours}h");
        }
        "sync" => {
            let report = queue.replay_pending().await?;
            println!(
                "pass {}: attempted={} synced={} failed={} requeued={} skipped={} errors={}",
                report.pass_id,
                report.attempted,
                report.synced,
                report.failed,
                report.requeued,
                report.skipped,
                report.errors
            );
        }
        other => {
            eprintln!("Unknown command: {other}");
            std::process::exit(2);
        }
    }

    Ok(())
}

async fn show_counts(queue: &OfflineScanQueue) -> anyhow::Result<()> {
    let c = queue.status_counts().await?;
    println!(
        "scans: total={} pending={} syncing={} synced={} failed={}",
        c.total, c.pending, c.syncing, c.synced, c.failed
    );
    Ok(())
}

async fn list(queue: &OfflineScanQueue, status: Option<ScanStatus>) -> anyhow::Result<()> {
    let scans = queue.list(status, 100).await?;
    if scans.is_empty() {
        println!("(no scans)");
        return Ok(());
    }

    for scan in scans {
        println!(
            "{}  {:<8} captured={} retries={} bytes={}{}",
            scan.id,
            scan.status,
            scan.timestamp.to_rfc3339(),
            scan.retries,
            scan.image.len(),
            scan.last_error
                .map(|e| format!(" last_error={e:?}"))
                .unwrap_or_default()
        );
    }
    Ok(())
}

async fn enqueue_file(queue: &OfflineScanQueue, path: &Path) -> anyhow::Result<String> {
    let bytes = tokio::fs::read(path).await?;
    let image = ScanImage::from_bytes(bytes, content_type_for(path));
    Ok(queue.enqueue(image).await?)
}

fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}
