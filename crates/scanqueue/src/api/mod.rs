use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};

use crate::api::models::{
    CountResponse, EnqueueScanRequest, EnqueueScanResponse, ListScansQuery, PurgeQuery,
    PurgeResponse, RetryFailedResponse, ScanSummary, SetStatusRequest,
};
use crate::scans::{
    Connectivity, OfflineScanQueue, QueueError, ReplayReport, ScanImage, ScanStatus,
};

pub mod models;

const DEFAULT_PURGE_SECS: u64 = 24 * 60 * 60;

/// Local status surface for dashboard widgets: badge counts, inspection,
/// manual retry and an explicit sync trigger.
#[derive(Clone)]
pub struct ApiState {
    pub queue: OfflineScanQueue,
    pub connectivity: Connectivity,
    pub max_image_bytes: usize,
}

pub fn router(state: ApiState) -> Router {
    // base64 inflates by 4/3, plus room for the JSON envelope
    let body_limit = (state.max_image_bytes / 3)
        .saturating_mul(4)
        .saturating_add(64 * 1024);

    Router::new()
        .route("/health", get(health))
        .route("/scans", get(list_scans).post(enqueue_scan))
        .route("/scans/count", get(count_scans))
        .route("/scans/retry-failed", post(retry_failed))
        .route("/scans/:id", get(get_scan).delete(remove_scan))
        .route("/scans/:id/status", put(set_status))
        .route("/scans/:id/retry", post(retry_scan))
        .route("/sync", post(sync_now))
        .route("/purge", post(purge))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

fn queue_err(e: QueueError) -> (StatusCode, String) {
    let status = match &e {
        QueueError::NotFound(_) => StatusCode::NOT_FOUND,
        QueueError::InvalidStatus(_) | QueueError::InvalidImage(_) => StatusCode::BAD_REQUEST,
        QueueError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

fn parse_status(raw: &str) -> Result<ScanStatus, (StatusCode, String)> {
    raw.parse().map_err(queue_err)
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub async fn list_scans(
    State(state): State<ApiState>,
    Query(q): Query<ListScansQuery>,
) -> Result<Json<Vec<ScanSummary>>, (StatusCode, String)> {
    let status = q.status.as_deref().map(parse_status).transpose()?;

    let scans = state
        .queue
        .list(status, q.limit.unwrap_or(100))
        .await
        .map_err(queue_err)?;

    Ok(Json(scans.iter().map(ScanSummary::from).collect()))
}

pub async fn enqueue_scan(
    State(state): State<ApiState>,
    Json(body): Json<EnqueueScanRequest>,
) -> Result<(StatusCode, Json<EnqueueScanResponse>), (StatusCode, String)> {
    let image = ScanImage::from_base64(&body.image_data).map_err(queue_err)?;

    if image.len() > state.max_image_bytes {
        return Err((
            StatusCode::PAYLOAD_TOO_LARGE,
            format!(
                "image is {} bytes, limit is {}",
                image.len(),
                state.max_image_bytes
            ),
        ));
    }

    let id = match body.captured_at {
        Some(at) => state.queue.enqueue_captured_at(image, at).await,
        None => state.queue.enqueue(image).await,
    }
    .map_err(queue_err)?;

    Ok((StatusCode::CREATED, Json(EnqueueScanResponse { id })))
}

pub async fn count_scans(
    State(state): State<ApiState>,
) -> Result<Json<CountResponse>, (StatusCode, String)> {
    let counts = state.queue.status_counts().await.map_err(queue_err)?;

    Ok(Json(CountResponse {
        counts,
        online: state.connectivity.is_online(),
    }))
}

pub async fn get_scan(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<ScanSummary>, (StatusCode, String)> {
    match state.queue.get(&id).await.map_err(queue_err)? {
        Some(scan) => Ok(Json(ScanSummary::from(&scan))),
        None => Err(queue_err(QueueError::NotFound(id))),
    }
}

pub async fn remove_scan(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    state.queue.remove(&id).await.map_err(queue_err)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_status(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(body): Json<SetStatusRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    let status = parse_status(&body.status)?;
    state
        .queue
        .mark_status(&id, status)
        .await
        .map_err(queue_err)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn retry_scan(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    state.queue.retry(&id).await.map_err(queue_err)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn retry_failed(
    State(state): State<ApiState>,
) -> Result<Json<RetryFailedResponse>, (StatusCode, String)> {
    let requeued = state.queue.retry_failed().await.map_err(queue_err)?;
    Ok(Json(RetryFailedResponse { requeued }))
}

pub async fn sync_now(
    State(state): State<ApiState>,
) -> Result<Json<ReplayReport>, (StatusCode, String)> {
    let report = state.queue.replay_pending().await.map_err(queue_err)?;
    Ok(Json(report))
}

pub async fn purge(
    State(state): State<ApiState>,
    Query(q): Query<PurgeQuery>,
) -> Result<Json<PurgeResponse>, (StatusCode, String)> {
    let older_than = std::time::Duration::from_secs(q.older_than_secs.unwrap_or(DEFAULT_PURGE_SECS));
    let purged = state
        .queue
        .purge_synced(older_than)
        .await
        .map_err(queue_err)?;
    Ok(Json(PurgeResponse { purged }))
}
