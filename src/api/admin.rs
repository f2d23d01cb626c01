use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::api::response::ApiError;
use crate::engine::{reaper, stats, Coalescer};
use crate::repositories::EventRepository;

use super::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct RetentionBody {
    /// Terminal events older than this many hours are pruned. Defaults to
    /// everything (0 hours).
    #[serde(default)]
    pub older_than_hours: i64,
}

#[derive(Debug, Deserialize, Default)]
pub struct ResetStuckBody {
    /// Override of the configured claim timeout, in seconds.
    pub timeout_secs: Option<f64>,
}

/// Removes every event that is not mid-delivery. `processing` rows are left
/// alone so an in-flight delivery can still record its outcome.
#[axum::debug_handler]
pub async fn clear_queue(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let cleared = EventRepository::new(&state.pool).clear().await?;
    info!("Admin clear removed {} event(s)", cleared);

    Ok(Json(json!({ "cleared": cleared })))
}

/// Re-coalesces the pending gift set and re-applies the capacity policy.
#[axum::debug_handler]
pub async fn optimize_queue(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let (merged, evicted) = Coalescer::optimize(&state.pool, state.config.max_queue_size).await?;

    Ok(Json(json!({ "merged": merged, "evicted": evicted })))
}

#[axum::debug_handler]
pub async fn clear_completed(
    State(state): State<AppState>,
    body: Option<Json<RetentionBody>>,
) -> Result<Json<Value>, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let cutoff = Utc::now() - chrono::Duration::hours(body.older_than_hours);
    let cleared = EventRepository::new(&state.pool).clear_completed(cutoff).await?;

    Ok(Json(json!({ "cleared": cleared })))
}

#[axum::debug_handler]
pub async fn clear_failed(
    State(state): State<AppState>,
    body: Option<Json<RetentionBody>>,
) -> Result<Json<Value>, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let cutoff = Utc::now() - chrono::Duration::hours(body.older_than_hours);
    let cleared = EventRepository::new(&state.pool).clear_failed(cutoff).await?;

    Ok(Json(json!({ "cleared": cleared })))
}

/// Manual trigger of the stuck-claim reap.
#[axum::debug_handler]
pub async fn reset_stuck(
    State(state): State<AppState>,
    body: Option<Json<ResetStuckBody>>,
) -> Result<Json<Value>, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let timeout = body
        .timeout_secs
        .unwrap_or_else(|| state.config.claim_timeout.as_secs_f64());

    let reclaimed = reaper::reap_stuck(&state.pool, timeout).await?;
    info!("Admin reset-stuck reclaimed {} event(s)", reclaimed);

    Ok(Json(json!({ "reclaimed": reclaimed })))
}

/// One-time ceiling bypass: a terminally failed event goes back to pending
/// with a fresh attempt budget.
#[axum::debug_handler]
pub async fn retry_event(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let affected = EventRepository::new(&state.pool).retry(id).await?;
    if affected == 0 {
        return Err(ApiError::not_found(format!("No failed event with id {}", id)));
    }

    info!("Admin retry re-queued event {}", id);

    Ok(Json(json!({ "retried": affected })))
}

/// Drops the stats table and replays the full event log through the
/// aggregator.
#[axum::debug_handler]
pub async fn rebuild_stats(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let replayed = stats::rebuild(&state.pool).await?;

    Ok(Json(json!({ "replayed_log_rows": replayed })))
}
