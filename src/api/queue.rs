use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::response::ApiError;
use crate::repositories::{EventRepository, LogRepository, StatsRepository};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    #[serde(default = "default_hours")]
    pub hours: i32,
}

fn default_hours() -> i32 {
    24
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    100
}

/// Aggregate counts by state, plus the pending breakdown by event type.
#[axum::debug_handler]
pub async fn queue_status(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let repo = EventRepository::new(&state.pool);
    let counts = repo.status_counts().await?;
    let by_type = repo.pending_counts_by_type().await?;

    Ok(Json(json!({
        "counts": counts,
        "pending_by_type": by_type,
    })))
}

#[axum::debug_handler]
pub async fn queue_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<Value>, ApiError> {
    let stats = StatsRepository::new(&state.pool).window(query.hours).await?;

    Ok(Json(json!({ "hours": query.hours, "stats": stats })))
}

#[axum::debug_handler]
pub async fn queue_logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<Value>, ApiError> {
    let logs = LogRepository::new(&state.pool)
        .list_recent(query.limit.clamp(1, 1000))
        .await?;

    Ok(Json(json!({ "logs": logs })))
}
