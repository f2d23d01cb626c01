use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::api::response::ApiError;
use crate::repositories::EventRepository;

use super::AppState;

/// Liveness plus a backlog indicator. A reachable store and a bounded
/// pending set mean the bridge is keeping up.
#[axum::debug_handler]
pub async fn health_check(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let counts = EventRepository::new(&state.pool).status_counts().await?;
    let backlogged = counts.pending >= state.config.max_queue_size;

    Ok(Json(json!({
        "status": if backlogged { "degraded" } else { "ok" },
        "pending": counts.pending,
        "processing": counts.processing,
        "capacity": state.config.max_queue_size,
    })))
}
