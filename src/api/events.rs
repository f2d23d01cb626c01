use axum::{extract::State, Json};
use serde_json::{json, Value};
use tracing::info;

use crate::api::response::ApiError;
use crate::engine::{Coalescer, Normalizer};
use crate::models::SubmitEvent;

use super::AppState;

/// Producer entry point. Invalid payloads are rejected synchronously and
/// never enter the queue.
#[axum::debug_handler]
pub async fn submit_event(
    State(state): State<AppState>,
    Json(submission): Json<SubmitEvent>,
) -> Result<Json<Value>, ApiError> {
    let new_event = Normalizer::normalize(
        submission.event_type,
        submission.payload,
        submission.service_id,
    )?;

    let enqueued =
        Coalescer::enqueue(&state.pool, new_event, state.config.max_queue_size).await?;

    info!(
        "Accepted {:?} event {} (coalesced: {})",
        enqueued.event.event_type, enqueued.event.id, enqueued.coalesced
    );

    Ok(Json(json!({
        "event_id": enqueued.event.id,
        "coalesced": enqueued.coalesced,
        "priority": enqueued.event.priority,
    })))
}
