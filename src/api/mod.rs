pub mod admin;
pub mod events;
pub mod health;
pub mod queue;
pub mod response;

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::PgPool;

use crate::config::QueueConfig;
use crate::services::SinkRegistry;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub sinks: SinkRegistry,
    pub config: QueueConfig,
}

pub fn build_router(pool: PgPool, sinks: SinkRegistry, config: QueueConfig) -> Router {
    let state = AppState { pool, sinks, config };

    Router::new()
        .route("/health", get(health::health_check))
        .route("/events", post(events::submit_event))
        .route("/queue/status", get(queue::queue_status))
        .route("/queue/stats", get(queue::queue_stats))
        .route("/queue/logs", get(queue::queue_logs))
        .route("/queue/clear", post(admin::clear_queue))
        .route("/queue/optimize", post(admin::optimize_queue))
        .route("/queue/clear-completed", post(admin::clear_completed))
        .route("/queue/clear-failed", post(admin::clear_failed))
        .route("/queue/reset-stuck", post(admin::reset_stuck))
        .route("/queue/events/{id}/retry", post(admin::retry_event))
        .route("/queue/stats/rebuild", post(admin::rebuild_stats))
        .with_state(state)
}
