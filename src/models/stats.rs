use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::event::EventType;

/// Hourly rollup of delivery outcomes, one row per (date, hour, event type).
/// Derived from the event log and reconstructible from scratch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct QueueStats {
    pub stat_date: NaiveDate,

    pub stat_hour: i32,

    pub event_type: EventType,

    pub total_events: i64,

    pub processed_events: i64,

    pub failed_events: i64,

    pub skipped_events: i64,

    pub avg_processing_time_ms: f64,
}

/// Queue backlog broken down by status, for `GET /queue/status`.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StatusCounts {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TypeCount {
    pub event_type: EventType,
    pub count: i64,
}
