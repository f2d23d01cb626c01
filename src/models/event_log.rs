use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::event::EventType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "bridge_log_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Success,
    Failed,
    Skipped,
}

/// One delivery-attempt outcome. Append-only; `event_id` is nullable so the
/// row survives deletion of the event it describes.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EventLog {
    pub id: Uuid,

    pub event_id: Option<i64>,

    pub event_type: EventType,

    pub status: LogStatus,

    pub error_message: Option<String>,

    pub execution_time_ms: Option<i64>,

    pub service_id: Option<String>,

    pub processed_at: DateTime<Utc>,
}

impl EventLog {
    pub fn success(event_id: i64, event_type: EventType, service_id: Option<String>, execution_time_ms: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id: Some(event_id),
            event_type,
            status: LogStatus::Success,
            error_message: None,
            execution_time_ms: Some(execution_time_ms),
            service_id,
            processed_at: Utc::now(),
        }
    }

    pub fn failed(event_id: i64, event_type: EventType, service_id: Option<String>, error: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id: Some(event_id),
            event_type,
            status: LogStatus::Failed,
            error_message: Some(error),
            execution_time_ms: None,
            service_id,
            processed_at: Utc::now(),
        }
    }

    pub fn skipped(event_id: i64, event_type: EventType, service_id: Option<String>, reason: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id: Some(event_id),
            event_type,
            status: LogStatus::Skipped,
            error_message: Some(reason),
            execution_time_ms: None,
            service_id,
            processed_at: Utc::now(),
        }
    }
}
