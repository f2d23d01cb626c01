use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "bridge_event_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Gift,
    Chat,
    Follow,
    Like,
    Share,
    ViewerCount,
    Donation,
    Subscribe,
    Unknown,
}

impl EventType {
    /// Fixed dispatch priority, higher is more urgent.
    pub fn priority(self) -> i32 {
        match self {
            EventType::Gift | EventType::Donation => 100,
            EventType::Follow | EventType::Subscribe => 50,
            EventType::Share => 15,
            EventType::Chat => 10,
            EventType::Like => 5,
            EventType::ViewerCount => 1,
            EventType::Unknown => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "bridge_event_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: i64,

    pub event_type: EventType,

    #[sqlx(json)]
    pub payload: serde_json::Value,

    pub priority: i32,

    pub service_id: Option<String>,

    pub status: EventStatus,

    /// Non-null only for gifts: `true` = last event of a streak,
    /// `false` = streak still open and eligible for coalescing.
    pub repeat_end: Option<bool>,

    pub attempts: i32,

    pub next_attempt_at: DateTime<Utc>,

    pub claimed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub processed_at: Option<DateTime<Utc>>,
}

impl Event {
    pub fn username(&self) -> Option<&str> {
        self.payload.get("username").and_then(|v| v.as_str())
    }

    pub fn gift_name(&self) -> Option<&str> {
        self.payload.get("gift_name").and_then(|v| v.as_str())
    }

    pub fn gift_count(&self) -> i64 {
        self.payload
            .get("count")
            .and_then(|v| v.as_i64())
            .unwrap_or(1)
    }
}

/// A normalized event ready for insertion; produced by the normalizer,
/// not yet owned by the queue.
#[derive(Debug, Clone, Serialize)]
pub struct NewEvent {
    pub event_type: EventType,
    pub payload: serde_json::Value,
    pub priority: i32,
    pub service_id: Option<String>,
    pub repeat_end: Option<bool>,
}

/// Producer-facing submission shape (`POST /events`).
#[derive(Debug, Deserialize)]
pub struct SubmitEvent {
    pub event_type: EventType,
    pub payload: serde_json::Value,
    pub service_id: Option<String>,
}
