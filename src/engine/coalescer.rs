use anyhow::Result;
use serde_json::Value;
use sqlx::PgPool;
use tracing::{debug, info};

use crate::models::{Event, EventLog, EventType, NewEvent};
use crate::repositories::{EventRepository, LogRepository, StatsRepository};

/// Outcome of enqueueing a normalized event.
#[derive(Debug)]
pub struct Enqueued {
    pub event: Event,
    /// True when the arrival was folded into an existing streak row
    /// instead of creating a new one.
    pub coalesced: bool,
}

/// Collapses bursts of same-sender, same-gift events into one cumulative
/// queue entry and enforces the queue capacity on every insert.
pub struct Coalescer;

impl Coalescer {
    /// Enqueues a normalized event. Gifts first try to merge into the open
    /// streak row for their (service, sender, gift) key; everything else,
    /// and gifts with no open streak, insert fresh. Over-capacity pending
    /// rows are evicted afterwards and logged as skipped.
    pub async fn enqueue(pool: &PgPool, new_event: NewEvent, max_queue_size: i64) -> Result<Enqueued> {
        let events = EventRepository::new(pool);

        if new_event.event_type == EventType::Gift {
            let username = payload_str(&new_event.payload, "username").unwrap_or_default();
            let gift_name = payload_str(&new_event.payload, "gift_name").unwrap_or_default();
            let count = new_event
                .payload
                .get("count")
                .and_then(|v| v.as_i64())
                .unwrap_or(1);
            let cost = new_event
                .payload
                .get("cost")
                .and_then(|v| v.as_i64())
                .unwrap_or(0);
            let repeat_end = new_event.repeat_end.unwrap_or(true);

            if let Some(merged) = events
                .coalesce_gift(
                    new_event.service_id.as_deref(),
                    &username,
                    &gift_name,
                    count,
                    cost,
                    repeat_end,
                )
                .await?
            {
                debug!(
                    "Coalesced gift from '{}' into event {} (count now {})",
                    username,
                    merged.id,
                    merged.gift_count()
                );
                return Ok(Enqueued {
                    event: merged,
                    coalesced: true,
                });
            }
        }

        let inserted = events.insert(&new_event).await?;
        Self::enforce_capacity(pool, max_queue_size).await?;

        Ok(Enqueued {
            event: inserted,
            coalesced: false,
        })
    }

    /// Evicts over-capacity pending rows, logging each one as skipped so the
    /// drop is visible in the event log and hourly stats.
    pub async fn enforce_capacity(pool: &PgPool, max_queue_size: i64) -> Result<u64> {
        let evicted = EventRepository::new(pool).evict_overflow(max_queue_size).await?;
        if evicted.is_empty() {
            return Ok(0);
        }

        let logs = LogRepository::new(pool);
        let stats = StatsRepository::new(pool);
        for event in &evicted {
            info!(
                "Evicted event {} ({:?}, priority {}) - queue over capacity",
                event.id, event.event_type, event.priority
            );
            let log = EventLog::skipped(
                event.id,
                event.event_type,
                event.service_id.clone(),
                "evicted: queue over capacity".to_string(),
            );
            logs.append(&log).await?;
            stats.record(&log).await?;
        }

        Ok(evicted.len() as u64)
    }

    /// Re-runs streak merging across the whole pending gift set, then
    /// re-applies the capacity policy. Claimed rows are skipped, so this is
    /// safe while dispatch is running. Returns (rows merged away, rows
    /// evicted).
    pub async fn optimize(pool: &PgPool, max_queue_size: i64) -> Result<(u64, u64)> {
        let mut tx = pool.begin().await?;
        let gifts = EventRepository::lock_pending_gifts(&mut tx).await?;

        let mut merged_away: Vec<i64> = Vec::new();
        // Open accumulator per streak key: (keeper id, payload, repeat_end).
        let mut open: std::collections::HashMap<(Option<String>, String, String), (i64, Value, bool)> =
            std::collections::HashMap::new();

        for gift in &gifts {
            let key = (
                gift.service_id.clone(),
                gift.username().unwrap_or_default().to_string(),
                gift.gift_name().unwrap_or_default().to_string(),
            );
            let closed = gift.repeat_end.unwrap_or(true);

            if let Some((keeper_id, mut payload, _)) = open.remove(&key) {
                merge_gift_payload(&mut payload, &gift.payload);
                merged_away.push(gift.id);
                if closed {
                    EventRepository::apply_merge(&mut tx, keeper_id, &payload, true).await?;
                } else {
                    open.insert(key, (keeper_id, payload, false));
                }
            } else if !closed {
                open.insert(key, (gift.id, gift.payload.clone(), false));
            }
        }

        // Streaks still open at the end of the scan keep their accumulated
        // counts but stay open for future arrivals.
        for (keeper_id, payload, repeat_end) in open.into_values() {
            EventRepository::apply_merge(&mut tx, keeper_id, &payload, repeat_end).await?;
        }

        let merged = if merged_away.is_empty() {
            0
        } else {
            EventRepository::delete_merged(&mut tx, &merged_away).await?
        };
        tx.commit().await?;

        let evicted = Self::enforce_capacity(pool, max_queue_size).await?;

        if merged > 0 || evicted > 0 {
            info!("Optimize pass: merged {} streak rows, evicted {}", merged, evicted);
        }

        Ok((merged, evicted))
    }
}

fn payload_str(payload: &Value, field: &str) -> Option<String> {
    payload.get(field).and_then(|v| v.as_str()).map(String::from)
}

/// Adds `other`'s count and cost into `payload` in place.
fn merge_gift_payload(payload: &mut Value, other: &Value) {
    let count = payload.get("count").and_then(|v| v.as_i64()).unwrap_or(1)
        + other.get("count").and_then(|v| v.as_i64()).unwrap_or(1);
    let cost = payload.get("cost").and_then(|v| v.as_i64()).unwrap_or(0)
        + other.get("cost").and_then(|v| v.as_i64()).unwrap_or(0);

    if let Some(map) = payload.as_object_mut() {
        map.insert("count".to_string(), count.into());
        map.insert("cost".to_string(), cost.into());
    }
}
