use anyhow::Result;
use sqlx::PgPool;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::config::QueueConfig;
use crate::models::EventLog;
use crate::repositories::{EventRepository, LogRepository, StatsRepository};

/// Reclaims events left in `processing` past the claim timeout: a worker
/// died or a delivery hung without an outcome ever being recorded.
pub struct Reaper {
    pool: PgPool,
    config: QueueConfig,
}

impl Reaper {
    pub fn new(pool: PgPool, config: QueueConfig) -> Self {
        Self { pool, config }
    }

    /// Periodic loop, independent of dispatcher cadence.
    pub async fn run(&self) {
        let mut ticker = interval(self.config.reaper_period);

        loop {
            ticker.tick().await;

            match reap_stuck(&self.pool, self.config.claim_timeout.as_secs_f64()).await {
                Ok(0) => {}
                Ok(n) => warn!("Reaper reclaimed {} stuck event(s)", n),
                Err(e) => error!("Reaper pass failed: {}", e),
            }
        }
    }
}

/// Reverts stale claims to `pending` without counting a delivery attempt,
/// logging a `skipped` entry per reclaimed event. Shared by the periodic
/// reaper and the manual `reset-stuck` admin operation.
pub async fn reap_stuck(pool: &PgPool, timeout_secs: f64) -> Result<u64> {
    let reclaimed = EventRepository::new(pool).reset_stuck(timeout_secs).await?;
    if reclaimed.is_empty() {
        return Ok(0);
    }

    let logs = LogRepository::new(pool);
    let stats = StatsRepository::new(pool);
    for event in &reclaimed {
        info!(
            "Reclaimed stuck event {} (claimed, no outcome within {}s)",
            event.id, timeout_secs
        );
        let log = EventLog::skipped(
            event.id,
            event.event_type,
            event.service_id.clone(),
            format!("reclaimed: stuck in processing past {}s", timeout_secs),
        );
        logs.append(&log).await?;
        stats.record(&log).await?;
    }

    Ok(reclaimed.len() as u64)
}
