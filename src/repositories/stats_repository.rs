use anyhow::Result;
use chrono::Timelike;
use sqlx::PgPool;

use crate::models::{EventLog, LogStatus, QueueStats};

pub struct StatsRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> StatsRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Upserts the hourly row matching one delivery outcome. The running
    /// average only moves on success rows carrying an execution time, so
    /// replaying the same log sequence from an empty table reproduces the
    /// incremental result exactly.
    pub async fn record(&self, log: &EventLog) -> Result<()> {
        let date = log.processed_at.date_naive();
        let hour = log.processed_at.hour() as i32;

        let (processed, failed, skipped) = match log.status {
            LogStatus::Success => (1i64, 0i64, 0i64),
            LogStatus::Failed => (0, 1, 0),
            LogStatus::Skipped => (0, 0, 1),
        };
        let exec_ms = log.execution_time_ms.unwrap_or(0) as f64;

        sqlx::query(
            "INSERT INTO bridge_queue_stats
             (stat_date, stat_hour, event_type, total_events,
              processed_events, failed_events, skipped_events, avg_processing_time_ms)
             VALUES ($1, $2, $3, 1, $4, $5, $6, $7)
             ON CONFLICT (stat_date, stat_hour, event_type) DO UPDATE SET
                 total_events     = bridge_queue_stats.total_events + 1,
                 processed_events = bridge_queue_stats.processed_events + EXCLUDED.processed_events,
                 failed_events    = bridge_queue_stats.failed_events + EXCLUDED.failed_events,
                 skipped_events   = bridge_queue_stats.skipped_events + EXCLUDED.skipped_events,
                 avg_processing_time_ms = CASE
                     WHEN EXCLUDED.processed_events = 1 THEN
                         (bridge_queue_stats.avg_processing_time_ms * bridge_queue_stats.processed_events
                             + EXCLUDED.avg_processing_time_ms)
                         / (bridge_queue_stats.processed_events + 1)
                     ELSE bridge_queue_stats.avg_processing_time_ms
                 END",
        )
        .bind(date)
        .bind(hour)
        .bind(log.event_type)
        .bind(processed)
        .bind(failed)
        .bind(skipped)
        .bind(if processed == 1 { exec_ms } else { 0.0 })
        .execute(self.pool)
        .await?;

        Ok(())
    }

    pub async fn window(&self, hours: i32) -> Result<Vec<QueueStats>> {
        let stats = sqlx::query_as::<_, QueueStats>(
            "SELECT * FROM bridge_queue_stats
             WHERE (stat_date + make_interval(hours => stat_hour)) AT TIME ZONE 'UTC'
                   >= NOW() - make_interval(hours => $1)
             ORDER BY stat_date DESC, stat_hour DESC, event_type",
        )
        .bind(hours)
        .fetch_all(self.pool)
        .await?;

        Ok(stats)
    }

    pub async fn all(&self) -> Result<Vec<QueueStats>> {
        let stats = sqlx::query_as::<_, QueueStats>(
            "SELECT * FROM bridge_queue_stats ORDER BY stat_date, stat_hour, event_type",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(stats)
    }

    pub async fn truncate(&self) -> Result<()> {
        sqlx::query("TRUNCATE bridge_queue_stats")
            .execute(self.pool)
            .await?;

        Ok(())
    }
}
