use anyhow::Result;
use sqlx::PgPool;

use crate::models::EventLog;

pub struct LogRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> LogRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn append(&self, log: &EventLog) -> Result<()> {
        sqlx::query(
            "INSERT INTO bridge_event_log
             (id, event_id, event_type, status, error_message, execution_time_ms, service_id, processed_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(log.id)
        .bind(log.event_id)
        .bind(log.event_type)
        .bind(log.status)
        .bind(&log.error_message)
        .bind(log.execution_time_ms)
        .bind(&log.service_id)
        .bind(log.processed_at)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    pub async fn list_recent(&self, limit: i64) -> Result<Vec<EventLog>> {
        let logs = sqlx::query_as::<_, EventLog>(
            "SELECT * FROM bridge_event_log ORDER BY processed_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(logs)
    }

    /// Full log in insertion order, for stats rebuilds.
    pub async fn list_all(&self) -> Result<Vec<EventLog>> {
        let logs = sqlx::query_as::<_, EventLog>(
            "SELECT * FROM bridge_event_log ORDER BY processed_at ASC, id ASC",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(logs)
    }
}
