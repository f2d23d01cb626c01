use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use crate::models::{Event, NewEvent, StatusCounts, TypeCount};

pub struct EventRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> EventRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, event: &NewEvent) -> Result<Event> {
        let inserted = sqlx::query_as::<_, Event>(
            "INSERT INTO bridge_events (event_type, payload, priority, service_id, repeat_end)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING *",
        )
        .bind(event.event_type)
        .bind(&event.payload)
        .bind(event.priority)
        .bind(&event.service_id)
        .bind(event.repeat_end)
        .fetch_one(self.pool)
        .await?;

        Ok(inserted)
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<Event>> {
        let event = sqlx::query_as::<_, Event>("SELECT * FROM bridge_events WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        Ok(event)
    }

    /// Folds an arriving gift into the open streak row for the same
    /// (service, sender, gift) key, if one exists and has not been claimed.
    /// Adds the arrival's count/cost to the streak row and carries the
    /// arrival's `repeat_end` flag; priority and `created_at` stay pinned to
    /// the first event of the streak. Returns `None` when no open row is
    /// available, in which case the caller inserts a fresh entry.
    pub async fn coalesce_gift(
        &self,
        service_id: Option<&str>,
        username: &str,
        gift_name: &str,
        count: i64,
        cost: i64,
        repeat_end: bool,
    ) -> Result<Option<Event>> {
        let merged = sqlx::query_as::<_, Event>(
            "UPDATE bridge_events
             SET payload = jsonb_set(
                     jsonb_set(
                         payload,
                         '{count}',
                         to_jsonb(COALESCE((payload->>'count')::bigint, 1) + $4)
                     ),
                     '{cost}',
                     to_jsonb(COALESCE((payload->>'cost')::bigint, 0) + $5)
                 ),
                 repeat_end = $6
             WHERE id = (
                 SELECT id FROM bridge_events
                 WHERE status = 'pending'
                   AND event_type = 'gift'
                   AND repeat_end = FALSE
                   AND service_id IS NOT DISTINCT FROM $1
                   AND payload->>'username' = $2
                   AND payload->>'gift_name' = $3
                 ORDER BY created_at ASC, id ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING *",
        )
        .bind(service_id)
        .bind(username)
        .bind(gift_name)
        .bind(count)
        .bind(cost)
        .bind(repeat_end)
        .fetch_optional(self.pool)
        .await?;

        Ok(merged)
    }

    /// Claims up to `n` ready events, atomically moving them to `processing`
    /// and stamping the claim time. `SKIP LOCKED` keeps concurrent workers
    /// from ever selecting the same row.
    pub async fn dequeue_batch(&self, n: i64) -> Result<Vec<Event>> {
        let claimed = sqlx::query_as::<_, Event>(
            "UPDATE bridge_events e
             SET status = 'processing', claimed_at = NOW()
             FROM (
                 SELECT id FROM bridge_events
                 WHERE status = 'pending' AND next_attempt_at <= NOW()
                 ORDER BY priority DESC, created_at ASC, id ASC
                 LIMIT $1
                 FOR UPDATE SKIP LOCKED
             ) ready
             WHERE e.id = ready.id
             RETURNING e.*",
        )
        .bind(n)
        .fetch_all(self.pool)
        .await?;

        Ok(claimed)
    }

    pub async fn mark_completed(&self, id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE bridge_events
             SET status = 'completed', processed_at = NOW(), claimed_at = NULL
             WHERE id = $1 AND status = 'processing'",
        )
        .bind(id)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Failed attempt with retries remaining: back to `pending`, not
    /// dequeueable again before `next_attempt_at`.
    pub async fn mark_retry(&self, id: i64, next_attempt_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE bridge_events
             SET status = 'pending', attempts = attempts + 1,
                 next_attempt_at = $2, claimed_at = NULL
             WHERE id = $1 AND status = 'processing'",
        )
        .bind(id)
        .bind(next_attempt_at)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Failed attempt at the ceiling: terminal.
    pub async fn mark_failed(&self, id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE bridge_events
             SET status = 'failed', attempts = attempts + 1,
                 processed_at = NOW(), claimed_at = NULL
             WHERE id = $1 AND status = 'processing'",
        )
        .bind(id)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Reverts stale claims to `pending` without counting an attempt; the
    /// delivery was never confirmed either way. Only rows whose claim is
    /// provably older than `timeout_secs` match, so this is safe to run
    /// beside active dispatch.
    pub async fn reset_stuck(&self, timeout_secs: f64) -> Result<Vec<Event>> {
        let reclaimed = sqlx::query_as::<_, Event>(
            "UPDATE bridge_events
             SET status = 'pending', claimed_at = NULL, next_attempt_at = NOW()
             WHERE status = 'processing'
               AND claimed_at < NOW() - make_interval(secs => $1)
             RETURNING *",
        )
        .bind(timeout_secs)
        .fetch_all(self.pool)
        .await?;

        Ok(reclaimed)
    }

    pub async fn pending_count(&self) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM bridge_events WHERE status = 'pending'")
                .fetch_one(self.pool)
                .await?;

        Ok(count)
    }

    /// Drops the lowest-priority, newest pending rows until the pending set
    /// fits `max_size` again. Returns the evicted events so the caller can
    /// log them as skipped. The producer is never blocked.
    pub async fn evict_overflow(&self, max_size: i64) -> Result<Vec<Event>> {
        let excess = self.pending_count().await? - max_size;
        if excess <= 0 {
            return Ok(Vec::new());
        }

        let evicted = sqlx::query_as::<_, Event>(
            "DELETE FROM bridge_events
             WHERE id IN (
                 SELECT id FROM bridge_events
                 WHERE status = 'pending'
                 ORDER BY priority ASC, created_at DESC, id DESC
                 LIMIT $1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING *",
        )
        .bind(excess)
        .fetch_all(self.pool)
        .await?;

        Ok(evicted)
    }

    /// Removes everything except in-flight `processing` rows, which are left
    /// alone to avoid racing an active delivery.
    pub async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM bridge_events WHERE status <> 'processing'")
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    pub async fn clear_completed(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM bridge_events WHERE status = 'completed' AND processed_at < $1",
        )
        .bind(older_than)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn clear_failed(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM bridge_events WHERE status = 'failed' AND processed_at < $1",
        )
        .bind(older_than)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Forces a terminally failed event back into rotation with a fresh
    /// attempt budget. Returns the number of rows changed (0 = no failed
    /// event with that id).
    pub async fn retry(&self, id: i64) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE bridge_events
             SET status = 'pending', attempts = 0, next_attempt_at = NOW(),
                 processed_at = NULL
             WHERE id = $1 AND status = 'failed'",
        )
        .bind(id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn status_counts(&self) -> Result<StatusCounts> {
        let counts = sqlx::query_as::<_, StatusCounts>(
            "SELECT
                 COUNT(*) FILTER (WHERE status = 'pending')    AS pending,
                 COUNT(*) FILTER (WHERE status = 'processing') AS processing,
                 COUNT(*) FILTER (WHERE status = 'completed')  AS completed,
                 COUNT(*) FILTER (WHERE status = 'failed')     AS failed
             FROM bridge_events",
        )
        .fetch_one(self.pool)
        .await?;

        Ok(counts)
    }

    pub async fn pending_counts_by_type(&self) -> Result<Vec<TypeCount>> {
        let counts = sqlx::query_as::<_, TypeCount>(
            "SELECT event_type, COUNT(*) AS count
             FROM bridge_events
             WHERE status = 'pending'
             GROUP BY event_type
             ORDER BY count DESC",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(counts)
    }

    /// Locks the full pending gift set for an `optimize()` pass. Claimed
    /// rows are skipped, so concurrent dispatch is unaffected.
    pub async fn lock_pending_gifts(
        tx: &mut Transaction<'_, Postgres>,
    ) -> Result<Vec<Event>> {
        let gifts = sqlx::query_as::<_, Event>(
            "SELECT * FROM bridge_events
             WHERE status = 'pending' AND event_type = 'gift'
             ORDER BY created_at ASC, id ASC
             FOR UPDATE SKIP LOCKED",
        )
        .fetch_all(&mut **tx)
        .await?;

        Ok(gifts)
    }

    pub async fn apply_merge(
        tx: &mut Transaction<'_, Postgres>,
        keeper_id: i64,
        payload: &serde_json::Value,
        repeat_end: bool,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE bridge_events SET payload = $2, repeat_end = $3 WHERE id = $1",
        )
        .bind(keeper_id)
        .bind(payload)
        .bind(repeat_end)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    pub async fn delete_merged(
        tx: &mut Transaction<'_, Postgres>,
        ids: &[i64],
    ) -> Result<u64> {
        let result = sqlx::query("DELETE FROM bridge_events WHERE id = ANY($1)")
            .bind(ids)
            .execute(&mut **tx)
            .await?;

        Ok(result.rows_affected())
    }
}
