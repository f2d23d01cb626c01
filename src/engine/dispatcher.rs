use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use sqlx::PgPool;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, error, info, warn};

use crate::config::QueueConfig;
use crate::error::DeliveryError;
use crate::models::{Event, EventLog};
use crate::repositories::{EventRepository, LogRepository, StatsRepository};
use crate::services::SinkRegistry;

/// Claims ready batches from the queue store and drives delivery to the
/// destination sinks, with bounded retries and exponential backoff.
pub struct Dispatcher {
    pool: PgPool,
    sinks: SinkRegistry,
    config: QueueConfig,
}

impl Dispatcher {
    pub fn new(pool: PgPool, sinks: SinkRegistry, config: QueueConfig) -> Self {
        Self { pool, sinks, config }
    }

    /// Spawns the configured number of worker loops. Each worker claims its
    /// own batches; the claim transition guarantees no overlap.
    pub fn spawn_workers(self: Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        (0..self.config.worker_count)
            .map(|worker_id| {
                let dispatcher = Arc::clone(&self);
                tokio::spawn(async move {
                    if let Err(e) = dispatcher.run_worker(worker_id).await {
                        error!("Dispatch worker {} aborted: {}", worker_id, e);
                    }
                })
            })
            .collect()
    }

    /// Worker loop. Delivery failures are absorbed into the retry cycle;
    /// only a store error ends the loop.
    pub async fn run_worker(&self, worker_id: usize) -> Result<()> {
        info!("Dispatch worker {} started", worker_id);

        loop {
            let claimed = self.dispatch_batch().await?;

            if claimed == 0 {
                sleep(self.config.poll_interval).await;
            } else {
                sleep(self.config.inter_batch_delay).await;
            }
        }
    }

    /// Claims one batch and delivers every event in it. Returns the number
    /// of events claimed.
    pub async fn dispatch_batch(&self) -> Result<usize> {
        let events = EventRepository::new(&self.pool)
            .dequeue_batch(self.config.batch_size)
            .await?;

        for event in &events {
            self.deliver_event(event).await?;
        }

        Ok(events.len())
    }

    async fn deliver_event(&self, event: &Event) -> Result<()> {
        let started = Instant::now();
        let outcome = self.try_deliver(event).await;
        let elapsed_ms = started.elapsed().as_millis() as i64;

        let repo = EventRepository::new(&self.pool);
        let logs = LogRepository::new(&self.pool);
        let stats = StatsRepository::new(&self.pool);

        match outcome {
            Ok(()) => {
                repo.mark_completed(event.id).await?;
                let log = EventLog::success(
                    event.id,
                    event.event_type,
                    event.service_id.clone(),
                    elapsed_ms,
                );
                logs.append(&log).await?;
                stats.record(&log).await?;

                debug!("Event {} delivered in {}ms", event.id, elapsed_ms);
            }
            Err(e) => {
                let attempts = event.attempts + 1;

                if attempts < self.config.max_attempts {
                    let delay = self.backoff_delay(attempts);
                    let next_attempt = Utc::now() + chrono::Duration::from_std(delay)?;
                    repo.mark_retry(event.id, next_attempt).await?;

                    warn!(
                        "Event {} attempt {}/{} failed: {}. Retrying in {:?}",
                        event.id, attempts, self.config.max_attempts, e, delay
                    );
                } else {
                    repo.mark_failed(event.id).await?;

                    error!(
                        "Event {} failed terminally after {} attempts: {}",
                        event.id, attempts, e
                    );
                }

                let log = EventLog::failed(
                    event.id,
                    event.event_type,
                    event.service_id.clone(),
                    e.to_string(),
                );
                logs.append(&log).await?;
                stats.record(&log).await?;
            }
        }

        Ok(())
    }

    /// Resolves the sink and delivers under a hard timeout so one slow
    /// destination cannot stall the worker.
    async fn try_deliver(&self, event: &Event) -> Result<(), DeliveryError> {
        let sink = self.sinks.resolve(event.service_id.as_deref())?;

        match timeout(self.config.delivery_timeout, sink.deliver(event)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout(
                self.config.delivery_timeout.as_millis() as u64,
            )),
        }
    }

    fn backoff_delay(&self, attempts: i32) -> Duration {
        let multiplier = 2u64.saturating_pow(attempts.max(0) as u32);
        let delay_ms = (self.config.backoff_base.as_millis() as u64).saturating_mul(multiplier);

        Duration::from_millis(delay_ms.min(self.config.backoff_cap.as_millis() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_dispatcher() -> Dispatcher {
        let config = QueueConfig {
            backoff_base: Duration::from_millis(1000),
            backoff_cap: Duration::from_secs(60),
            ..QueueConfig::default()
        };

        Dispatcher::new(
            PgPool::connect_lazy("postgres://localhost/unused").unwrap(),
            SinkRegistry::new(),
            config,
        )
    }

    #[tokio::test]
    async fn test_backoff_doubles_per_attempt() {
        let dispatcher = test_dispatcher();

        assert_eq!(dispatcher.backoff_delay(1), Duration::from_millis(2000));
        assert_eq!(dispatcher.backoff_delay(2), Duration::from_millis(4000));
        assert_eq!(dispatcher.backoff_delay(3), Duration::from_millis(8000));
    }

    #[tokio::test]
    async fn test_backoff_is_capped() {
        let dispatcher = test_dispatcher();

        assert_eq!(dispatcher.backoff_delay(20), Duration::from_secs(60));
    }
}
