use std::time::Duration;

use tracing::debug;

/// Queue and dispatch tuning knobs, all deployment-dependent and sourced
/// from the environment.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Number of concurrent dispatch workers.
    pub worker_count: usize,

    /// Maximum events claimed per dequeue batch.
    pub batch_size: i64,

    /// Delivery attempts before an event is terminally failed.
    pub max_attempts: i32,

    /// Base delay for exponential retry backoff.
    pub backoff_base: Duration,

    /// Upper bound on any single backoff delay.
    pub backoff_cap: Duration,

    /// Hard timeout on a single sink delivery.
    pub delivery_timeout: Duration,

    /// Pause between dispatched batches, throttling the downstream.
    pub inter_batch_delay: Duration,

    /// How long workers sleep when the queue is empty.
    pub poll_interval: Duration,

    /// A `processing` claim older than this is considered stuck.
    pub claim_timeout: Duration,

    /// How often the reaper scans for stuck claims.
    pub reaper_period: Duration,

    /// Maximum pending events held before low-priority eviction kicks in.
    pub max_queue_size: i64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            worker_count: 2,
            batch_size: 10,
            max_attempts: 3,
            backoff_base: Duration::from_millis(1000),
            backoff_cap: Duration::from_secs(60),
            delivery_timeout: Duration::from_secs(10),
            inter_batch_delay: Duration::from_millis(250),
            poll_interval: Duration::from_millis(500),
            claim_timeout: Duration::from_secs(120),
            reaper_period: Duration::from_secs(30),
            max_queue_size: 1000,
        }
    }
}

impl QueueConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            worker_count: env_parse("QUEUE_WORKERS", defaults.worker_count),
            batch_size: env_parse("QUEUE_BATCH_SIZE", defaults.batch_size),
            max_attempts: env_parse("QUEUE_MAX_ATTEMPTS", defaults.max_attempts),
            backoff_base: Duration::from_millis(env_parse(
                "QUEUE_BACKOFF_BASE_MS",
                defaults.backoff_base.as_millis() as u64,
            )),
            backoff_cap: Duration::from_millis(env_parse(
                "QUEUE_BACKOFF_CAP_MS",
                defaults.backoff_cap.as_millis() as u64,
            )),
            delivery_timeout: Duration::from_millis(env_parse(
                "QUEUE_DELIVERY_TIMEOUT_MS",
                defaults.delivery_timeout.as_millis() as u64,
            )),
            inter_batch_delay: Duration::from_millis(env_parse(
                "QUEUE_INTER_BATCH_DELAY_MS",
                defaults.inter_batch_delay.as_millis() as u64,
            )),
            poll_interval: Duration::from_millis(env_parse(
                "QUEUE_POLL_INTERVAL_MS",
                defaults.poll_interval.as_millis() as u64,
            )),
            claim_timeout: Duration::from_secs(env_parse(
                "QUEUE_CLAIM_TIMEOUT_SECS",
                defaults.claim_timeout.as_secs(),
            )),
            reaper_period: Duration::from_secs(env_parse(
                "QUEUE_REAPER_PERIOD_SECS",
                defaults.reaper_period.as_secs(),
            )),
            max_queue_size: env_parse("QUEUE_MAX_SIZE", defaults.max_queue_size),
        };

        debug!("Queue config: {:?}", config);

        config
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
