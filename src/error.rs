use thiserror::Error;

/// Normalization failures, reported synchronously to the producer.
/// Events that fail here never enter the queue.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("invalid payload for {event_type}: {reason}")]
    InvalidPayload {
        event_type: String,
        reason: String,
    },
}

/// A single delivery attempt failing. Drives the retry/backoff cycle;
/// never fatal to the dispatcher loop.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("delivery timed out after {0}ms")]
    Timeout(u64),

    #[error("no sink registered for service '{0}'")]
    UnknownService(String),

    #[error("sink rejected event: {0}")]
    Rejected(String),

    #[error("sink unreachable: {0}")]
    Unreachable(String),
}
