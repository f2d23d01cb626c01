use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::DeliveryError;
use crate::models::Event;

/// A destination service the dispatcher can hand events to. Delivery is
/// at-least-once; sinks are expected to tolerate duplicates.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(&self, event: &Event) -> Result<(), DeliveryError>;
}

/// HTTP sink posting the event as JSON, one request per delivery.
pub struct HttpSink {
    client: Client,
    url: String,
}

impl HttpSink {
    pub fn new(url: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("Failed to create HTTP client"),
            url,
        }
    }
}

#[async_trait]
impl DeliverySink for HttpSink {
    async fn deliver(&self, event: &Event) -> Result<(), DeliveryError> {
        let body = json!({
            "id": event.id,
            "event_type": event.event_type,
            "payload": event.payload,
            "repeat_end": event.repeat_end,
            "created_at": event.created_at,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| DeliveryError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!("Sink {} rejected event {}: HTTP {}", self.url, event.id, status);
            return Err(DeliveryError::Rejected(format!("HTTP {} - {}", status, text)));
        }

        debug!("Delivered event {} to {}", event.id, self.url);

        Ok(())
    }
}

/// Resolves a `service_id` to its sink. Events with no `service_id` go to
/// the default sink when one is configured.
#[derive(Clone, Default)]
pub struct SinkRegistry {
    sinks: HashMap<String, Arc<dyn DeliverySink>>,
    default_sink: Option<Arc<dyn DeliverySink>>,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `SINK_URLS` (comma-separated `service_id=url` pairs) and
    /// `DEFAULT_SINK_URL` from the environment.
    pub fn from_env() -> Self {
        let mut registry = Self::new();

        if let Ok(pairs) = std::env::var("SINK_URLS") {
            for pair in pairs.split(',') {
                if let Some((service_id, url)) = pair.split_once('=') {
                    registry.register(
                        service_id.trim().to_string(),
                        Arc::new(HttpSink::new(url.trim().to_string())),
                    );
                }
            }
        }

        if let Ok(url) = std::env::var("DEFAULT_SINK_URL") {
            registry.set_default(Arc::new(HttpSink::new(url)));
        }

        registry
    }

    pub fn register(&mut self, service_id: String, sink: Arc<dyn DeliverySink>) {
        self.sinks.insert(service_id, sink);
    }

    pub fn set_default(&mut self, sink: Arc<dyn DeliverySink>) {
        self.default_sink = Some(sink);
    }

    pub fn resolve(&self, service_id: Option<&str>) -> Result<Arc<dyn DeliverySink>, DeliveryError> {
        match service_id {
            Some(id) => self
                .sinks
                .get(id)
                .cloned()
                .ok_or_else(|| DeliveryError::UnknownService(id.to_string())),
            None => self
                .default_sink
                .clone()
                .ok_or_else(|| DeliveryError::UnknownService("default".to_string())),
        }
    }
}
