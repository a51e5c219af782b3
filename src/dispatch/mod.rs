//! Fire-and-forget delayed delivery through a hosted message queue.
//!
//! Delivery is at-least-once with no ordering; acceptance means the queue
//! took the message, nothing more.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::awareness::ClockDomain;
use crate::config::DispatchConfig;
use crate::error::DispatchError;

#[derive(Debug, Clone)]
pub struct Envelope {
    /// Callback URL the queue delivers to.
    pub destination: String,
    pub payload: Value,
    pub delay: Option<Duration>,
    pub domain: ClockDomain,
    pub deduplication_id: Option<String>,
    pub group: Option<String>,
}

#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// `Ok(true)` when the queue accepted the message.
    async fn enqueue(&self, envelope: Envelope) -> Result<bool, DispatchError>;
}

/// Hot-path events never round-trip through the delayed queue.
pub fn guard_domain(envelope: &Envelope) -> Result<(), DispatchError> {
    match envelope.domain {
        ClockDomain::Hot => Err(DispatchError::HotPathForbidden),
        ClockDomain::Cold | ClockDomain::Stream => Ok(()),
    }
}

/// Publishes to `{url}/publish/{destination}` with bearer auth.
pub struct RestDispatcher {
    client: reqwest::Client,
    base_url: String,
    token: String,
    default_delay: Duration,
}

impl RestDispatcher {
    pub fn new(config: &DispatchConfig) -> Result<Self, DispatchError> {
        if config.token.is_empty() {
            return Err(DispatchError::NotConfigured);
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DispatchError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            default_delay: Duration::from_secs(config.default_delay_secs),
        })
    }

    fn publish_url(&self, destination: &str) -> String {
        format!("{}/publish/{}", self.base_url, destination)
    }
}

#[async_trait]
impl Dispatcher for RestDispatcher {
    async fn enqueue(&self, envelope: Envelope) -> Result<bool, DispatchError> {
        guard_domain(&envelope)?;

        let delay = envelope.delay.unwrap_or(self.default_delay);
        let mut request = self
            .client
            .post(self.publish_url(&envelope.destination))
            .bearer_auth(&self.token)
            .header("Upstash-Delay", format!("{}s", delay.as_secs()))
            .json(&envelope.payload);
        if let Some(id) = &envelope.deduplication_id {
            request = request.header("Upstash-Deduplication-Id", id);
        }
        if let Some(group) = &envelope.group {
            request = request.header("Upstash-Group", group);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let accepted = matches!(status, 200 | 201 | 202);
        if accepted {
            debug!(destination = %envelope.destination, status, "message queued");
        } else {
            warn!(destination = %envelope.destination, status, "queue refused message");
        }
        Ok(accepted)
    }
}
