//! NATS event bus.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::BusConfig;
use crate::error::{ControlError, ControlResult};

use super::{EventBus, InfrastructureEvent, InfrastructureOp};

/// Publishes JSON-encoded events and commands to NATS subjects.
#[derive(Debug, Clone)]
pub struct NatsEventBus {
    client: async_nats::Client,
    events_subject: String,
    ops_subject: String,
}

impl NatsEventBus {
    /// Connect to the configured broker.
    pub async fn connect(config: &BusConfig) -> ControlResult<Self> {
        let client = async_nats::connect(config.url.as_str())
            .await
            .map_err(|e| ControlError::bus(format!("failed to connect to {}: {e}", config.url)))?;
        info!(url = %config.url, "Connected to NATS");

        Ok(Self {
            client,
            events_subject: config.events_subject.clone(),
            ops_subject: config.ops_subject.clone(),
        })
    }

    async fn publish<T: Serialize + Sync>(&self, subject: &str, message: &T) -> ControlResult<()> {
        let payload = serde_json::to_vec(message)
            .map_err(|e| ControlError::bus(format!("failed to encode message: {e}")))?;
        self.client
            .publish(subject.to_owned(), payload.into())
            .await
            .map_err(|e| ControlError::bus(format!("failed to publish to {subject}: {e}")))?;
        debug!(subject, "Published message");
        Ok(())
    }
}

#[async_trait]
impl EventBus for NatsEventBus {
    async fn publish_event(&self, event: &InfrastructureEvent) -> ControlResult<()> {
        self.publish(&self.events_subject, event).await
    }

    async fn publish_op(&self, op: &InfrastructureOp) -> ControlResult<()> {
        self.publish(&self.ops_subject, op).await
    }
}
