//! Infrastructure event bus.
//!
//! State-changing updates are published as [`InfrastructureEvent`]s for other
//! subsystems to mirror; operational commands such as drain are published as
//! [`InfrastructureOp`]s on a separate subject.

mod nats;

pub use nats::NatsEventBus;

use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ControlError, ControlResult};
use crate::registry::UpdateClusterRequest;
use crate::requests::ClusterRef;
use crate::types::{ClusterId, OrganizationId};

/// Connectivity status change of a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetClusterStatusRequest {
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Cluster whose status changed.
    pub cluster_id: ClusterId,
    /// Whether the cluster is now cordoned.
    pub cordon: bool,
}

/// State update mirrored onto the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum InfrastructureEvent {
    /// A cluster record was updated.
    ClusterUpdated(UpdateClusterRequest),
    /// A cluster was cordoned or uncordoned.
    ClusterStatusChanged(SetClusterStatusRequest),
}

/// Operational command for the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum InfrastructureOp {
    /// Move workloads off a cordoned cluster.
    DrainCluster(ClusterRef),
}

/// Trait for event bus implementations.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish a state update.
    async fn publish_event(&self, event: &InfrastructureEvent) -> ControlResult<()>;

    /// Publish an operational command.
    async fn publish_op(&self, op: &InfrastructureOp) -> ControlResult<()>;
}

/// In-memory event bus that records everything published.
#[derive(Debug, Default)]
pub struct MemoryEventBus {
    events: RwLock<Vec<InfrastructureEvent>>,
    ops: RwLock<Vec<InfrastructureOp>>,
    failing: RwLock<bool>,
}

impl MemoryEventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every publish fail.
    pub fn set_failing(&self, failing: bool) -> ControlResult<()> {
        *self
            .failing
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))? = failing;
        Ok(())
    }

    /// Events published so far.
    pub fn events(&self) -> ControlResult<Vec<InfrastructureEvent>> {
        self.events
            .read()
            .map(|e| e.clone())
            .map_err(|_| ControlError::internal("lock poisoned"))
    }

    /// Commands published so far.
    pub fn ops(&self) -> ControlResult<Vec<InfrastructureOp>> {
        self.ops
            .read()
            .map(|o| o.clone())
            .map_err(|_| ControlError::internal("lock poisoned"))
    }

    fn check(&self) -> ControlResult<()> {
        if *self
            .failing
            .read()
            .map_err(|_| ControlError::internal("lock poisoned"))?
        {
            return Err(ControlError::bus("broker unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl EventBus for MemoryEventBus {
    async fn publish_event(&self, event: &InfrastructureEvent) -> ControlResult<()> {
        self.check()?;
        self.events
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))?
            .push(event.clone());
        Ok(())
    }

    async fn publish_op(&self, op: &InfrastructureOp) -> ControlResult<()> {
        self.check()?;
        self.ops
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))?
            .push(op.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClusterState;

    #[tokio::test]
    async fn records_events_and_ops() {
        let bus = MemoryEventBus::new();
        let update =
            UpdateClusterRequest::for_cluster(OrganizationId::new("o1"), ClusterId::new("c1"))
                .with_state(ClusterState::Installed);
        bus.publish_event(&InfrastructureEvent::ClusterUpdated(update))
            .await
            .unwrap();
        bus.publish_op(&InfrastructureOp::DrainCluster(ClusterRef::new(
            OrganizationId::new("o1"),
            ClusterId::new("c1"),
        )))
        .await
        .unwrap();

        assert_eq!(bus.events().unwrap().len(), 1);
        assert_eq!(bus.ops().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failing_bus_records_nothing() {
        let bus = MemoryEventBus::new();
        bus.set_failing(true).unwrap();
        let op = InfrastructureOp::DrainCluster(ClusterRef::default());
        assert!(matches!(bus.publish_op(&op).await, Err(ControlError::Bus(_))));
        assert!(bus.ops().unwrap().is_empty());
    }

    #[test]
    fn event_wire_format() {
        let event = InfrastructureEvent::ClusterStatusChanged(SetClusterStatusRequest {
            organization_id: OrganizationId::new("o1"),
            cluster_id: ClusterId::new("c1"),
            cordon: true,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "cluster_status_changed");
        assert_eq!(json["payload"]["cordon"], true);
    }
}
