//! Registry-backed lifecycle state with best-effort event publication.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::bus::{EventBus, InfrastructureEvent, SetClusterStatusRequest};
use crate::error::ControlResult;
use crate::registry::{AddClusterRequest, ClusterRegistry, UpdateClusterRequest};
use crate::requests::ClusterRef;
use crate::state::{AnyCluster, Cluster, LifecycleState};
use crate::types::ClusterRecord;

use super::bounded;

/// Reads and writes cluster state.
///
/// Writes go to the registry first; the matching event is published only
/// after the registry accepted the write.
#[derive(Clone)]
pub(crate) struct StateAccessor {
    clusters: Arc<dyn ClusterRegistry>,
    bus: Arc<dyn EventBus>,
    timeout: Duration,
}

impl StateAccessor {
    pub(crate) fn new(
        clusters: Arc<dyn ClusterRegistry>,
        bus: Arc<dyn EventBus>,
        timeout: Duration,
    ) -> Self {
        Self {
            clusters,
            bus,
            timeout,
        }
    }

    pub(crate) async fn get(&self, cluster: &ClusterRef) -> ControlResult<ClusterRecord> {
        bounded(self.timeout, "get cluster", self.clusters.get_cluster(cluster)).await
    }

    /// Fetch a cluster and lift it into the typed lifecycle.
    pub(crate) async fn load(&self, cluster: &ClusterRef) -> ControlResult<AnyCluster> {
        self.get(cluster).await.map(AnyCluster::from_record)
    }

    /// Create a cluster record and announce its initial state.
    pub(crate) async fn create(
        &self,
        request: &AddClusterRequest,
    ) -> ControlResult<ClusterRecord> {
        let record =
            bounded(self.timeout, "add cluster", self.clusters.add_cluster(request)).await?;
        debug!(cluster_id = %record.cluster_id, state = %record.state, "Cluster registered");
        let update = UpdateClusterRequest::for_cluster(
            record.organization_id.clone(),
            record.cluster_id.clone(),
        )
        .with_state(record.state);
        self.publish(InfrastructureEvent::ClusterUpdated(update)).await;
        Ok(record)
    }

    /// Write the lifecycle state carried by `cluster`.
    pub(crate) async fn persist<S: LifecycleState>(
        &self,
        cluster: Cluster<S>,
    ) -> ControlResult<Cluster<S>> {
        let update = UpdateClusterRequest::for_cluster(
            cluster.organization_id().clone(),
            cluster.id().clone(),
        )
        .with_state(cluster.state());
        let record = self.update(&update).await?;
        match cluster.failure() {
            Some(reason) => warn!(cluster_id = %cluster.id(), reason, "Cluster failed"),
            None => {
                debug!(cluster_id = %cluster.id(), state = %cluster.state(), "Cluster state written");
            }
        }
        Ok(cluster.amend(|r| *r = record))
    }

    /// Apply a partial update and publish it.
    pub(crate) async fn update(
        &self,
        request: &UpdateClusterRequest,
    ) -> ControlResult<ClusterRecord> {
        let record = bounded(
            self.timeout,
            "update cluster",
            self.clusters.update_cluster(request),
        )
        .await?;
        self.publish(InfrastructureEvent::ClusterUpdated(request.clone()))
            .await;
        Ok(record)
    }

    /// Cordon or uncordon a cluster and publish the status change.
    pub(crate) async fn set_cordon(
        &self,
        cluster: &ClusterRef,
        cordon: bool,
    ) -> ControlResult<ClusterRecord> {
        let record = if cordon {
            bounded(self.timeout, "cordon cluster", self.clusters.cordon_cluster(cluster)).await?
        } else {
            bounded(
                self.timeout,
                "uncordon cluster",
                self.clusters.uncordon_cluster(cluster),
            )
            .await?
        };
        self.publish(InfrastructureEvent::ClusterStatusChanged(
            SetClusterStatusRequest {
                organization_id: cluster.organization_id.clone(),
                cluster_id: cluster.cluster_id.clone(),
                cordon,
            },
        ))
        .await;
        Ok(record)
    }

    async fn publish(&self, event: InfrastructureEvent) {
        if let Err(err) = bounded(self.timeout, "publish event", self.bus.publish_event(&event)).await
        {
            warn!(error = %err, ?event, "Failed to publish infrastructure event");
        }
    }
}
