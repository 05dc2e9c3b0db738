//! Cluster registration, node attachment and registry cleanup.

use tracing::{debug, info};

use crate::discovery::DiscoveredNode;
use crate::error::{ControlError, ControlResult};
use crate::registry::{
    AddClusterRequest, AddNodeRequest, AttachNodeRequest, RemoveNodesRequest, UpdateNodeRequest,
};
use crate::requests::ClusterRef;
use crate::state::{Cluster, Provisioned};
use crate::types::{ClusterState, ClusterType, NodeState, OrganizationId, Platform, RequestId};

use super::{bounded, ClusterManager};

impl ClusterManager {
    /// Register and attach each node in turn.
    ///
    /// Stops at the first node that fails. Nodes attached before it stay
    /// attached.
    pub(super) async fn attach_nodes(
        &self,
        request_id: &RequestId,
        cluster: &ClusterRef,
        nodes: &[DiscoveredNode],
    ) -> ControlResult<()> {
        for (attached, node) in nodes.iter().enumerate() {
            self.attach_node(request_id, cluster, node)
                .await
                .map_err(|source| ControlError::NodeAttach {
                    ip: node.ip.clone(),
                    attached,
                    source: Box::new(source),
                })?;
        }
        info!(cluster_id = %cluster.cluster_id, count = nodes.len(), "Nodes attached");
        Ok(())
    }

    async fn attach_node(
        &self,
        request_id: &RequestId,
        cluster: &ClusterRef,
        node: &DiscoveredNode,
    ) -> ControlResult<()> {
        let short = self.timeouts.short();
        let added = bounded(
            short,
            "add node",
            self.deps.nodes.add_node(&AddNodeRequest {
                request_id: request_id.clone(),
                organization_id: cluster.organization_id.clone(),
                ip: node.ip.clone(),
                labels: node.labels.clone(),
            }),
        )
        .await?;
        debug!(ip = %node.ip, node_id = %added.node_id, "Node registered");

        bounded(
            short,
            "attach node",
            self.deps.nodes.attach_node(&AttachNodeRequest {
                request_id: request_id.clone(),
                organization_id: cluster.organization_id.clone(),
                cluster_id: cluster.cluster_id.clone(),
                node_id: added.node_id,
            }),
        )
        .await
    }

    /// Discover a running cluster and register it as provisioned.
    pub(super) async fn adopt_cluster(
        &self,
        request_id: &RequestId,
        organization_id: &OrganizationId,
        kube_config_raw: &str,
        hostname: &str,
        platform: Platform,
    ) -> ControlResult<Cluster<Provisioned>> {
        let discovered = bounded(
            self.timeouts.long(),
            "discover cluster",
            self.deps
                .discovery
                .discover(request_id, kube_config_raw, hostname),
        )
        .await?;

        let record = self
            .state
            .create(&AddClusterRequest {
                request_id: request_id.clone(),
                organization_id: organization_id.clone(),
                name: discovered.name.clone(),
                cluster_type: ClusterType::Kubernetes,
                platform,
                hostname: discovered.hostname.clone(),
                control_plane_hostname: discovered.control_plane_hostname.clone(),
                kubernetes_version: discovered.kubernetes_version.clone(),
                labels: Default::default(),
                state: Some(ClusterState::Provisioned),
            })
            .await?;
        let cluster = ClusterRef::new(record.organization_id.clone(), record.cluster_id.clone());
        self.attach_nodes(request_id, &cluster, &discovered.nodes)
            .await?;

        // Re-read so the handle reflects what the registry holds now.
        self.state.load(&cluster).await?.try_into_provisioned()
    }

    /// Set the lifecycle state of every node of a cluster.
    ///
    /// The operational status of each node is written back unchanged.
    pub(super) async fn mirror_node_state(
        &self,
        cluster: &ClusterRef,
        state: NodeState,
    ) -> ControlResult<()> {
        let short = self.timeouts.short();
        let nodes = bounded(short, "list nodes", self.deps.nodes.list_nodes(cluster)).await?;
        for node in nodes {
            bounded(
                short,
                "update node",
                self.deps.nodes.update_node(&UpdateNodeRequest {
                    organization_id: node.organization_id.clone(),
                    node_id: node.node_id.clone(),
                    status: Some(node.status),
                    state: Some(state),
                    ..UpdateNodeRequest::default()
                }),
            )
            .await?;
            debug!(node_id = %node.node_id, ?state, "Node state updated");
        }
        Ok(())
    }

    /// Delete a cluster and its nodes from the registry.
    pub(super) async fn remove_cluster_from_registry(
        &self,
        request_id: &RequestId,
        cluster: &ClusterRef,
    ) -> ControlResult<()> {
        let short = self.timeouts.short();
        let nodes = bounded(short, "list nodes", self.deps.nodes.list_nodes(cluster)).await?;
        if !nodes.is_empty() {
            bounded(
                short,
                "remove nodes",
                self.deps.nodes.remove_nodes(&RemoveNodesRequest {
                    request_id: Some(request_id.clone()),
                    organization_id: cluster.organization_id.clone(),
                    nodes: nodes.into_iter().map(|n| n.node_id).collect(),
                }),
            )
            .await?;
        }

        bounded(
            short,
            "remove cluster",
            self.deps.clusters.remove_cluster(cluster),
        )
        .await?;
        info!(cluster_id = %cluster.cluster_id, "Cluster removed from registry");
        Ok(())
    }
}
