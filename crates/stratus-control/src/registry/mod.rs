//! Cluster and node registry.
//!
//! The registry is the authoritative store of cluster and node records. The
//! orchestrator keeps no local copy; every read goes to the registry and every
//! lifecycle transition is written back to it. An in-memory implementation is
//! provided for testing.

mod http;
mod memory;

pub use http::HttpRegistry;
pub use memory::MemoryRegistry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ControlResult;
use crate::requests::ClusterRef;
use crate::types::{
    ClusterId, ClusterRecord, ClusterState, ClusterType, Labels, NodeId, NodeRecord, NodeState,
    NodeStatus, OrganizationId, Platform, RequestId,
};

/// Request to create a cluster record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddClusterRequest {
    /// Request that caused the creation.
    pub request_id: RequestId,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Display name.
    pub name: String,
    /// Kind of cluster.
    pub cluster_type: ClusterType,
    /// Platform the cluster runs on.
    pub platform: Platform,
    /// Public ingress hostname.
    pub hostname: String,
    /// Kubernetes API hostname.
    pub control_plane_hostname: String,
    /// Kubernetes version.
    pub kubernetes_version: String,
    /// Scheduling labels.
    pub labels: Labels,
    /// Initial lifecycle state.
    pub state: Option<ClusterState>,
}

/// Partial update of a cluster record. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateClusterRequest {
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Cluster to update.
    pub cluster_id: ClusterId,
    /// New display name.
    pub name: Option<String>,
    /// New ingress hostname.
    pub hostname: Option<String>,
    /// New Kubernetes API hostname.
    pub control_plane_hostname: Option<String>,
    /// New lifecycle state. Written only by the orchestrator.
    pub state: Option<ClusterState>,
    /// Merge `labels` into the existing set.
    pub add_labels: bool,
    /// Remove the keys of `labels` from the existing set.
    pub remove_labels: bool,
    /// Labels to add or remove.
    pub labels: Labels,
}

impl UpdateClusterRequest {
    /// Empty update for a cluster.
    #[must_use]
    pub fn for_cluster(organization_id: OrganizationId, cluster_id: ClusterId) -> Self {
        Self {
            organization_id,
            cluster_id,
            ..Self::default()
        }
    }

    /// Set the lifecycle state.
    #[must_use]
    pub const fn with_state(mut self, state: ClusterState) -> Self {
        self.state = Some(state);
        self
    }
}

/// Request to create a node record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddNodeRequest {
    /// Request that caused the creation.
    pub request_id: RequestId,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Network address.
    pub ip: String,
    /// Scheduling labels.
    pub labels: Labels,
}

/// Request to associate a node with a cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttachNodeRequest {
    /// Request that caused the attach.
    pub request_id: RequestId,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Target cluster.
    pub cluster_id: ClusterId,
    /// Node to attach.
    pub node_id: NodeId,
}

/// Partial update of a node record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateNodeRequest {
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Node to update.
    pub node_id: NodeId,
    /// Merge `labels` into the existing set.
    pub add_labels: bool,
    /// Remove the keys of `labels` from the existing set.
    pub remove_labels: bool,
    /// Labels to add or remove.
    pub labels: Labels,
    /// New operational status.
    pub status: Option<NodeStatus>,
    /// New lifecycle state.
    pub state: Option<NodeState>,
}

/// Request to delete nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoveNodesRequest {
    /// Request that caused the removal.
    pub request_id: Option<RequestId>,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Nodes to delete.
    pub nodes: Vec<NodeId>,
}

/// Cluster side of the registry.
#[async_trait]
pub trait ClusterRegistry: Send + Sync {
    /// Create a cluster record; the registry assigns its id.
    async fn add_cluster(&self, request: &AddClusterRequest) -> ControlResult<ClusterRecord>;

    /// Get a cluster.
    async fn get_cluster(&self, cluster: &ClusterRef) -> ControlResult<ClusterRecord>;

    /// List the clusters of an organization.
    async fn list_clusters(
        &self,
        organization_id: &OrganizationId,
    ) -> ControlResult<Vec<ClusterRecord>>;

    /// Apply a partial update and return the updated record.
    async fn update_cluster(&self, request: &UpdateClusterRequest)
        -> ControlResult<ClusterRecord>;

    /// Delete a cluster record.
    async fn remove_cluster(&self, cluster: &ClusterRef) -> ControlResult<()>;

    /// Close a cluster to new workloads.
    async fn cordon_cluster(&self, cluster: &ClusterRef) -> ControlResult<ClusterRecord>;

    /// Reopen a cluster to new workloads.
    async fn uncordon_cluster(&self, cluster: &ClusterRef) -> ControlResult<ClusterRecord>;
}

/// Node side of the registry.
#[async_trait]
pub trait NodeRegistry: Send + Sync {
    /// Create a node record; the registry assigns its id.
    async fn add_node(&self, request: &AddNodeRequest) -> ControlResult<NodeRecord>;

    /// Associate a node with a cluster.
    async fn attach_node(&self, request: &AttachNodeRequest) -> ControlResult<()>;

    /// Apply a partial update and return the updated record.
    async fn update_node(&self, request: &UpdateNodeRequest) -> ControlResult<NodeRecord>;

    /// List the nodes attached to a cluster.
    async fn list_nodes(&self, cluster: &ClusterRef) -> ControlResult<Vec<NodeRecord>>;

    /// Delete nodes.
    async fn remove_nodes(&self, request: &RemoveNodesRequest) -> ControlResult<()>;
}

pub(crate) fn apply_labels(
    existing: &mut Labels,
    add: bool,
    remove: bool,
    labels: &Labels,
) {
    if add {
        existing.extend(labels.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    if remove {
        for key in labels.keys() {
            existing.remove(key);
        }
    }
}
