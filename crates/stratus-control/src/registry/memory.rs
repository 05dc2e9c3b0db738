//! In-memory registry for testing.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{ControlError, ControlResult};
use crate::requests::ClusterRef;
use crate::types::{
    ClusterId, ClusterRecord, ClusterState, ClusterStatus, NodeId, NodeRecord, NodeState,
    NodeStatus, OrganizationId,
};

use super::{
    apply_labels, AddClusterRequest, AddNodeRequest, AttachNodeRequest, ClusterRegistry,
    NodeRegistry, RemoveNodesRequest, UpdateClusterRequest, UpdateNodeRequest,
};

/// In-memory registry for testing.
///
/// Besides the registry contracts it exposes hooks to seed connectivity
/// status, inject failures and inspect the sequence of lifecycle states
/// written for each cluster.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    clusters: RwLock<HashMap<ClusterId, ClusterRecord>>,
    nodes: RwLock<HashMap<NodeId, NodeRecord>>,
    history: RwLock<HashMap<ClusterId, Vec<ClusterState>>>,
    rejected_ips: RwLock<HashSet<String>>,
    fail_cluster_updates: RwLock<bool>,
}

impl MemoryRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a cluster record as-is.
    pub fn insert_cluster(&self, record: ClusterRecord) -> ControlResult<()> {
        self.record_state(&record.cluster_id, record.state)?;
        self.clusters
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))?
            .insert(record.cluster_id.clone(), record);
        Ok(())
    }

    /// Set the connectivity status of a cluster.
    pub fn set_status(&self, cluster: &ClusterRef, status: ClusterStatus) -> ControlResult<()> {
        let mut clusters = self
            .clusters
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))?;
        let record = lookup_mut(&mut clusters, cluster)?;
        record.status = status;
        Ok(())
    }

    /// Make `add_node` fail for the given address.
    pub fn reject_node(&self, ip: impl Into<String>) -> ControlResult<()> {
        self.rejected_ips
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))?
            .insert(ip.into());
        Ok(())
    }

    /// Make every `update_cluster` call fail.
    pub fn fail_cluster_updates(&self, fail: bool) -> ControlResult<()> {
        *self
            .fail_cluster_updates
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))? = fail;
        Ok(())
    }

    /// Lifecycle states written for a cluster, oldest first.
    pub fn state_history(&self, cluster_id: &ClusterId) -> ControlResult<Vec<ClusterState>> {
        let history = self
            .history
            .read()
            .map_err(|_| ControlError::internal("lock poisoned"))?;
        Ok(history.get(cluster_id).cloned().unwrap_or_default())
    }

    /// Number of stored clusters.
    pub fn cluster_count(&self) -> ControlResult<usize> {
        Ok(self
            .clusters
            .read()
            .map_err(|_| ControlError::internal("lock poisoned"))?
            .len())
    }

    /// Number of stored nodes, attached or not.
    pub fn node_count(&self) -> ControlResult<usize> {
        Ok(self
            .nodes
            .read()
            .map_err(|_| ControlError::internal("lock poisoned"))?
            .len())
    }

    fn record_state(&self, cluster_id: &ClusterId, state: ClusterState) -> ControlResult<()> {
        self.history
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))?
            .entry(cluster_id.clone())
            .or_default()
            .push(state);
        Ok(())
    }
}

fn lookup_mut<'a>(
    clusters: &'a mut HashMap<ClusterId, ClusterRecord>,
    cluster: &ClusterRef,
) -> ControlResult<&'a mut ClusterRecord> {
    clusters
        .get_mut(&cluster.cluster_id)
        .filter(|r| r.organization_id == cluster.organization_id)
        .ok_or_else(|| ControlError::NotFound(format!("cluster {}", cluster.cluster_id)))
}

fn generate_id() -> String {
    ulid::Ulid::new().to_string().to_lowercase()
}

#[async_trait]
impl ClusterRegistry for MemoryRegistry {
    async fn add_cluster(&self, request: &AddClusterRequest) -> ControlResult<ClusterRecord> {
        let state = request.state.unwrap_or(ClusterState::Provisioned);
        let record = ClusterRecord {
            organization_id: request.organization_id.clone(),
            cluster_id: ClusterId::new(generate_id()),
            name: request.name.clone(),
            cluster_type: request.cluster_type,
            platform: request.platform,
            hostname: request.hostname.clone(),
            control_plane_hostname: request.control_plane_hostname.clone(),
            kubernetes_version: request.kubernetes_version.clone(),
            labels: request.labels.clone(),
            state,
            status: ClusterStatus::Offline,
            created_at: chrono::Utc::now(),
        };
        self.insert_cluster(record.clone())?;
        Ok(record)
    }

    async fn get_cluster(&self, cluster: &ClusterRef) -> ControlResult<ClusterRecord> {
        let clusters = self
            .clusters
            .read()
            .map_err(|_| ControlError::internal("lock poisoned"))?;
        clusters
            .get(&cluster.cluster_id)
            .filter(|r| r.organization_id == cluster.organization_id)
            .cloned()
            .ok_or_else(|| ControlError::NotFound(format!("cluster {}", cluster.cluster_id)))
    }

    async fn list_clusters(
        &self,
        organization_id: &OrganizationId,
    ) -> ControlResult<Vec<ClusterRecord>> {
        let clusters = self
            .clusters
            .read()
            .map_err(|_| ControlError::internal("lock poisoned"))?;
        let mut results: Vec<_> = clusters
            .values()
            .filter(|r| &r.organization_id == organization_id)
            .cloned()
            .collect();
        results.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(results)
    }

    async fn update_cluster(
        &self,
        request: &UpdateClusterRequest,
    ) -> ControlResult<ClusterRecord> {
        let failing = *self
            .fail_cluster_updates
            .read()
            .map_err(|_| ControlError::internal("lock poisoned"))?;
        if failing {
            return Err(ControlError::upstream("registry", "update rejected"));
        }

        let updated = {
            let mut clusters = self
                .clusters
                .write()
                .map_err(|_| ControlError::internal("lock poisoned"))?;
            let record = lookup_mut(
                &mut clusters,
                &ClusterRef::new(request.organization_id.clone(), request.cluster_id.clone()),
            )?;

            if let Some(name) = &request.name {
                record.name.clone_from(name);
            }
            if let Some(hostname) = &request.hostname {
                record.hostname.clone_from(hostname);
            }
            if let Some(cp_hostname) = &request.control_plane_hostname {
                record.control_plane_hostname.clone_from(cp_hostname);
            }
            if let Some(state) = request.state {
                record.state = state;
            }
            apply_labels(
                &mut record.labels,
                request.add_labels,
                request.remove_labels,
                &request.labels,
            );
            record.clone()
        };

        if let Some(state) = request.state {
            self.record_state(&request.cluster_id, state)?;
        }
        Ok(updated)
    }

    async fn remove_cluster(&self, cluster: &ClusterRef) -> ControlResult<()> {
        let mut clusters = self
            .clusters
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))?;
        lookup_mut(&mut clusters, cluster)?;
        clusters.remove(&cluster.cluster_id);
        Ok(())
    }

    async fn cordon_cluster(&self, cluster: &ClusterRef) -> ControlResult<ClusterRecord> {
        let mut clusters = self
            .clusters
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))?;
        let record = lookup_mut(&mut clusters, cluster)?;
        record.status = match record.status {
            ClusterStatus::Online | ClusterStatus::OnlineCordon => ClusterStatus::OnlineCordon,
            ClusterStatus::Offline | ClusterStatus::OfflineCordon => ClusterStatus::OfflineCordon,
        };
        Ok(record.clone())
    }

    async fn uncordon_cluster(&self, cluster: &ClusterRef) -> ControlResult<ClusterRecord> {
        let mut clusters = self
            .clusters
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))?;
        let record = lookup_mut(&mut clusters, cluster)?;
        record.status = match record.status {
            ClusterStatus::Online | ClusterStatus::OnlineCordon => ClusterStatus::Online,
            ClusterStatus::Offline | ClusterStatus::OfflineCordon => ClusterStatus::Offline,
        };
        Ok(record.clone())
    }
}

#[async_trait]
impl NodeRegistry for MemoryRegistry {
    async fn add_node(&self, request: &AddNodeRequest) -> ControlResult<NodeRecord> {
        let rejected = self
            .rejected_ips
            .read()
            .map_err(|_| ControlError::internal("lock poisoned"))?
            .contains(&request.ip);
        if rejected {
            return Err(ControlError::upstream(
                "registry",
                format!("node {} rejected", request.ip),
            ));
        }

        let record = NodeRecord {
            organization_id: request.organization_id.clone(),
            node_id: NodeId::new(generate_id()),
            cluster_id: None,
            ip: request.ip.clone(),
            labels: request.labels.clone(),
            status: NodeStatus::Offline,
            state: NodeState::Unregistered,
        };
        self.nodes
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))?
            .insert(record.node_id.clone(), record.clone());
        Ok(record)
    }

    async fn attach_node(&self, request: &AttachNodeRequest) -> ControlResult<()> {
        let mut nodes = self
            .nodes
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))?;
        let node = nodes
            .get_mut(&request.node_id)
            .filter(|n| n.organization_id == request.organization_id)
            .ok_or_else(|| ControlError::NotFound(format!("node {}", request.node_id)))?;
        node.cluster_id = Some(request.cluster_id.clone());
        node.state = NodeState::Assigned;
        Ok(())
    }

    async fn update_node(&self, request: &UpdateNodeRequest) -> ControlResult<NodeRecord> {
        let mut nodes = self
            .nodes
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))?;
        let node = nodes
            .get_mut(&request.node_id)
            .filter(|n| n.organization_id == request.organization_id)
            .ok_or_else(|| ControlError::NotFound(format!("node {}", request.node_id)))?;

        if let Some(status) = request.status {
            node.status = status;
        }
        if let Some(state) = request.state {
            node.state = state;
        }
        apply_labels(
            &mut node.labels,
            request.add_labels,
            request.remove_labels,
            &request.labels,
        );
        Ok(node.clone())
    }

    async fn list_nodes(&self, cluster: &ClusterRef) -> ControlResult<Vec<NodeRecord>> {
        let nodes = self
            .nodes
            .read()
            .map_err(|_| ControlError::internal("lock poisoned"))?;
        let mut results: Vec<_> = nodes
            .values()
            .filter(|n| {
                n.organization_id == cluster.organization_id
                    && n.cluster_id.as_ref() == Some(&cluster.cluster_id)
            })
            .cloned()
            .collect();
        results.sort_by(|a, b| a.ip.cmp(&b.ip));
        Ok(results)
    }

    async fn remove_nodes(&self, request: &RemoveNodesRequest) -> ControlResult<()> {
        let mut nodes = self
            .nodes
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))?;
        for node_id in &request.nodes {
            nodes.remove(node_id);
        }
        Ok(())
    }
}
