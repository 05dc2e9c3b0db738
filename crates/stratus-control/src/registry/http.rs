//! HTTP client for the registry service.

use async_trait::async_trait;

use crate::client::ServiceClient;
use crate::config::EndpointConfig;
use crate::error::ControlResult;
use crate::requests::ClusterRef;
use crate::types::{ClusterRecord, NodeRecord, OrganizationId};

use super::{
    AddClusterRequest, AddNodeRequest, AttachNodeRequest, ClusterRegistry, NodeRegistry,
    RemoveNodesRequest, UpdateClusterRequest, UpdateNodeRequest,
};

/// Registry backed by the remote registry service.
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    client: ServiceClient,
}

impl HttpRegistry {
    /// Create a registry client from configuration.
    pub fn new(config: &EndpointConfig) -> ControlResult<Self> {
        Ok(Self {
            client: ServiceClient::new("registry", config)?,
        })
    }

    fn cluster_path(cluster: &ClusterRef) -> String {
        format!(
            "/organizations/{}/clusters/{}",
            cluster.organization_id, cluster.cluster_id
        )
    }
}

#[async_trait]
impl ClusterRegistry for HttpRegistry {
    async fn add_cluster(&self, request: &AddClusterRequest) -> ControlResult<ClusterRecord> {
        let path = format!("/organizations/{}/clusters", request.organization_id);
        self.client.post(&path, request).await
    }

    async fn get_cluster(&self, cluster: &ClusterRef) -> ControlResult<ClusterRecord> {
        self.client.get(&Self::cluster_path(cluster)).await
    }

    async fn list_clusters(
        &self,
        organization_id: &OrganizationId,
    ) -> ControlResult<Vec<ClusterRecord>> {
        self.client
            .get(&format!("/organizations/{organization_id}/clusters"))
            .await
    }

    async fn update_cluster(
        &self,
        request: &UpdateClusterRequest,
    ) -> ControlResult<ClusterRecord> {
        let cluster = ClusterRef::new(request.organization_id.clone(), request.cluster_id.clone());
        self.client
            .patch(&Self::cluster_path(&cluster), request)
            .await
    }

    async fn remove_cluster(&self, cluster: &ClusterRef) -> ControlResult<()> {
        self.client
            .delete::<()>(&Self::cluster_path(cluster), None)
            .await
    }

    async fn cordon_cluster(&self, cluster: &ClusterRef) -> ControlResult<ClusterRecord> {
        let path = format!("{}/cordon", Self::cluster_path(cluster));
        self.client.post(&path, cluster).await
    }

    async fn uncordon_cluster(&self, cluster: &ClusterRef) -> ControlResult<ClusterRecord> {
        let path = format!("{}/uncordon", Self::cluster_path(cluster));
        self.client.post(&path, cluster).await
    }
}

#[async_trait]
impl NodeRegistry for HttpRegistry {
    async fn add_node(&self, request: &AddNodeRequest) -> ControlResult<NodeRecord> {
        let path = format!("/organizations/{}/nodes", request.organization_id);
        self.client.post(&path, request).await
    }

    async fn attach_node(&self, request: &AttachNodeRequest) -> ControlResult<()> {
        let path = format!(
            "/organizations/{}/nodes/{}/attach",
            request.organization_id, request.node_id
        );
        self.client.post_unit(&path, request).await
    }

    async fn update_node(&self, request: &UpdateNodeRequest) -> ControlResult<NodeRecord> {
        let path = format!(
            "/organizations/{}/nodes/{}",
            request.organization_id, request.node_id
        );
        self.client.patch(&path, request).await
    }

    async fn list_nodes(&self, cluster: &ClusterRef) -> ControlResult<Vec<NodeRecord>> {
        let path = format!("{}/nodes", Self::cluster_path(cluster));
        self.client.get(&path).await
    }

    async fn remove_nodes(&self, request: &RemoveNodesRequest) -> ControlResult<()> {
        let path = format!("/organizations/{}/nodes", request.organization_id);
        self.client.delete(&path, Some(request)).await
    }
}
