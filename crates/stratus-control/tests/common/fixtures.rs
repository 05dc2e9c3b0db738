//! Test fixtures for control plane integration tests.

use stratus_control::{
    registry::{
        AddClusterRequest, AddNodeRequest, AttachNodeRequest, ClusterRegistry, MemoryRegistry,
        NodeRegistry,
    },
    requests::{
        ClusterRef, DecommissionClusterRequest, InstallRequest, ProvisionClusterRequest,
        ScaleClusterRequest, UninstallClusterRequest,
    },
    types::{ClusterState, ClusterStatus, OrganizationId, Platform, RequestId},
};

/// Organization used by every fixture.
pub fn org() -> OrganizationId {
    OrganizationId::new("org-1")
}

/// A valid bare-metal provision request.
pub fn provision_request() -> ProvisionClusterRequest {
    ProvisionClusterRequest {
        organization_id: org(),
        cluster_name: "edge".to_owned(),
        kubernetes_version: "1.30".to_owned(),
        num_nodes: 3,
        node_type: "standard-4".to_owned(),
        zone: "eu-west-1".to_owned(),
        target_platform: Platform::BareMetal,
        ..ProvisionClusterRequest::default()
    }
}

/// An install of a cluster that is not registered yet.
pub fn kube_config_install() -> InstallRequest {
    InstallRequest {
        organization_id: org(),
        kube_config_raw: Some("apiVersion: v1\nkind: Config\n".to_owned()),
        hostname: "adopted.stratus.local".to_owned(),
        target_platform: Platform::BareMetal,
        ..InstallRequest::default()
    }
}

/// An install of a registered cluster.
pub fn existing_cluster_install(cluster: &ClusterRef) -> InstallRequest {
    InstallRequest {
        cluster_id: Some(cluster.cluster_id.clone()),
        ..kube_config_install()
    }
}

/// A request to scale `cluster` to `num_nodes`.
pub fn scale_request(cluster: &ClusterRef, num_nodes: u32) -> ScaleClusterRequest {
    ScaleClusterRequest {
        organization_id: cluster.organization_id.clone(),
        cluster_id: cluster.cluster_id.clone(),
        num_nodes,
        target_platform: Platform::BareMetal,
        ..ScaleClusterRequest::default()
    }
}

/// A request to uninstall the platform from `cluster`.
pub fn uninstall_request(cluster: &ClusterRef) -> UninstallClusterRequest {
    UninstallClusterRequest {
        organization_id: cluster.organization_id.clone(),
        cluster_id: cluster.cluster_id.clone(),
        kube_config_raw: "apiVersion: v1\nkind: Config\n".to_owned(),
        target_platform: Platform::BareMetal,
        ..UninstallClusterRequest::default()
    }
}

/// A request to decommission `cluster`.
pub fn decommission_request(cluster: &ClusterRef) -> DecommissionClusterRequest {
    DecommissionClusterRequest {
        organization_id: cluster.organization_id.clone(),
        cluster_id: cluster.cluster_id.clone(),
        target_platform: Platform::BareMetal,
        ..DecommissionClusterRequest::default()
    }
}

/// Builder for clusters registered directly in the registry.
pub struct ClusterBuilder {
    name: String,
    state: ClusterState,
    status: ClusterStatus,
    nodes: Vec<String>,
}

impl ClusterBuilder {
    /// Creates a builder for a cluster in `state`.
    pub fn new(state: ClusterState) -> Self {
        Self {
            name: "edge".to_owned(),
            state,
            status: ClusterStatus::Online,
            nodes: vec![],
        }
    }

    /// Sets the connectivity status.
    pub fn with_status(mut self, status: ClusterStatus) -> Self {
        self.status = status;
        self
    }

    /// Online and cordoned, as uninstall requires.
    pub fn cordoned(self) -> Self {
        self.with_status(ClusterStatus::OnlineCordon)
    }

    /// Attaches a node with the given address.
    pub fn with_node(mut self, ip: &str) -> Self {
        self.nodes.push(ip.to_owned());
        self
    }

    /// Registers the cluster and its nodes.
    pub async fn create(self, registry: &MemoryRegistry) -> ClusterRef {
        let request_id = RequestId::generate();
        let record = registry
            .add_cluster(&AddClusterRequest {
                request_id: request_id.clone(),
                organization_id: org(),
                name: self.name,
                platform: Platform::BareMetal,
                state: Some(self.state),
                ..AddClusterRequest::default()
            })
            .await
            .unwrap();
        let cluster = ClusterRef::new(record.organization_id, record.cluster_id);
        registry.set_status(&cluster, self.status).unwrap();

        for ip in self.nodes {
            let node = registry
                .add_node(&AddNodeRequest {
                    request_id: request_id.clone(),
                    organization_id: org(),
                    ip,
                    ..AddNodeRequest::default()
                })
                .await
                .unwrap();
            registry
                .attach_node(&AttachNodeRequest {
                    request_id: request_id.clone(),
                    organization_id: org(),
                    cluster_id: cluster.cluster_id.clone(),
                    node_id: node.node_id,
                })
                .await
                .unwrap();
        }
        cluster
    }
}
