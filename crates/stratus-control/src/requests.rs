//! Inbound orchestration requests.
//!
//! Every request that starts a remote operation carries an optional
//! `request_id`. Callers must leave it unset: the orchestrator assigns it
//! exactly once before the initiating call.

use serde::{Deserialize, Serialize};

use crate::types::{
    AzureCredentials, AzureOptions, ClusterId, ClusterType, OrganizationId, Platform, RequestId,
};

/// Request to create infrastructure for a new cluster and install it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionClusterRequest {
    /// Assigned by the orchestrator.
    pub request_id: Option<RequestId>,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Assigned by the registry when the placeholder is created.
    pub cluster_id: Option<ClusterId>,
    /// Display name of the new cluster.
    pub cluster_name: String,
    /// Kubernetes version to provision.
    pub kubernetes_version: String,
    /// Number of worker nodes.
    pub num_nodes: u32,
    /// Provider-specific machine type.
    pub node_type: String,
    /// Provider zone or region.
    pub zone: String,
    /// Management clusters are provisioned out of band.
    pub is_management_cluster: bool,
    /// Target infrastructure.
    pub target_platform: Platform,
    /// Required when the platform is Azure.
    pub azure_credentials: Option<AzureCredentials>,
    /// Required when the platform is Azure.
    pub azure_options: Option<AzureOptions>,
}

/// Addresses reserved by the provisioner for platform services.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticIpAddresses {
    /// Ingress controller address.
    pub ingress: String,
    /// DNS server address.
    pub dns: String,
    /// Cluster API address.
    pub cluster_api: String,
}

/// Request to install the platform on a cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallRequest {
    /// Assigned by the orchestrator.
    pub request_id: Option<RequestId>,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// References an existing cluster. Absent to adopt a discovered one.
    pub cluster_id: Option<ClusterId>,
    /// Kind of cluster.
    pub cluster_type: ClusterType,
    /// Install the base operating system first.
    pub install_base_system: bool,
    /// Raw kubeconfig giving access to the cluster.
    pub kube_config_raw: Option<String>,
    /// Public ingress hostname.
    pub hostname: String,
    /// SSH user for node access.
    pub username: Option<String>,
    /// SSH private key for node access.
    pub private_key: Option<String>,
    /// Node addresses reachable over SSH.
    pub nodes: Vec<String>,
    /// Target infrastructure.
    pub target_platform: Platform,
    /// Addresses reserved by the provisioner.
    pub static_ip_addresses: Option<StaticIpAddresses>,
}

impl InstallRequest {
    /// Whether SSH credentials were supplied.
    #[must_use]
    pub fn uses_ssh(&self) -> bool {
        self.username.as_deref().is_some_and(|u| !u.is_empty())
    }

    /// Whether a kubeconfig was supplied.
    #[must_use]
    pub fn uses_kube_config(&self) -> bool {
        self.kube_config_raw.as_deref().is_some_and(|k| !k.is_empty())
    }
}

/// Request to change the node count of an installed cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleClusterRequest {
    /// Assigned by the orchestrator.
    pub request_id: Option<RequestId>,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Cluster to scale.
    pub cluster_id: ClusterId,
    /// Kind of cluster.
    pub cluster_type: ClusterType,
    /// Desired number of worker nodes.
    pub num_nodes: u32,
    /// Management clusters cannot be scaled here.
    pub is_management_cluster: bool,
    /// Target infrastructure.
    pub target_platform: Platform,
    /// Required when the platform is Azure.
    pub azure_credentials: Option<AzureCredentials>,
    /// Required when the platform is Azure.
    pub azure_options: Option<AzureOptions>,
}

/// Request to remove the platform from a cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UninstallClusterRequest {
    /// Assigned by the orchestrator.
    pub request_id: Option<RequestId>,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Cluster to uninstall.
    pub cluster_id: ClusterId,
    /// Kind of cluster.
    pub cluster_type: ClusterType,
    /// Raw kubeconfig giving access to the cluster.
    pub kube_config_raw: String,
    /// Target infrastructure.
    pub target_platform: Platform,
}

/// Request to release the provisioned resources of a cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecommissionClusterRequest {
    /// Assigned by the orchestrator.
    pub request_id: Option<RequestId>,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Cluster to decommission.
    pub cluster_id: ClusterId,
    /// Kind of cluster.
    pub cluster_type: ClusterType,
    /// Management clusters cannot be decommissioned here.
    pub is_management_cluster: bool,
    /// Target infrastructure.
    pub target_platform: Platform,
    /// Required when the platform is Azure.
    pub azure_credentials: Option<AzureCredentials>,
    /// Required when the platform is Azure.
    pub azure_options: Option<AzureOptions>,
}

/// Identifies one cluster of an organization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterRef {
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Cluster identifier.
    pub cluster_id: ClusterId,
}

impl ClusterRef {
    /// Build a reference from its parts.
    #[must_use]
    pub fn new(organization_id: OrganizationId, cluster_id: ClusterId) -> Self {
        Self {
            organization_id,
            cluster_id,
        }
    }
}
