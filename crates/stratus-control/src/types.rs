//! Core types for stratus-control.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing identifier.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the ID as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Whether the identifier is unset.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Tenant that owns clusters and nodes.
    OrganizationId
);
string_id!(
    /// Cluster identifier, assigned by the registry.
    ClusterId
);
string_id!(
    /// Node identifier, assigned by the registry.
    NodeId
);
string_id!(
    /// Correlates an initiating request with its remote operation.
    RequestId
);

impl RequestId {
    /// Generate a new unique request ID using ULID.
    #[must_use]
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string().to_lowercase())
    }
}

/// Position of a cluster in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterState {
    /// Infrastructure is being created.
    Provisioning,
    /// Infrastructure exists, platform not installed.
    Provisioned,
    /// Platform installation running.
    InstallInProgress,
    /// Platform installed and usable.
    Installed,
    /// Node count is being changed.
    Scaling,
    /// Platform removal running.
    Uninstalling,
    /// A phase failed. Terminal for the orchestrator.
    Failure,
}

impl ClusterState {
    /// Get the state name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Provisioning => "PROVISIONING",
            Self::Provisioned => "PROVISIONED",
            Self::InstallInProgress => "INSTALL_IN_PROGRESS",
            Self::Installed => "INSTALLED",
            Self::Scaling => "SCALING",
            Self::Uninstalling => "UNINSTALLING",
            Self::Failure => "FAILURE",
        }
    }
}

impl fmt::Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ClusterState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PROVISIONING" => Ok(Self::Provisioning),
            "PROVISIONED" => Ok(Self::Provisioned),
            "INSTALL_IN_PROGRESS" => Ok(Self::InstallInProgress),
            "INSTALLED" => Ok(Self::Installed),
            "SCALING" => Ok(Self::Scaling),
            "UNINSTALLING" => Ok(Self::Uninstalling),
            "FAILURE" => Ok(Self::Failure),
            _ => Err(format!("unknown cluster state: {s}")),
        }
    }
}

/// Connectivity status, owned by the connectivity subsystem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterStatus {
    /// Reachable and schedulable.
    Online,
    /// Reachable, closed to new workloads.
    OnlineCordon,
    /// Unreachable.
    #[default]
    Offline,
    /// Unreachable and closed to new workloads.
    OfflineCordon,
}

impl ClusterStatus {
    /// Whether the cluster is closed to new workloads.
    #[must_use]
    pub const fn is_cordoned(&self) -> bool {
        matches!(self, Self::OnlineCordon | Self::OfflineCordon)
    }
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Online => "ONLINE",
            Self::OnlineCordon => "ONLINE_CORDON",
            Self::Offline => "OFFLINE",
            Self::OfflineCordon => "OFFLINE_CORDON",
        })
    }
}

/// Kind of cluster being managed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterType {
    /// Kubernetes cluster.
    #[default]
    Kubernetes,
    /// Standalone docker node.
    DockerNode,
}

/// Infrastructure platform a cluster runs on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Platform {
    /// Microsoft Azure.
    Azure,
    /// Customer-managed hardware.
    #[default]
    BareMetal,
    /// Local development cluster.
    Minikube,
}

impl Platform {
    /// Whether requests targeting this platform carry Azure credentials.
    #[must_use]
    pub const fn requires_azure(&self) -> bool {
        matches!(self, Self::Azure)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Azure => "AZURE",
            Self::BareMetal => "BARE_METAL",
            Self::Minikube => "MINIKUBE",
        })
    }
}

/// Service principal used against the Azure API.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AzureCredentials {
    /// Application (client) id.
    pub client_id: String,
    /// Client secret.
    pub client_secret: String,
    /// Tenant id.
    pub tenant_id: String,
    /// Subscription id.
    pub subscription_id: String,
}

impl fmt::Debug for AzureCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("tenant_id", &self.tenant_id)
            .field("subscription_id", &self.subscription_id)
            .finish()
    }
}

/// Azure placement options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AzureOptions {
    /// Resource group holding the cluster resources.
    pub resource_group: String,
    /// Azure region.
    #[serde(default)]
    pub location: String,
    /// DNS zone used for the cluster hostnames.
    #[serde(default)]
    pub dns_zone_name: String,
}

/// Label set attached to clusters and nodes.
pub type Labels = HashMap<String, String>;

/// A cluster as held by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRecord {
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Registry-assigned identifier.
    pub cluster_id: ClusterId,
    /// Display name.
    pub name: String,
    /// Kind of cluster.
    #[serde(default)]
    pub cluster_type: ClusterType,
    /// Platform the cluster runs on.
    #[serde(default)]
    pub platform: Platform,
    /// Public ingress hostname.
    #[serde(default)]
    pub hostname: String,
    /// Kubernetes API hostname.
    #[serde(default)]
    pub control_plane_hostname: String,
    /// Kubernetes version reported at discovery.
    #[serde(default)]
    pub kubernetes_version: String,
    /// Scheduling labels.
    #[serde(default)]
    pub labels: Labels,
    /// Lifecycle state.
    pub state: ClusterState,
    /// Connectivity status.
    #[serde(default)]
    pub status: ClusterStatus,
    /// When the registry created the record.
    pub created_at: DateTime<Utc>,
}

/// Operational status of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    /// Node is reachable.
    Online,
    /// Node is unreachable.
    #[default]
    Offline,
}

/// Lifecycle state of a node, mirrored from the last operation outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeState {
    /// Known but not attached to a cluster.
    #[default]
    Unregistered,
    /// Attached to a cluster, platform not installed.
    Assigned,
    /// Platform installation running on the node.
    InstallInProgress,
    /// Platform installed on the node.
    Installed,
    /// Last operation on the node failed.
    Failure,
}

/// A node as held by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Registry-assigned identifier.
    pub node_id: NodeId,
    /// Owning cluster, set only by attach.
    #[serde(default)]
    pub cluster_id: Option<ClusterId>,
    /// Network address.
    pub ip: String,
    /// Scheduling labels.
    #[serde(default)]
    pub labels: Labels,
    /// Operational status.
    #[serde(default)]
    pub status: NodeStatus,
    /// Lifecycle state.
    #[serde(default)]
    pub state: NodeState,
}
