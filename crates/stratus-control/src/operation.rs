//! Handles for long-running remote operations.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::requests::StaticIpAddresses;
use crate::types::{ClusterId, OrganizationId, RequestId};

/// Progress of a remote operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationProgress {
    /// Accepted, not started.
    #[default]
    Queued,
    /// Running.
    InProgress,
    /// Finished successfully.
    Succeeded,
    /// Finished with an error.
    Failed,
}

impl OperationProgress {
    /// Whether the operation has finished.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for OperationProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Queued => "QUEUED",
            Self::InProgress => "IN_PROGRESS",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
        })
    }
}

/// Correlates an initiating request with its remote operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResponse {
    /// Request the operation belongs to.
    pub request_id: RequestId,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Target cluster.
    pub cluster_id: ClusterId,
    /// Last known progress.
    pub progress: OperationProgress,
    /// Error reported by the remote service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OperationResponse {
    /// Response for a freshly accepted operation.
    #[must_use]
    pub fn queued(
        request_id: RequestId,
        organization_id: OrganizationId,
        cluster_id: ClusterId,
    ) -> Self {
        Self {
            request_id,
            organization_id,
            cluster_id,
            progress: OperationProgress::Queued,
            error: None,
        }
    }

    /// Copy with a different progress.
    #[must_use]
    pub fn with_progress(mut self, progress: OperationProgress) -> Self {
        self.progress = progress;
        self
    }

    /// Copy with an error, marking the operation failed.
    #[must_use]
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.progress = OperationProgress::Failed;
        self.error = Some(error.into());
        self
    }
}

/// Provisioner reply, with the access material of the new cluster once done.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionResponse {
    /// Operation handle.
    #[serde(flatten)]
    pub operation: OperationResponse,
    /// Kubeconfig of the new cluster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_kube_config: Option<String>,
    /// Public ingress hostname.
    #[serde(default)]
    pub hostname: String,
    /// Addresses reserved for platform services.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_ip_addresses: Option<StaticIpAddresses>,
}

impl From<OperationResponse> for ProvisionResponse {
    fn from(operation: OperationResponse) -> Self {
        Self {
            operation,
            ..Self::default()
        }
    }
}

/// Kubeconfig returned by the provisioner's management interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubeConfigResponse {
    /// Raw kubeconfig.
    pub raw_kube_config: String,
}

/// A response that can be watched by an operation monitor.
pub trait OperationOutcome: fmt::Debug + Clone + Send + Sync + 'static {
    /// The operation handle inside the response.
    fn operation(&self) -> &OperationResponse;
}

impl OperationOutcome for OperationResponse {
    fn operation(&self) -> &OperationResponse {
        self
    }
}

impl OperationOutcome for ProvisionResponse {
    fn operation(&self) -> &OperationResponse {
        &self.operation
    }
}
