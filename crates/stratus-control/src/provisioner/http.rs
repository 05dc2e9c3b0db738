//! HTTP client for the provisioner service.

use async_trait::async_trait;

use crate::client::ServiceClient;
use crate::config::EndpointConfig;
use crate::error::ControlResult;
use crate::operation::{KubeConfigResponse, OperationResponse, ProvisionResponse};
use crate::requests::{DecommissionClusterRequest, ProvisionClusterRequest, ScaleClusterRequest};
use crate::types::RequestId;

use super::Provisioner;

/// Provisioner backed by the remote provisioner service.
#[derive(Debug, Clone)]
pub struct HttpProvisioner {
    client: ServiceClient,
}

impl HttpProvisioner {
    /// Create a provisioner client from configuration.
    pub fn new(config: &EndpointConfig) -> ControlResult<Self> {
        Ok(Self {
            client: ServiceClient::new("provisioner", config)?,
        })
    }
}

#[async_trait]
impl Provisioner for HttpProvisioner {
    async fn provision_cluster(
        &self,
        request: &ProvisionClusterRequest,
    ) -> ControlResult<ProvisionResponse> {
        self.client.post("/provision", request).await
    }

    async fn check_provision_progress(
        &self,
        request_id: &RequestId,
    ) -> ControlResult<ProvisionResponse> {
        self.client.get(&format!("/provision/{request_id}")).await
    }

    async fn scale_cluster(
        &self,
        request: &ScaleClusterRequest,
    ) -> ControlResult<OperationResponse> {
        self.client.post("/scale", request).await
    }

    async fn check_scale_progress(
        &self,
        request_id: &RequestId,
    ) -> ControlResult<OperationResponse> {
        self.client.get(&format!("/scale/{request_id}")).await
    }

    async fn decommission_cluster(
        &self,
        request: &DecommissionClusterRequest,
    ) -> ControlResult<OperationResponse> {
        self.client.post("/decommission", request).await
    }

    async fn check_decommission_progress(
        &self,
        request_id: &RequestId,
    ) -> ControlResult<OperationResponse> {
        self.client.get(&format!("/decommission/{request_id}")).await
    }

    async fn get_kube_config(
        &self,
        request: &DecommissionClusterRequest,
    ) -> ControlResult<KubeConfigResponse> {
        self.client.post("/management/kubeconfig", request).await
    }
}
