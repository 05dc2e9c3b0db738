//! HTTP client for the installer service.

use async_trait::async_trait;

use crate::client::ServiceClient;
use crate::config::EndpointConfig;
use crate::error::ControlResult;
use crate::operation::OperationResponse;
use crate::requests::{InstallRequest, UninstallClusterRequest};
use crate::types::RequestId;

use super::Installer;

/// Installer backed by the remote installer service.
#[derive(Debug, Clone)]
pub struct HttpInstaller {
    client: ServiceClient,
}

impl HttpInstaller {
    /// Create an installer client from configuration.
    pub fn new(config: &EndpointConfig) -> ControlResult<Self> {
        Ok(Self {
            client: ServiceClient::new("installer", config)?,
        })
    }
}

#[async_trait]
impl Installer for HttpInstaller {
    async fn install_cluster(&self, request: &InstallRequest) -> ControlResult<OperationResponse> {
        self.client.post("/install", request).await
    }

    async fn uninstall_cluster(
        &self,
        request: &UninstallClusterRequest,
    ) -> ControlResult<OperationResponse> {
        self.client.post("/uninstall", request).await
    }

    async fn check_progress(&self, request_id: &RequestId) -> ControlResult<OperationResponse> {
        self.client.get(&format!("/operations/{request_id}")).await
    }
}
