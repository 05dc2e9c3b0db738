//! HTTP client for the application inventory.

use async_trait::async_trait;

use crate::client::ServiceClient;
use crate::config::EndpointConfig;
use crate::error::ControlResult;
use crate::types::OrganizationId;

use super::{AppInstance, AppInventory};

/// Inventory backed by the remote application inventory service.
#[derive(Debug, Clone)]
pub struct HttpInventory {
    client: ServiceClient,
}

impl HttpInventory {
    /// Create an inventory client from configuration.
    pub fn new(config: &EndpointConfig) -> ControlResult<Self> {
        Ok(Self {
            client: ServiceClient::new("inventory", config)?,
        })
    }
}

#[async_trait]
impl AppInventory for HttpInventory {
    async fn list_app_instances(
        &self,
        organization_id: &OrganizationId,
    ) -> ControlResult<Vec<AppInstance>> {
        self.client
            .get(&format!("/organizations/{organization_id}/apps"))
            .await
    }
}
