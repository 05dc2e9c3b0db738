//! Application inventory.
//!
//! The inventory tracks application instances deployed on clusters. The
//! orchestrator only reads it, to refuse uninstalling a cluster that still
//! hosts workloads.

mod http;

pub use http::HttpInventory;

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ControlError, ControlResult};
use crate::types::{ClusterId, OrganizationId};

/// A running service of an application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceInstance {
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Cluster the service runs on.
    pub deployed_on_cluster_id: ClusterId,
}

/// A group of services deployed together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceGroupInstance {
    /// Services of the group.
    pub service_instances: Vec<ServiceInstance>,
}

/// An application instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppInstance {
    /// Service groups of the application.
    pub groups: Vec<ServiceGroupInstance>,
}

impl AppInstance {
    /// Whether any service of this application runs on the cluster.
    #[must_use]
    pub fn runs_on(&self, organization_id: &OrganizationId, cluster_id: &ClusterId) -> bool {
        self.groups
            .iter()
            .flat_map(|g| &g.service_instances)
            .any(|s| {
                &s.organization_id == organization_id && &s.deployed_on_cluster_id == cluster_id
            })
    }
}

/// Read access to the application inventory.
#[async_trait]
pub trait AppInventory: Send + Sync {
    /// List the application instances of an organization.
    async fn list_app_instances(
        &self,
        organization_id: &OrganizationId,
    ) -> ControlResult<Vec<AppInstance>>;
}

/// In-memory inventory for testing.
#[derive(Debug, Default)]
pub struct MemoryInventory {
    apps: RwLock<HashMap<OrganizationId, Vec<AppInstance>>>,
    unavailable: RwLock<bool>,
}

impl MemoryInventory {
    /// Create an empty inventory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a single-service application running on a cluster.
    pub fn deploy(
        &self,
        organization_id: &OrganizationId,
        cluster_id: &ClusterId,
    ) -> ControlResult<()> {
        let app = AppInstance {
            groups: vec![ServiceGroupInstance {
                service_instances: vec![ServiceInstance {
                    organization_id: organization_id.clone(),
                    deployed_on_cluster_id: cluster_id.clone(),
                }],
            }],
        };
        self.apps
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))?
            .entry(organization_id.clone())
            .or_default()
            .push(app);
        Ok(())
    }

    /// Make every listing fail.
    pub fn set_unavailable(&self, unavailable: bool) -> ControlResult<()> {
        *self
            .unavailable
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))? = unavailable;
        Ok(())
    }
}

#[async_trait]
impl AppInventory for MemoryInventory {
    async fn list_app_instances(
        &self,
        organization_id: &OrganizationId,
    ) -> ControlResult<Vec<AppInstance>> {
        if *self
            .unavailable
            .read()
            .map_err(|_| ControlError::internal("lock poisoned"))?
        {
            return Err(ControlError::upstream("inventory", "unavailable"));
        }
        let apps = self
            .apps
            .read()
            .map_err(|_| ControlError::internal("lock poisoned"))?;
        Ok(apps.get(organization_id).cloned().unwrap_or_default())
    }
}
