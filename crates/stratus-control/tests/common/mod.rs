//! Common test utilities for control plane integration tests.

#![allow(dead_code)]

pub mod fixtures;

use std::sync::Arc;
use std::time::Duration;

use stratus_control::{
    api::AppState,
    bus::MemoryEventBus,
    cluster::{ClusterManager, Collaborators},
    config::{MonitorConfig, TimeoutConfig},
    discovery::StaticDiscovery,
    installer::MockInstaller,
    inventory::MemoryInventory,
    monitor::{MonitorSettings, MonitorSupervisor},
    provisioner::MockProvisioner,
    registry::MemoryRegistry,
    types::{ClusterId, ClusterState},
};

/// Addresses of the nodes reported by the default discovery.
pub const DISCOVERED_NODES: [&str; 3] = ["10.0.0.1", "10.0.0.2", "10.0.0.3"];

/// Complete test control plane with in-memory collaborators wired together.
pub struct TestControlPlane {
    pub registry: Arc<MemoryRegistry>,
    pub installer: Arc<MockInstaller>,
    pub provisioner: Arc<MockProvisioner>,
    pub inventory: Arc<MemoryInventory>,
    pub bus: Arc<MemoryEventBus>,
    pub discovery: Arc<StaticDiscovery>,
    pub manager: ClusterManager,
}

impl TestControlPlane {
    /// Creates a control plane whose discovery reports [`DISCOVERED_NODES`].
    pub fn new() -> Self {
        Self::with_discovery(StaticDiscovery::with_nodes(&DISCOVERED_NODES))
    }

    /// Creates a control plane with a custom discovery.
    pub fn with_discovery(discovery: StaticDiscovery) -> Self {
        let registry = Arc::new(MemoryRegistry::new());
        let installer = Arc::new(MockInstaller::new());
        let provisioner = Arc::new(MockProvisioner::new());
        let inventory = Arc::new(MemoryInventory::new());
        let bus = Arc::new(MemoryEventBus::new());
        let discovery = Arc::new(discovery);

        let deps = Collaborators {
            clusters: registry.clone(),
            nodes: registry.clone(),
            installer: installer.clone(),
            provisioner: provisioner.clone(),
            inventory: inventory.clone(),
            bus: bus.clone(),
            discovery: discovery.clone(),
        };

        // Fast polling keeps monitors short-lived.
        let monitor = MonitorConfig {
            poll_interval_ms: 5,
            ..MonitorConfig::default()
        };
        let manager = ClusterManager::new(
            deps,
            MonitorSupervisor::new(&monitor),
            TimeoutConfig::default(),
            MonitorSettings::from(&monitor),
        );

        Self {
            registry,
            installer,
            provisioner,
            inventory,
            bus,
            discovery,
            manager,
        }
    }

    /// Waits until every monitor, including chained follow-ups, has finished.
    pub async fn settle(&self) {
        self.manager.supervisor().wait_idle().await;
    }

    /// Polls until `ready` holds, failing the test after five seconds.
    pub async fn wait_for(&self, mut ready: impl FnMut(&Self) -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !ready(self) {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    /// State history written for a cluster.
    pub fn history(&self, cluster_id: &ClusterId) -> Vec<ClusterState> {
        self.registry.state_history(cluster_id).unwrap()
    }

    /// API state sharing this control plane's orchestrator.
    pub fn app_state(&self) -> AppState {
        AppState {
            manager: self.manager.clone(),
        }
    }
}

impl Default for TestControlPlane {
    fn default() -> Self {
        Self::new()
    }
}
