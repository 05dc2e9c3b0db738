//! Live cluster discovery.
//!
//! Discovery reads the topology of a running Kubernetes cluster from its
//! kubeconfig: API server hostname, Kubernetes version and the nodes with
//! their addresses and labels.

mod kubernetes;

pub use kubernetes::KubeDiscovery;

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ControlError, ControlResult};
use crate::types::{Labels, RequestId};

/// A node found in a live cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredNode {
    /// Internal network address.
    pub ip: String,
    /// Node labels.
    pub labels: Labels,
}

/// Topology of a live cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredCluster {
    /// Name taken from the kubeconfig context.
    pub name: String,
    /// Public ingress hostname supplied by the caller.
    pub hostname: String,
    /// Kubernetes API hostname.
    pub control_plane_hostname: String,
    /// Kubernetes version reported by the API server.
    pub kubernetes_version: String,
    /// Cluster nodes.
    pub nodes: Vec<DiscoveredNode>,
}

/// Trait for cluster discovery implementations.
#[async_trait]
pub trait ClusterDiscovery: Send + Sync {
    /// Inspect the cluster reachable with the given kubeconfig.
    async fn discover(
        &self,
        request_id: &RequestId,
        kube_config_raw: &str,
        hostname: &str,
    ) -> ControlResult<DiscoveredCluster>;
}

/// Discovery returning a fixed topology, for testing.
#[derive(Debug)]
pub struct StaticDiscovery {
    cluster: RwLock<DiscoveredCluster>,
    failing: RwLock<bool>,
    delay: RwLock<Duration>,
    calls: RwLock<Vec<RequestId>>,
}

impl StaticDiscovery {
    /// Discovery that always reports `cluster`.
    #[must_use]
    pub fn new(cluster: DiscoveredCluster) -> Self {
        Self {
            cluster: RwLock::new(cluster),
            failing: RwLock::new(false),
            delay: RwLock::default(),
            calls: RwLock::default(),
        }
    }

    /// Discovery reporting a cluster with one node per address.
    #[must_use]
    pub fn with_nodes(ips: &[&str]) -> Self {
        Self::new(DiscoveredCluster {
            name: "discovered".to_owned(),
            control_plane_hostname: "api.cluster.stratus.local".to_owned(),
            kubernetes_version: "v1.30.2".to_owned(),
            nodes: ips
                .iter()
                .map(|ip| DiscoveredNode {
                    ip: (*ip).to_owned(),
                    labels: Labels::from([("kubernetes.io/os".to_owned(), "linux".to_owned())]),
                })
                .collect(),
            ..DiscoveredCluster::default()
        })
    }

    /// Make discovery fail.
    pub fn set_failing(&self, failing: bool) -> ControlResult<()> {
        *self
            .failing
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))? = failing;
        Ok(())
    }

    /// Make each discovery take `delay` before answering.
    pub fn set_delay(&self, delay: Duration) -> ControlResult<()> {
        *self
            .delay
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))? = delay;
        Ok(())
    }

    /// Request ids discovery ran for.
    pub fn calls(&self) -> ControlResult<Vec<RequestId>> {
        self.calls
            .read()
            .map(|c| c.clone())
            .map_err(|_| ControlError::internal("lock poisoned"))
    }
}

#[async_trait]
impl ClusterDiscovery for StaticDiscovery {
    async fn discover(
        &self,
        request_id: &RequestId,
        _kube_config_raw: &str,
        hostname: &str,
    ) -> ControlResult<DiscoveredCluster> {
        self.calls
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))?
            .push(request_id.clone());
        let delay = *self
            .delay
            .read()
            .map_err(|_| ControlError::internal("lock poisoned"))?;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if *self
            .failing
            .read()
            .map_err(|_| ControlError::internal("lock poisoned"))?
        {
            return Err(ControlError::discovery("cluster unreachable"));
        }
        let mut cluster = self
            .cluster
            .read()
            .map_err(|_| ControlError::internal("lock poisoned"))?
            .clone();
        cluster.hostname = hostname.to_owned();
        Ok(cluster)
    }
}
