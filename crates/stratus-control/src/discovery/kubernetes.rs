//! Discovery against a live Kubernetes API server.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use kube::api::ListParams;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::config::DiscoveryConfig;
use crate::error::{ControlError, ControlResult};
use crate::types::{Labels, RequestId};

use super::{ClusterDiscovery, DiscoveredCluster, DiscoveredNode};

const INTERNAL_IP: &str = "InternalIP";

/// Discovery through kube-rs.
///
/// The raw kubeconfig is staged in a uniquely named file under the configured
/// directory for the duration of one discovery pass.
#[derive(Debug, Clone)]
pub struct KubeDiscovery {
    temp_dir: PathBuf,
    timeout: Duration,
}

impl KubeDiscovery {
    /// Create discovery from configuration.
    #[must_use]
    pub fn new(config: &DiscoveryConfig) -> Self {
        Self {
            temp_dir: config.temp_dir.clone(),
            timeout: config.timeout(),
        }
    }
}

/// Write kubeconfig material to a temporary file prefixed with the request id.
///
/// The file is removed when the returned handle is dropped.
pub(crate) fn stage_kube_config(
    dir: &Path,
    request_id: &RequestId,
    kube_config_raw: &str,
) -> ControlResult<NamedTempFile> {
    let mut staged = tempfile::Builder::new()
        .prefix(request_id.as_str())
        .suffix(".kubeconfig")
        .tempfile_in(dir)?;
    staged.write_all(kube_config_raw.as_bytes())?;
    staged.flush()?;
    Ok(staged)
}

async fn inspect(path: &Path) -> ControlResult<DiscoveredCluster> {
    let kubeconfig = Kubeconfig::read_from(path)
        .map_err(|e| ControlError::discovery(format!("failed to read kubeconfig: {e}")))?;
    let name = kubeconfig.current_context.clone().unwrap_or_default();
    let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| ControlError::discovery(format!("failed to load kubeconfig: {e}")))?;
    let control_plane_hostname = config.cluster_url.host().unwrap_or_default().to_owned();
    let client = Client::try_from(config)
        .map_err(|e| ControlError::discovery(format!("failed to create client: {e}")))?;

    let version = client
        .apiserver_version()
        .await
        .map_err(|e| ControlError::discovery(format!("failed to read server version: {e}")))?;

    let api: Api<Node> = Api::all(client);
    let listed = api
        .list(&ListParams::default())
        .await
        .map_err(|e| ControlError::discovery(format!("failed to list nodes: {e}")))?;

    let nodes = listed.items.into_iter().filter_map(discovered_node).collect();

    Ok(DiscoveredCluster {
        name,
        hostname: String::new(),
        control_plane_hostname,
        kubernetes_version: version.git_version,
        nodes,
    })
}

fn discovered_node(node: Node) -> Option<DiscoveredNode> {
    let ip = node
        .status?
        .addresses?
        .into_iter()
        .find(|a| a.type_ == INTERNAL_IP)?
        .address;
    let labels: Labels = node.metadata.labels.unwrap_or_default().into_iter().collect();
    Some(DiscoveredNode { ip, labels })
}

#[async_trait]
impl ClusterDiscovery for KubeDiscovery {
    async fn discover(
        &self,
        request_id: &RequestId,
        kube_config_raw: &str,
        hostname: &str,
    ) -> ControlResult<DiscoveredCluster> {
        let staged = stage_kube_config(&self.temp_dir, request_id, kube_config_raw)?;
        let inspected = tokio::time::timeout(self.timeout, inspect(staged.path()))
            .await
            .map_err(|_| ControlError::Timeout {
                operation: "discovery",
                after: self.timeout,
            })?;
        drop(staged);

        let mut cluster = inspected?;
        cluster.hostname = hostname.to_owned();
        debug!(
            %request_id,
            kubernetes_version = %cluster.kubernetes_version,
            num_nodes = cluster.nodes.len(),
            control_plane_hostname = %cluster.control_plane_hostname,
            hostname = %cluster.hostname,
            "Cluster discovered"
        );
        Ok(cluster)
    }
}
