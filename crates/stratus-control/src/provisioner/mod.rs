//! Infrastructure provisioner.
//!
//! The provisioner creates, scales and releases the infrastructure clusters
//! run on, and its management interface hands out the kubeconfig of clusters
//! it created. Each mutating call starts a long-running operation; the
//! `*Progress` adapters let an operation monitor poll them.

mod http;

pub use http::HttpProvisioner;

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::{ControlError, ControlResult};
use crate::mock::OperationScript;
use crate::monitor::ProgressSource;
use crate::operation::{KubeConfigResponse, OperationProgress, OperationResponse, ProvisionResponse};
use crate::requests::{
    DecommissionClusterRequest, ProvisionClusterRequest, ScaleClusterRequest, StaticIpAddresses,
};
use crate::types::{ClusterId, OrganizationId, RequestId};

/// Trait for infrastructure provisioner implementations.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Start creating infrastructure for a cluster.
    async fn provision_cluster(
        &self,
        request: &ProvisionClusterRequest,
    ) -> ControlResult<ProvisionResponse>;

    /// Current status of a provision operation.
    ///
    /// Once finished successfully the response carries the kubeconfig and
    /// hostname of the new cluster.
    async fn check_provision_progress(
        &self,
        request_id: &RequestId,
    ) -> ControlResult<ProvisionResponse>;

    /// Start changing the node count of a cluster.
    async fn scale_cluster(&self, request: &ScaleClusterRequest)
        -> ControlResult<OperationResponse>;

    /// Current status of a scale operation.
    async fn check_scale_progress(&self, request_id: &RequestId)
        -> ControlResult<OperationResponse>;

    /// Start releasing the infrastructure of a cluster.
    async fn decommission_cluster(
        &self,
        request: &DecommissionClusterRequest,
    ) -> ControlResult<OperationResponse>;

    /// Current status of a decommission operation.
    async fn check_decommission_progress(
        &self,
        request_id: &RequestId,
    ) -> ControlResult<OperationResponse>;

    /// Kubeconfig of a cluster created by the provisioner.
    async fn get_kube_config(
        &self,
        request: &DecommissionClusterRequest,
    ) -> ControlResult<KubeConfigResponse>;
}

/// Polls a provision operation.
pub struct ProvisionProgress(pub Arc<dyn Provisioner>);

#[async_trait]
impl ProgressSource<ProvisionResponse> for ProvisionProgress {
    async fn progress(&self, last: &ProvisionResponse) -> ControlResult<ProvisionResponse> {
        self.0
            .check_provision_progress(&last.operation.request_id)
            .await
    }
}

/// Polls a scale operation.
pub struct ScaleProgress(pub Arc<dyn Provisioner>);

#[async_trait]
impl ProgressSource<OperationResponse> for ScaleProgress {
    async fn progress(&self, last: &OperationResponse) -> ControlResult<OperationResponse> {
        self.0.check_scale_progress(&last.request_id).await
    }
}

/// Polls a decommission operation.
pub struct DecommissionProgress(pub Arc<dyn Provisioner>);

#[async_trait]
impl ProgressSource<OperationResponse> for DecommissionProgress {
    async fn progress(&self, last: &OperationResponse) -> ControlResult<OperationResponse> {
        self.0.check_decommission_progress(&last.request_id).await
    }
}

/// Mock provisioner for testing.
///
/// Every operation succeeds after one status poll unless configured
/// otherwise. Successful provisions report the configured kubeconfig and
/// hostname.
#[derive(Debug)]
pub struct MockProvisioner {
    provisions: OperationScript,
    scales: OperationScript,
    decommissions: OperationScript,
    access: RwLock<ClusterAccess>,
    received: RwLock<Received>,
}

#[derive(Debug, Clone)]
struct ClusterAccess {
    kube_config: Option<String>,
    hostname: String,
    static_ip_addresses: Option<StaticIpAddresses>,
}

#[derive(Debug, Default)]
struct Received {
    provisions: Vec<ProvisionClusterRequest>,
    scales: Vec<ScaleClusterRequest>,
    decommissions: Vec<DecommissionClusterRequest>,
    kube_config_requests: usize,
}

impl Default for MockProvisioner {
    fn default() -> Self {
        Self {
            provisions: OperationScript::new("provisioner"),
            scales: OperationScript::new("scaler"),
            decommissions: OperationScript::new("decommissioner"),
            access: RwLock::new(ClusterAccess {
                kube_config: Some("apiVersion: v1\nkind: Config\n".to_owned()),
                hostname: "cluster.stratus.local".to_owned(),
                static_ip_addresses: Some(StaticIpAddresses {
                    ingress: "10.0.100.1".to_owned(),
                    dns: "10.0.100.2".to_owned(),
                    cluster_api: "10.0.100.3".to_owned(),
                }),
            }),
            received: RwLock::default(),
        }
    }
}

macro_rules! script_setters {
    ($($field:ident: $outcome:ident, $reject:ident;)*) => {
        $(
            /// Terminal progress of operations of this kind started from now on.
            pub fn $outcome(&self, outcome: OperationProgress) -> ControlResult<()> {
                self.$field.set_outcome(outcome)
            }

            /// Make initiating calls of this kind fail.
            pub fn $reject(&self, reject: bool) -> ControlResult<()> {
                self.$field.set_reject(reject)
            }
        )*
    };
}

impl MockProvisioner {
    /// Create a mock whose operations succeed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    script_setters! {
        provisions: set_provision_outcome, reject_provisions;
        scales: set_scale_outcome, reject_scales;
        decommissions: set_decommission_outcome, reject_decommissions;
    }

    /// Number of polls before every kind of operation finishes.
    pub fn set_polls_until_done(&self, polls: u32) -> ControlResult<()> {
        self.provisions.set_polls_until_done(polls)?;
        self.scales.set_polls_until_done(polls)?;
        self.decommissions.set_polls_until_done(polls)
    }

    /// Kubeconfig returned by successful provisions and `get_kube_config`.
    pub fn set_kube_config(&self, kube_config: Option<String>) -> ControlResult<()> {
        self.access
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))?
            .kube_config = kube_config;
        Ok(())
    }

    /// Provision requests received.
    pub fn provisions(&self) -> ControlResult<Vec<ProvisionClusterRequest>> {
        self.read(|r| r.provisions.clone())
    }

    /// Scale requests received.
    pub fn scales(&self) -> ControlResult<Vec<ScaleClusterRequest>> {
        self.read(|r| r.scales.clone())
    }

    /// Decommission requests received.
    pub fn decommissions(&self) -> ControlResult<Vec<DecommissionClusterRequest>> {
        self.read(|r| r.decommissions.clone())
    }

    /// Number of kubeconfig lookups.
    pub fn kube_config_requests(&self) -> ControlResult<usize> {
        self.read(|r| r.kube_config_requests)
    }

    fn read<T>(&self, f: impl FnOnce(&Received) -> T) -> ControlResult<T> {
        self.received
            .read()
            .map(|r| f(&r))
            .map_err(|_| ControlError::internal("lock poisoned"))
    }

    fn record(&self, f: impl FnOnce(&mut Received)) -> ControlResult<()> {
        let mut received = self
            .received
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))?;
        f(&mut received);
        Ok(())
    }

    fn access(&self) -> ControlResult<ClusterAccess> {
        self.access
            .read()
            .map(|a| a.clone())
            .map_err(|_| ControlError::internal("lock poisoned"))
    }
}

fn handle(
    request_id: Option<&RequestId>,
    organization_id: &OrganizationId,
    cluster_id: Option<&ClusterId>,
) -> ControlResult<OperationResponse> {
    let request_id = request_id
        .cloned()
        .ok_or_else(|| ControlError::invalid("request_id must be assigned"))?;
    let cluster_id = cluster_id
        .cloned()
        .ok_or_else(|| ControlError::invalid("cluster_id must be assigned"))?;
    Ok(OperationResponse::queued(
        request_id,
        organization_id.clone(),
        cluster_id,
    ))
}

#[async_trait]
impl Provisioner for MockProvisioner {
    async fn provision_cluster(
        &self,
        request: &ProvisionClusterRequest,
    ) -> ControlResult<ProvisionResponse> {
        self.record(|r| r.provisions.push(request.clone()))?;
        let started = self.provisions.start(handle(
            request.request_id.as_ref(),
            &request.organization_id,
            request.cluster_id.as_ref(),
        )?)?;
        Ok(started.into())
    }

    async fn check_provision_progress(
        &self,
        request_id: &RequestId,
    ) -> ControlResult<ProvisionResponse> {
        let operation = self.provisions.poll(request_id)?;
        if operation.progress != OperationProgress::Succeeded {
            return Ok(operation.into());
        }
        let access = self.access()?;
        Ok(ProvisionResponse {
            operation,
            raw_kube_config: access.kube_config,
            hostname: access.hostname,
            static_ip_addresses: access.static_ip_addresses,
        })
    }

    async fn scale_cluster(
        &self,
        request: &ScaleClusterRequest,
    ) -> ControlResult<OperationResponse> {
        self.record(|r| r.scales.push(request.clone()))?;
        self.scales.start(handle(
            request.request_id.as_ref(),
            &request.organization_id,
            Some(&request.cluster_id),
        )?)
    }

    async fn check_scale_progress(
        &self,
        request_id: &RequestId,
    ) -> ControlResult<OperationResponse> {
        self.scales.poll(request_id)
    }

    async fn decommission_cluster(
        &self,
        request: &DecommissionClusterRequest,
    ) -> ControlResult<OperationResponse> {
        self.record(|r| r.decommissions.push(request.clone()))?;
        self.decommissions.start(handle(
            request.request_id.as_ref(),
            &request.organization_id,
            Some(&request.cluster_id),
        )?)
    }

    async fn check_decommission_progress(
        &self,
        request_id: &RequestId,
    ) -> ControlResult<OperationResponse> {
        self.decommissions.poll(request_id)
    }

    async fn get_kube_config(
        &self,
        _request: &DecommissionClusterRequest,
    ) -> ControlResult<KubeConfigResponse> {
        self.record(|r| r.kube_config_requests += 1)?;
        let raw_kube_config = self
            .access()?
            .kube_config
            .ok_or_else(|| ControlError::NotFound("kubeconfig".to_owned()))?;
        Ok(KubeConfigResponse { raw_kube_config })
    }
}
