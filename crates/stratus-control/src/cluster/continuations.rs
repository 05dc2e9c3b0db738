//! Monitor continuations.
//!
//! Each continuation owns the typed cluster handle of the phase it closes
//! and performs the lifecycle transition for the observed outcome. Watch
//! failures and logically failed operations both end in `FAILURE`.

use futures::future::BoxFuture;
use tracing::{error, info, warn};

use crate::error::{ControlError, ControlResult};
use crate::monitor::{Completion, CompletionCallback, GuardSlot, OperationGuard, OperationKind};
use crate::operation::{OperationResponse, ProvisionResponse};
use crate::registry::UpdateClusterRequest;
use crate::requests::{ClusterRef, DecommissionClusterRequest, InstallRequest};
use crate::state::{
    Cluster, InstallInProgress, LifecycleState, Provisioning, Scaling, Uninstalling,
};
use crate::types::{ClusterId, ClusterRecord, ClusterType, NodeState, Platform, RequestId};

use super::ClusterManager;

/// Carries a decommission request through an uninstall so the cluster's
/// infrastructure is released once the uninstall succeeds.
#[derive(Debug, Clone)]
pub(super) struct DecommissionChain {
    request: DecommissionClusterRequest,
}

impl DecommissionChain {
    /// Chain `request` after an uninstall.
    #[must_use]
    pub(super) const fn new(request: DecommissionClusterRequest) -> Self {
        Self { request }
    }
}

fn cluster_ref<S: LifecycleState>(cluster: &Cluster<S>) -> ClusterRef {
    ClusterRef::new(cluster.organization_id().clone(), cluster.id().clone())
}

/// Guard for a step chained from a completed operation.
///
/// Takes over the completed operation's guard; a monitor launched without
/// one falls back to a fresh claim.
fn chained_guard(
    manager: &ClusterManager,
    slot: &GuardSlot,
    cluster_id: &ClusterId,
    kind: OperationKind,
) -> ControlResult<OperationGuard> {
    match slot.take(kind) {
        Some(guard) => Ok(guard),
        None => manager.supervisor.try_acquire(cluster_id, kind),
    }
}

/// Closes a provision: discovers the new cluster, attaches its nodes, marks
/// it provisioned and starts the install.
pub(super) struct ProvisionCompleted {
    pub(super) manager: ClusterManager,
    pub(super) cluster: Cluster<Provisioning>,
    pub(super) platform: Platform,
}

impl ProvisionCompleted {
    async fn run(self, completion: Completion<ProvisionResponse>) {
        let Self {
            manager,
            cluster,
            platform,
        } = self;

        if !completion.succeeded() {
            let reason = completion.failure_reason();
            warn!(%reason, "Provision failed, install will not be triggered");
            if let Err(err) = manager.state.persist(cluster.fail(reason)).await {
                error!(error = %err.debug_report(), "Unable to record failed provision");
            }
            return;
        }

        let response = completion.response;
        let prepared = prepare_provisioned(
            &manager,
            cluster.record(),
            &completion.request_id,
            &response,
        )
        .await;
        let record = match prepared {
            Ok(record) => record,
            Err(err) => {
                error!(error = %err.debug_report(), "Unable to prepare provisioned cluster");
                let failed = cluster.fail(err.to_string());
                if let Err(write_err) = manager.state.persist(failed).await {
                    error!(error = %write_err.debug_report(), "Unable to record failed provision");
                }
                return;
            }
        };

        let cluster = match manager
            .state
            .persist(cluster.amend(|r| *r = record).provisioned())
            .await
        {
            Ok(cluster) => cluster,
            Err(err) => {
                error!(error = %err.debug_report(), "Unable to update cluster state after provision");
                return;
            }
        };

        let guard = match chained_guard(
            &manager,
            &completion.guard,
            cluster.id(),
            OperationKind::Install,
        ) {
            Ok(guard) => guard,
            Err(err) => {
                error!(error = %err, "Install after provision not started");
                return;
            }
        };
        let install = InstallRequest {
            request_id: Some(completion.request_id),
            organization_id: completion.organization_id,
            cluster_id: Some(completion.cluster_id),
            cluster_type: ClusterType::Kubernetes,
            install_base_system: false,
            kube_config_raw: response.raw_kube_config,
            hostname: response.hostname,
            target_platform: platform,
            static_ip_addresses: response.static_ip_addresses,
            ..InstallRequest::default()
        };
        if let Err(err) = manager.start_install(cluster, install, guard).await {
            error!(error = %err.debug_report(), "Error creating install request after provisioning");
        }
    }
}

/// Discover the provisioned cluster, record its hostnames and attach its
/// nodes. Returns the updated registry record.
async fn prepare_provisioned(
    manager: &ClusterManager,
    record: &ClusterRecord,
    request_id: &RequestId,
    response: &ProvisionResponse,
) -> ControlResult<ClusterRecord> {
    let kube_config = response
        .raw_kube_config
        .as_deref()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ControlError::internal("provisioner reported no kubeconfig"))?;

    let discovered = super::bounded(
        manager.timeouts.long(),
        "discover cluster",
        manager
            .deps
            .discovery
            .discover(request_id, kube_config, &response.hostname),
    )
    .await?;

    let target = ClusterRef::new(record.organization_id.clone(), record.cluster_id.clone());
    let updated = manager
        .state
        .update(&UpdateClusterRequest {
            hostname: Some(response.hostname.clone()),
            control_plane_hostname: Some(discovered.control_plane_hostname.clone()),
            ..UpdateClusterRequest::for_cluster(
                target.organization_id.clone(),
                target.cluster_id.clone(),
            )
        })
        .await?;

    manager
        .attach_nodes(request_id, &target, &discovered.nodes)
        .await?;
    Ok(updated)
}

impl CompletionCallback<ProvisionResponse> for ProvisionCompleted {
    fn on_complete(
        self: Box<Self>,
        completion: Completion<ProvisionResponse>,
    ) -> BoxFuture<'static, ()> {
        Box::pin((*self).run(completion))
    }
}

/// Closes an install: `INSTALLED` or `FAILURE`, mirrored onto the nodes.
pub(super) struct InstallCompleted {
    pub(super) manager: ClusterManager,
    pub(super) cluster: Cluster<InstallInProgress>,
}

impl InstallCompleted {
    async fn run(self, completion: Completion<OperationResponse>) {
        let Self { manager, cluster } = self;
        let target = cluster_ref(&cluster);

        let (written, node_state) = if completion.succeeded() {
            let written = manager.state.persist(cluster.installed()).await.map(drop);
            (written, NodeState::Installed)
        } else {
            let reason = completion.failure_reason();
            warn!(%reason, "Installation failed");
            let written = manager.state.persist(cluster.fail(reason)).await.map(drop);
            (written, NodeState::Failure)
        };
        if let Err(err) = written {
            error!(error = %err.debug_report(), "Unable to update cluster state after install");
        }

        if let Err(err) = manager.mirror_node_state(&target, node_state).await {
            error!(error = %err.debug_report(), "Unable to update nodes after install");
            return;
        }
        info!(succeeded = completion.succeeded(), "Install finished");
    }
}

impl CompletionCallback<OperationResponse> for InstallCompleted {
    fn on_complete(
        self: Box<Self>,
        completion: Completion<OperationResponse>,
    ) -> BoxFuture<'static, ()> {
        Box::pin((*self).run(completion))
    }
}

/// Closes a scale: back to `INSTALLED` or `FAILURE`.
pub(super) struct ScaleCompleted {
    pub(super) manager: ClusterManager,
    pub(super) cluster: Cluster<Scaling>,
}

impl ScaleCompleted {
    async fn run(self, completion: Completion<OperationResponse>) {
        let Self { manager, cluster } = self;
        let written = if completion.succeeded() {
            manager.state.persist(cluster.finish_scaling()).await.map(drop)
        } else {
            let reason = completion.failure_reason();
            warn!(%reason, "Scaling failed");
            manager.state.persist(cluster.fail(reason)).await.map(drop)
        };
        if let Err(err) = written {
            error!(error = %err.debug_report(), "Unable to update cluster state after scale");
        }
    }
}

impl CompletionCallback<OperationResponse> for ScaleCompleted {
    fn on_complete(
        self: Box<Self>,
        completion: Completion<OperationResponse>,
    ) -> BoxFuture<'static, ()> {
        Box::pin((*self).run(completion))
    }
}

/// Closes an uninstall: back to `PROVISIONED` or `FAILURE`, mirrored onto
/// the nodes.
pub(super) struct UninstallCompleted {
    pub(super) manager: ClusterManager,
    pub(super) cluster: Cluster<Uninstalling>,
}

impl UninstallCompleted {
    async fn run(self, completion: Completion<OperationResponse>) {
        let Self { manager, cluster } = self;
        let target = cluster_ref(&cluster);

        let (written, node_state) = if completion.succeeded() {
            let written = manager.state.persist(cluster.uninstalled()).await.map(drop);
            (written, NodeState::Assigned)
        } else {
            let reason = completion.failure_reason();
            warn!(%reason, "Uninstall failed");
            let written = manager.state.persist(cluster.fail(reason)).await.map(drop);
            (written, NodeState::Failure)
        };
        if let Err(err) = written {
            error!(error = %err.debug_report(), "Unable to update cluster state after uninstall");
        }

        if let Err(err) = manager.mirror_node_state(&target, node_state).await {
            error!(error = %err.debug_report(), "Unable to update nodes after uninstall");
        }
    }
}

impl CompletionCallback<OperationResponse> for UninstallCompleted {
    fn on_complete(
        self: Box<Self>,
        completion: Completion<OperationResponse>,
    ) -> BoxFuture<'static, ()> {
        Box::pin((*self).run(completion))
    }
}

/// Starts the chained decommission after a successful uninstall.
pub(super) struct DecommissionOnUninstall {
    pub(super) manager: ClusterManager,
    pub(super) chain: DecommissionChain,
}

impl DecommissionOnUninstall {
    async fn run(self, completion: Completion<OperationResponse>) {
        if !completion.succeeded() {
            info!("Uninstall did not succeed, decommission skipped");
            return;
        }
        let guard = match chained_guard(
            &self.manager,
            &completion.guard,
            &completion.cluster_id,
            OperationKind::Decommission,
        ) {
            Ok(guard) => guard,
            Err(err) => {
                error!(error = %err, "Decommission after uninstall not started");
                return;
            }
        };
        if let Err(err) = self
            .manager
            .start_decommission(self.chain.request, guard)
            .await
        {
            error!(error = %err.debug_report(), "Unable to decommission cluster after uninstall");
        }
    }
}

impl CompletionCallback<OperationResponse> for DecommissionOnUninstall {
    fn on_complete(
        self: Box<Self>,
        completion: Completion<OperationResponse>,
    ) -> BoxFuture<'static, ()> {
        Box::pin((*self).run(completion))
    }
}

/// Closes a decommission: removes the cluster and its nodes on success,
/// writes `FAILURE` otherwise.
pub(super) struct DecommissionCompleted {
    pub(super) manager: ClusterManager,
    pub(super) cluster: ClusterRef,
}

impl DecommissionCompleted {
    async fn run(self, completion: Completion<OperationResponse>) {
        let Self { manager, cluster } = self;

        if completion.succeeded() {
            if let Err(err) = manager
                .remove_cluster_from_registry(&completion.request_id, &cluster)
                .await
            {
                error!(error = %err.debug_report(), "Could not remove cluster from registry");
            }
            return;
        }

        let reason = completion.failure_reason();
        warn!(%reason, "Decommission failed");
        let written = match manager.state.load(&cluster).await {
            Ok(current) => manager.state.persist(current.fail(reason)).await.map(drop),
            Err(err) => Err(err),
        };
        if let Err(err) = written {
            error!(error = %err.debug_report(), "Unable to record failed decommission");
        }
    }
}

impl CompletionCallback<OperationResponse> for DecommissionCompleted {
    fn on_complete(
        self: Box<Self>,
        completion: Completion<OperationResponse>,
    ) -> BoxFuture<'static, ()> {
        Box::pin((*self).run(completion))
    }
}
