//! Lifecycle orchestrator.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::bus::{EventBus, InfrastructureOp};
use crate::config::TimeoutConfig;
use crate::discovery::ClusterDiscovery;
use crate::error::{ControlError, ControlResult};
use crate::installer::{InstallProgress, Installer};
use crate::inventory::AppInventory;
use crate::monitor::{
    MonitorSettings, MonitorSupervisor, OperationGuard, OperationKind, OperationMonitor,
};
use crate::operation::{OperationResponse, ProvisionResponse};
use crate::provisioner::{DecommissionProgress, ProvisionProgress, Provisioner, ScaleProgress};
use crate::registry::{
    AddClusterRequest, ClusterRegistry, NodeRegistry, RemoveNodesRequest, UpdateClusterRequest,
    UpdateNodeRequest,
};
use crate::requests::{
    ClusterRef, DecommissionClusterRequest, InstallRequest, ProvisionClusterRequest,
    ScaleClusterRequest, UninstallClusterRequest,
};
use crate::state::{AnyCluster, Cluster, InProgress, Provisioned, Provisioning};
use crate::types::{
    ClusterRecord, ClusterState, ClusterStatus, ClusterType, NodeRecord, OrganizationId, RequestId,
};
use crate::validation;

use super::bounded;
use super::continuations::{
    DecommissionChain, DecommissionCompleted, DecommissionOnUninstall, InstallCompleted,
    ProvisionCompleted, ScaleCompleted, UninstallCompleted,
};
use super::state_accessor::StateAccessor;

/// Remote services the orchestrator drives.
#[derive(Clone)]
pub struct Collaborators {
    /// Cluster side of the registry.
    pub clusters: Arc<dyn ClusterRegistry>,
    /// Node side of the registry.
    pub nodes: Arc<dyn NodeRegistry>,
    /// Platform installer.
    pub installer: Arc<dyn Installer>,
    /// Infrastructure provisioner, scaler and decommissioner.
    pub provisioner: Arc<dyn Provisioner>,
    /// Application inventory.
    pub inventory: Arc<dyn AppInventory>,
    /// Event bus.
    pub bus: Arc<dyn EventBus>,
    /// Live cluster discovery.
    pub discovery: Arc<dyn ClusterDiscovery>,
}

/// Cluster lifecycle orchestrator.
///
/// Cheap to clone; monitor continuations hold a clone to re-enter the
/// orchestrator when their operation completes.
#[derive(Clone)]
pub struct ClusterManager {
    pub(super) deps: Collaborators,
    pub(super) state: StateAccessor,
    pub(super) supervisor: MonitorSupervisor,
    pub(super) timeouts: TimeoutConfig,
    pub(super) monitor: MonitorSettings,
}

impl ClusterManager {
    /// Create an orchestrator.
    #[must_use]
    pub fn new(
        deps: Collaborators,
        supervisor: MonitorSupervisor,
        timeouts: TimeoutConfig,
        monitor: MonitorSettings,
    ) -> Self {
        let state = StateAccessor::new(
            Arc::clone(&deps.clusters),
            Arc::clone(&deps.bus),
            timeouts.short(),
        );
        Self {
            deps,
            state,
            supervisor,
            timeouts,
            monitor,
        }
    }

    /// Supervisor running this orchestrator's monitors.
    #[must_use]
    pub const fn supervisor(&self) -> &MonitorSupervisor {
        &self.supervisor
    }

    /// Write `FAILURE` after an initiating call was rejected.
    async fn record_failure<S: InProgress>(&self, cluster: Cluster<S>, err: &ControlError) {
        let cluster_id = cluster.id().clone();
        if let Err(write_err) = self.state.persist(cluster.fail(err.to_string())).await {
            error!(
                %cluster_id,
                error = %write_err.debug_report(),
                "Failed to record cluster failure"
            );
        }
    }

    /// Create infrastructure for a new cluster, then install the platform.
    ///
    /// A placeholder record is registered in `PROVISIONING` before the
    /// provisioner is called. The install is chained from the provision
    /// monitor and only runs if provisioning succeeded.
    #[instrument(skip_all, fields(organization_id = %request.organization_id, cluster_name = %request.cluster_name))]
    pub async fn provision_and_install(
        &self,
        mut request: ProvisionClusterRequest,
    ) -> ControlResult<ProvisionResponse> {
        validation::validate_provision(&request)?;
        let request_id = RequestId::generate();
        request.request_id = Some(request_id.clone());
        info!(%request_id, platform = %request.target_platform, "Provisioning cluster");

        let record = self
            .state
            .create(&AddClusterRequest {
                request_id,
                organization_id: request.organization_id.clone(),
                name: request.cluster_name.clone(),
                cluster_type: ClusterType::Kubernetes,
                platform: request.target_platform,
                kubernetes_version: request.kubernetes_version.clone(),
                state: Some(ClusterState::Provisioning),
                ..AddClusterRequest::default()
            })
            .await?;
        let cluster = Cluster::<Provisioning>::placeholder(record);
        let guard = self
            .supervisor
            .try_acquire(cluster.id(), OperationKind::Provision)?;
        request.cluster_id = Some(cluster.id().clone());

        let started = match bounded(
            self.timeouts.long(),
            "provision cluster",
            self.deps.provisioner.provision_cluster(&request),
        )
        .await
        {
            Ok(started) => started,
            Err(err) => {
                self.record_failure(cluster, &err).await;
                return Err(err);
            }
        };
        info!(cluster_id = %cluster.id(), "Cluster is being provisioned");

        let monitor = OperationMonitor::new(
            OperationKind::Provision,
            Arc::new(ProvisionProgress(Arc::clone(&self.deps.provisioner))),
            started.clone(),
            self.monitor,
        )
        .with_callback(ProvisionCompleted {
            manager: self.clone(),
            cluster,
            platform: request.target_platform,
        });
        self.supervisor.launch(monitor, Some(guard));
        Ok(started)
    }

    /// Install the platform on a provisioned cluster.
    ///
    /// With a `cluster_id` the existing cluster is used; otherwise the cluster
    /// is discovered from `kube_config_raw` and registered as provisioned.
    #[instrument(skip_all, fields(organization_id = %request.organization_id))]
    pub async fn install_cluster(
        &self,
        mut request: InstallRequest,
    ) -> ControlResult<OperationResponse> {
        validation::validate_install(&request)?;
        if request.install_base_system {
            return Err(ControlError::Unimplemented("base system install"));
        }
        let request_id = RequestId::generate();
        request.request_id = Some(request_id.clone());

        let (cluster, guard) = match request.cluster_id.clone() {
            Some(cluster_id) => {
                let guard = self
                    .supervisor
                    .try_acquire(&cluster_id, OperationKind::Install)?;
                let cluster = self
                    .state
                    .load(&ClusterRef::new(request.organization_id.clone(), cluster_id))
                    .await?
                    .try_into_provisioned()?;
                (cluster, guard)
            }
            None => {
                let Some(kube_config) = request.kube_config_raw.clone().filter(|k| !k.is_empty())
                else {
                    return Err(ControlError::precondition(
                        "installing with SSH credentials requires an existing cluster_id",
                    ));
                };
                info!(%request_id, "Discovering cluster");
                let cluster = self
                    .adopt_cluster(
                        &request_id,
                        &request.organization_id,
                        &kube_config,
                        &request.hostname,
                        request.target_platform,
                    )
                    .await?;
                let guard = self
                    .supervisor
                    .try_acquire(cluster.id(), OperationKind::Install)?;
                (cluster, guard)
            }
        };

        request.cluster_id = Some(cluster.id().clone());
        self.start_install(cluster, request, guard).await
    }

    /// Move a provisioned cluster into `INSTALL_IN_PROGRESS` and start the
    /// installer. `request` must carry its request and cluster ids.
    pub(super) async fn start_install(
        &self,
        cluster: Cluster<Provisioned>,
        request: InstallRequest,
        guard: OperationGuard,
    ) -> ControlResult<OperationResponse> {
        let cluster = self.state.persist(cluster.start_install()).await?;
        let started = match bounded(
            self.timeouts.long(),
            "install cluster",
            self.deps.installer.install_cluster(&request),
        )
        .await
        {
            Ok(started) => started,
            Err(err) => {
                self.record_failure(cluster, &err).await;
                return Err(err);
            }
        };
        info!(cluster_id = %cluster.id(), request_id = %started.request_id, "Cluster is being installed");

        let monitor = OperationMonitor::new(
            OperationKind::Install,
            Arc::new(InstallProgress(Arc::clone(&self.deps.installer))),
            started.clone(),
            self.monitor,
        )
        .with_callback(InstallCompleted {
            manager: self.clone(),
            cluster,
        });
        self.supervisor.launch(monitor, Some(guard));
        Ok(started)
    }

    /// Change the node count of an installed cluster.
    #[instrument(skip_all, fields(organization_id = %request.organization_id, cluster_id = %request.cluster_id))]
    pub async fn scale(
        &self,
        mut request: ScaleClusterRequest,
    ) -> ControlResult<OperationResponse> {
        validation::validate_scale(&request)?;
        request.request_id = Some(RequestId::generate());
        let target = ClusterRef::new(request.organization_id.clone(), request.cluster_id.clone());

        let guard = self
            .supervisor
            .try_acquire(&target.cluster_id, OperationKind::Scale)?;
        let cluster = self.state.load(&target).await?.try_into_installed()?;
        let cluster = self.state.persist(cluster.start_scaling()).await?;

        let started = match bounded(
            self.timeouts.long(),
            "scale cluster",
            self.deps.provisioner.scale_cluster(&request),
        )
        .await
        {
            Ok(started) => started,
            Err(err) => {
                self.record_failure(cluster, &err).await;
                return Err(err);
            }
        };
        info!(num_nodes = request.num_nodes, "Cluster is being scaled");

        let monitor = OperationMonitor::new(
            OperationKind::Scale,
            Arc::new(ScaleProgress(Arc::clone(&self.deps.provisioner))),
            started.clone(),
            self.monitor,
        )
        .with_callback(ScaleCompleted {
            manager: self.clone(),
            cluster,
        });
        self.supervisor.launch(monitor, Some(guard));
        Ok(started)
    }

    /// Remove the platform from a cluster, keeping its infrastructure.
    pub async fn uninstall_cluster(
        &self,
        mut request: UninstallClusterRequest,
    ) -> ControlResult<OperationResponse> {
        validation::validate_uninstall(&request)?;
        request.request_id = Some(RequestId::generate());
        self.uninstall(request, None).await
    }

    /// Remove the platform from a cluster. `request` must carry its request
    /// id.
    ///
    /// The cluster must be online and cordoned and host no application
    /// services. With a decommission chain, the cluster's infrastructure is
    /// released once the uninstall succeeds.
    #[instrument(skip_all, fields(organization_id = %request.organization_id, cluster_id = %request.cluster_id))]
    async fn uninstall(
        &self,
        request: UninstallClusterRequest,
        chain: Option<DecommissionChain>,
    ) -> ControlResult<OperationResponse> {
        let request_id = request
            .request_id
            .clone()
            .ok_or_else(|| ControlError::internal("uninstall started without a request id"))?;
        let target = ClusterRef::new(request.organization_id.clone(), request.cluster_id.clone());

        let guard = self
            .supervisor
            .try_acquire(&target.cluster_id, OperationKind::Uninstall)?;
        let record = self.state.get(&target).await?;
        if self.hosts_workloads(&target).await? {
            return Err(ControlError::precondition(format!(
                "cluster {} has deployed applications",
                target.cluster_id
            )));
        }
        if record.status != ClusterStatus::OnlineCordon {
            return Err(ControlError::precondition(format!(
                "cluster {} must be online and cordoned, is {}",
                target.cluster_id, record.status
            )));
        }

        let cluster = self
            .state
            .persist(AnyCluster::from_record(record).start_uninstall())
            .await?;
        let started = match bounded(
            self.timeouts.long(),
            "uninstall cluster",
            self.deps.installer.uninstall_cluster(&request),
        )
        .await
        {
            Ok(started) => started,
            Err(err) => {
                self.record_failure(cluster, &err).await;
                return Err(err);
            }
        };
        info!(%request_id, decommission = chain.is_some(), "Cluster is uninstalling");

        let mut monitor = OperationMonitor::new(
            OperationKind::Uninstall,
            Arc::new(InstallProgress(Arc::clone(&self.deps.installer))),
            started.clone(),
            self.monitor,
        )
        .with_callback(UninstallCompleted {
            manager: self.clone(),
            cluster,
        });
        if let Some(chain) = chain {
            monitor.register_callback(DecommissionOnUninstall {
                manager: self.clone(),
                chain,
            });
        }
        self.supervisor.launch(monitor, Some(guard));
        Ok(started)
    }

    /// Uninstall the platform, then release the cluster's infrastructure.
    ///
    /// The kubeconfig needed for the uninstall is fetched from the
    /// provisioner's management interface.
    #[instrument(skip_all, fields(organization_id = %request.organization_id, cluster_id = %request.cluster_id))]
    pub async fn uninstall_and_decommission(
        &self,
        mut request: DecommissionClusterRequest,
    ) -> ControlResult<OperationResponse> {
        validation::validate_decommission(&request)?;
        let request_id = RequestId::generate();
        request.request_id = Some(request_id.clone());

        let kube_config = bounded(
            self.timeouts.long(),
            "get kubeconfig",
            self.deps.provisioner.get_kube_config(&request),
        )
        .await
        .inspect_err(|err| {
            error!(error = %err.debug_report(), "Unable to get kubeconfig for cluster");
        })?;

        let uninstall = UninstallClusterRequest {
            request_id: Some(request_id),
            organization_id: request.organization_id.clone(),
            cluster_id: request.cluster_id.clone(),
            cluster_type: request.cluster_type,
            kube_config_raw: kube_config.raw_kube_config,
            target_platform: request.target_platform,
        };
        self.uninstall(uninstall, Some(DecommissionChain::new(request)))
            .await
    }

    /// Release the infrastructure of a cluster.
    ///
    /// On success the cluster and its nodes are removed from the registry.
    pub async fn decommission(
        &self,
        mut request: DecommissionClusterRequest,
    ) -> ControlResult<OperationResponse> {
        validation::validate_decommission(&request)?;
        request.request_id = Some(RequestId::generate());
        let guard = self
            .supervisor
            .try_acquire(&request.cluster_id, OperationKind::Decommission)?;
        self.start_decommission(request, guard).await
    }

    /// Start the decommissioner. `request` must carry its request id.
    #[instrument(skip_all, fields(organization_id = %request.organization_id, cluster_id = %request.cluster_id))]
    pub(super) async fn start_decommission(
        &self,
        request: DecommissionClusterRequest,
        guard: OperationGuard,
    ) -> ControlResult<OperationResponse> {
        let target = ClusterRef::new(request.organization_id.clone(), request.cluster_id.clone());

        let started = bounded(
            self.timeouts.long(),
            "decommission cluster",
            self.deps.provisioner.decommission_cluster(&request),
        )
        .await
        .inspect_err(|err| {
            error!(error = %err.debug_report(), "Unable to decommission cluster");
        })?;
        info!(request_id = %started.request_id, "Cluster is being decommissioned");

        let monitor = OperationMonitor::new(
            OperationKind::Decommission,
            Arc::new(DecommissionProgress(Arc::clone(&self.deps.provisioner))),
            started.clone(),
            self.monitor,
        )
        .with_callback(DecommissionCompleted {
            manager: self.clone(),
            cluster: target,
        });
        self.supervisor.launch(monitor, Some(guard));
        Ok(started)
    }

    /// Close a cluster to new workloads.
    pub async fn cordon(&self, cluster: &ClusterRef) -> ControlResult<ClusterRecord> {
        validation::validate_cluster_ref(cluster)?;
        self.state.set_cordon(cluster, true).await
    }

    /// Reopen a cluster to new workloads.
    pub async fn uncordon(&self, cluster: &ClusterRef) -> ControlResult<ClusterRecord> {
        validation::validate_cluster_ref(cluster)?;
        self.state.set_cordon(cluster, false).await
    }

    /// Ask the scheduler to move workloads off a cordoned cluster.
    pub async fn drain(&self, cluster: &ClusterRef) -> ControlResult<()> {
        validation::validate_cluster_ref(cluster)?;
        let record = self.state.get(cluster).await?;
        if !record.status.is_cordoned() {
            return Err(ControlError::precondition(format!(
                "cluster {} must be cordoned before draining",
                cluster.cluster_id
            )));
        }

        bounded(
            self.timeouts.short(),
            "publish drain",
            self.deps
                .bus
                .publish_op(&InfrastructureOp::DrainCluster(cluster.clone())),
        )
        .await
        .inspect_err(|err| error!(error = %err, "Failed to publish drain request"))?;
        info!(cluster_id = %cluster.cluster_id, "Drain requested");
        Ok(())
    }

    /// Apply a partial update to a cluster and publish it.
    pub async fn update_cluster(
        &self,
        request: &UpdateClusterRequest,
    ) -> ControlResult<ClusterRecord> {
        validation::validate_update_cluster(request)?;
        self.state.update(request).await
    }

    /// Apply a partial update to a node.
    pub async fn update_node(&self, request: &UpdateNodeRequest) -> ControlResult<NodeRecord> {
        validation::validate_update_node(request)?;
        let updated = bounded(
            self.timeouts.short(),
            "update node",
            self.deps.nodes.update_node(request),
        )
        .await?;
        if request.add_labels || request.remove_labels {
            warn!(
                organization_id = %updated.organization_id,
                node_id = %updated.node_id,
                cluster_id = ?updated.cluster_id,
                "Node labels have not been updated in Kubernetes"
            );
        }
        Ok(updated)
    }

    /// Get a cluster.
    pub async fn get_cluster(&self, cluster: &ClusterRef) -> ControlResult<ClusterRecord> {
        validation::validate_cluster_ref(cluster)?;
        self.state.get(cluster).await
    }

    /// List the clusters of an organization.
    pub async fn list_clusters(
        &self,
        organization_id: &OrganizationId,
    ) -> ControlResult<Vec<ClusterRecord>> {
        validation::validate_organization(organization_id)?;
        bounded(
            self.timeouts.short(),
            "list clusters",
            self.deps.clusters.list_clusters(organization_id),
        )
        .await
    }

    /// List the nodes of a cluster.
    pub async fn list_nodes(&self, cluster: &ClusterRef) -> ControlResult<Vec<NodeRecord>> {
        validation::validate_cluster_ref(cluster)?;
        bounded(
            self.timeouts.short(),
            "list nodes",
            self.deps.nodes.list_nodes(cluster),
        )
        .await
    }

    /// Not supported; use [`uninstall_and_decommission`](Self::uninstall_and_decommission).
    pub async fn remove_cluster(&self, cluster: &ClusterRef) -> ControlResult<()> {
        validation::validate_cluster_ref(cluster)?;
        Err(ControlError::Unimplemented(
            "remove cluster, use uninstall and decommission",
        ))
    }

    /// Not supported; nodes are removed when their cluster is decommissioned.
    pub async fn remove_nodes(&self, request: &RemoveNodesRequest) -> ControlResult<()> {
        validation::validate_remove_nodes(request)?;
        Err(ControlError::Unimplemented(
            "remove nodes, use uninstall and decommission",
        ))
    }

    async fn hosts_workloads(&self, cluster: &ClusterRef) -> ControlResult<bool> {
        let apps = bounded(
            self.timeouts.short(),
            "list app instances",
            self.deps
                .inventory
                .list_app_instances(&cluster.organization_id),
        )
        .await?;
        Ok(apps
            .iter()
            .any(|app| app.runs_on(&cluster.organization_id, &cluster.cluster_id)))
    }
}
