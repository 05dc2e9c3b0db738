//! Typestate pattern for the cluster lifecycle.
//!
//! Lifecycle states are encoded in the type system so that the orchestrator
//! can only perform the transitions the lifecycle allows:
//!
//! ```text
//! Provisioning ──▶ Provisioned ──▶ InstallInProgress ──▶ Installed ◀──▶ Scaling
//!       │               ▲                 │                  │            │
//!       │               └── Uninstalling ◀┼──────────────────┘            │
//!       ▼                       │         ▼                               ▼
//!     Failed ◀──────────────────┴──── Failed ◀──────────────────────── Failed
//! ```
//!
//! A cluster adopted through discovery enters directly at `Provisioned`.
//! Records read back from the registry are lifted with [`AnyCluster::from_record`]
//! and narrowed with the `try_into_*` methods, which is where state
//! preconditions are enforced.

use std::marker::PhantomData;

use crate::error::{ControlError, ControlResult};
use crate::types::{ClusterId, ClusterRecord, ClusterState, OrganizationId};

/// Marker trait for lifecycle states.
pub trait LifecycleState: private::Sealed + Send + Sync + 'static {
    /// State as stored in the registry.
    fn persisted() -> ClusterState;
}

/// Lifecycle states that represent a running remote phase.
///
/// Only these can fail.
pub trait InProgress: LifecycleState {}

mod private {
    pub trait Sealed {}
}

/// Infrastructure is being created.
#[derive(Debug, Clone, Copy)]
pub struct Provisioning;

/// Infrastructure exists, platform not installed.
#[derive(Debug, Clone, Copy)]
pub struct Provisioned;

/// Platform installation running.
#[derive(Debug, Clone, Copy)]
pub struct InstallInProgress;

/// Platform installed.
#[derive(Debug, Clone, Copy)]
pub struct Installed;

/// Node count changing.
#[derive(Debug, Clone, Copy)]
pub struct Scaling;

/// Platform removal running.
#[derive(Debug, Clone, Copy)]
pub struct Uninstalling;

/// A phase failed.
#[derive(Debug, Clone, Copy)]
pub struct Failed;

macro_rules! lifecycle_state {
    ($($marker:ident => $state:ident),* $(,)?) => {
        $(
            impl private::Sealed for $marker {}

            impl LifecycleState for $marker {
                fn persisted() -> ClusterState {
                    ClusterState::$state
                }
            }
        )*
    };
}

lifecycle_state!(
    Provisioning => Provisioning,
    Provisioned => Provisioned,
    InstallInProgress => InstallInProgress,
    Installed => Installed,
    Scaling => Scaling,
    Uninstalling => Uninstalling,
    Failed => Failure,
);

impl InProgress for Provisioning {}
impl InProgress for InstallInProgress {}
impl InProgress for Scaling {}
impl InProgress for Uninstalling {}

/// A cluster in a specific lifecycle state.
#[derive(Debug)]
pub struct Cluster<S: LifecycleState> {
    record: ClusterRecord,
    failure: Option<String>,
    _state: PhantomData<S>,
}

impl<S: LifecycleState> Cluster<S> {
    fn wrap(mut record: ClusterRecord) -> Self {
        record.state = S::persisted();
        Self {
            record,
            failure: None,
            _state: PhantomData,
        }
    }

    fn transition<T: LifecycleState>(self) -> Cluster<T> {
        Cluster::wrap(self.record)
    }

    /// Get a reference to the cluster record.
    #[must_use]
    pub const fn record(&self) -> &ClusterRecord {
        &self.record
    }

    /// Get the cluster ID.
    #[must_use]
    pub const fn id(&self) -> &ClusterId {
        &self.record.cluster_id
    }

    /// Get the owning organization.
    #[must_use]
    pub const fn organization_id(&self) -> &OrganizationId {
        &self.record.organization_id
    }

    /// Get the current state as a persisted value.
    #[must_use]
    pub fn state(&self) -> ClusterState {
        S::persisted()
    }

    /// Reason recorded when the cluster entered [`Failed`].
    #[must_use]
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Amend descriptive fields without changing state.
    #[must_use]
    pub fn amend(mut self, f: impl FnOnce(&mut ClusterRecord)) -> Self {
        f(&mut self.record);
        self.record.state = S::persisted();
        self
    }

    /// Convert into the underlying record.
    #[must_use]
    pub fn into_record(self) -> ClusterRecord {
        self.record
    }
}

impl<S: InProgress> Cluster<S> {
    /// Transition to the failed state.
    #[must_use]
    pub fn fail(self, reason: impl Into<String>) -> Cluster<Failed> {
        let mut failed: Cluster<Failed> = self.transition();
        failed.failure = Some(reason.into());
        failed
    }
}

impl Cluster<Provisioning> {
    /// Wrap a placeholder record created for a provision request.
    #[must_use]
    pub fn placeholder(record: ClusterRecord) -> Self {
        Self::wrap(record)
    }

    /// Infrastructure has been created.
    #[must_use]
    pub fn provisioned(self) -> Cluster<Provisioned> {
        self.transition()
    }
}

impl Cluster<Provisioned> {
    /// Adopt an already running cluster found by discovery.
    #[must_use]
    pub fn adopt(record: ClusterRecord) -> Self {
        Self::wrap(record)
    }

    /// Begin installing the platform.
    #[must_use]
    pub fn start_install(self) -> Cluster<InstallInProgress> {
        self.transition()
    }
}

impl Cluster<InstallInProgress> {
    /// Installation finished successfully.
    #[must_use]
    pub fn installed(self) -> Cluster<Installed> {
        self.transition()
    }
}

impl Cluster<Installed> {
    /// Begin changing the node count.
    #[must_use]
    pub fn start_scaling(self) -> Cluster<Scaling> {
        self.transition()
    }
}

impl Cluster<Scaling> {
    /// Scaling finished successfully.
    #[must_use]
    pub fn finish_scaling(self) -> Cluster<Installed> {
        self.transition()
    }
}

impl Cluster<Uninstalling> {
    /// Platform removed; infrastructure is retained.
    #[must_use]
    pub fn uninstalled(self) -> Cluster<Provisioned> {
        self.transition()
    }
}

/// A cluster whose state is only known at runtime.
#[derive(Debug)]
pub enum AnyCluster {
    /// Infrastructure is being created.
    Provisioning(Cluster<Provisioning>),
    /// Infrastructure exists.
    Provisioned(Cluster<Provisioned>),
    /// Installation running.
    InstallInProgress(Cluster<InstallInProgress>),
    /// Platform installed.
    Installed(Cluster<Installed>),
    /// Scaling running.
    Scaling(Cluster<Scaling>),
    /// Uninstall running.
    Uninstalling(Cluster<Uninstalling>),
    /// A phase failed.
    Failed(Cluster<Failed>),
}

impl AnyCluster {
    /// Lift a registry record into the typed lifecycle.
    #[must_use]
    pub fn from_record(record: ClusterRecord) -> Self {
        match record.state {
            ClusterState::Provisioning => Self::Provisioning(Cluster::wrap(record)),
            ClusterState::Provisioned => Self::Provisioned(Cluster::wrap(record)),
            ClusterState::InstallInProgress => Self::InstallInProgress(Cluster::wrap(record)),
            ClusterState::Installed => Self::Installed(Cluster::wrap(record)),
            ClusterState::Scaling => Self::Scaling(Cluster::wrap(record)),
            ClusterState::Uninstalling => Self::Uninstalling(Cluster::wrap(record)),
            ClusterState::Failure => Self::Failed(Cluster::wrap(record)),
        }
    }

    /// Get a reference to the cluster record.
    #[must_use]
    pub const fn record(&self) -> &ClusterRecord {
        match self {
            Self::Provisioning(c) => c.record(),
            Self::Provisioned(c) => c.record(),
            Self::InstallInProgress(c) => c.record(),
            Self::Installed(c) => c.record(),
            Self::Scaling(c) => c.record(),
            Self::Uninstalling(c) => c.record(),
            Self::Failed(c) => c.record(),
        }
    }

    /// Get the current state.
    #[must_use]
    pub const fn state(&self) -> ClusterState {
        self.record().state
    }

    fn into_record(self) -> ClusterRecord {
        match self {
            Self::Provisioning(c) => c.into_record(),
            Self::Provisioned(c) => c.into_record(),
            Self::InstallInProgress(c) => c.into_record(),
            Self::Installed(c) => c.into_record(),
            Self::Scaling(c) => c.into_record(),
            Self::Uninstalling(c) => c.into_record(),
            Self::Failed(c) => c.into_record(),
        }
    }

    fn unexpected(&self, expected: ClusterState) -> ControlError {
        ControlError::precondition(format!(
            "cluster {} is {}, expected {expected}",
            self.record().cluster_id,
            self.state()
        ))
    }

    /// Narrow to a provisioned cluster.
    ///
    /// Returns a failed precondition error for any other state.
    pub fn try_into_provisioned(self) -> ControlResult<Cluster<Provisioned>> {
        match self {
            Self::Provisioned(c) => Ok(c),
            other => Err(other.unexpected(ClusterState::Provisioned)),
        }
    }

    /// Narrow to an installed cluster.
    ///
    /// Returns a failed precondition error for any other state.
    pub fn try_into_installed(self) -> ControlResult<Cluster<Installed>> {
        match self {
            Self::Installed(c) => Ok(c),
            other => Err(other.unexpected(ClusterState::Installed)),
        }
    }

    /// Begin uninstalling.
    ///
    /// Uninstall is gated on connectivity and hosted workloads rather than
    /// lifecycle state, so it is available from every state.
    #[must_use]
    pub fn start_uninstall(self) -> Cluster<Uninstalling> {
        Cluster::wrap(self.into_record())
    }

    /// Record a failure observed outside a running phase.
    #[must_use]
    pub fn fail(self, reason: impl Into<String>) -> Cluster<Failed> {
        let mut failed: Cluster<Failed> = Cluster::wrap(self.into_record());
        failed.failure = Some(reason.into());
        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClusterStatus, ClusterType, Platform};

    fn record(state: ClusterState) -> ClusterRecord {
        ClusterRecord {
            organization_id: OrganizationId::new("o1"),
            cluster_id: ClusterId::new("c1"),
            name: "c1".to_owned(),
            cluster_type: ClusterType::Kubernetes,
            platform: Platform::Azure,
            hostname: String::new(),
            control_plane_hostname: String::new(),
            kubernetes_version: String::new(),
            labels: Default::default(),
            state,
            status: ClusterStatus::Online,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn provision_install_scale_path() {
        let provisioning = Cluster::<Provisioning>::placeholder(record(ClusterState::Failure));
        assert_eq!(provisioning.record().state, ClusterState::Provisioning);

        let installed = provisioning.provisioned().start_install().installed();
        assert_eq!(installed.state(), ClusterState::Installed);
        assert_eq!(installed.record().state, ClusterState::Installed);

        let scaling = installed.start_scaling();
        assert_eq!(scaling.state(), ClusterState::Scaling);
        assert_eq!(scaling.finish_scaling().state(), ClusterState::Installed);
    }

    #[test]
    fn failure_keeps_reason() {
        let failed = Cluster::<Provisioned>::adopt(record(ClusterState::Provisioned))
            .start_install()
            .fail("installer unreachable");
        assert_eq!(failed.record().state, ClusterState::Failure);
        assert_eq!(failed.failure(), Some("installer unreachable"));
    }

    #[test]
    fn uninstall_returns_to_provisioned() {
        let any = AnyCluster::from_record(record(ClusterState::Installed));
        let provisioned = any.start_uninstall().uninstalled();
        assert_eq!(provisioned.state(), ClusterState::Provisioned);
    }

    #[test]
    fn narrowing_checks_state() {
        let any = AnyCluster::from_record(record(ClusterState::Scaling));
        assert_eq!(any.state(), ClusterState::Scaling);
        let err = any.try_into_installed().unwrap_err();
        assert!(matches!(err, ControlError::FailedPrecondition(_)));
        assert!(err.to_string().contains("SCALING"));

        let any = AnyCluster::from_record(record(ClusterState::Provisioned));
        assert!(any.try_into_provisioned().is_ok());
    }

    #[test]
    fn amend_preserves_state() {
        let cluster = Cluster::<Provisioning>::placeholder(record(ClusterState::Provisioning))
            .amend(|r| {
                r.hostname = "c1.example.com".to_owned();
                r.state = ClusterState::Installed;
            });
        assert_eq!(cluster.record().hostname, "c1.example.com");
        assert_eq!(cluster.record().state, ClusterState::Provisioning);
    }
}
