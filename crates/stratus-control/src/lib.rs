//! Stratus Control Plane
//!
//! This crate drives the lifecycle of customer Kubernetes clusters. It
//! coordinates the cluster registry, the infrastructure provisioner, the
//! platform installer, the application inventory and the infrastructure
//! event bus.
//!
//! # Architecture
//!
//! The control plane is responsible for:
//!
//! - **Lifecycle orchestration**: provisioning, installing, scaling,
//!   uninstalling and decommissioning clusters, chaining the follow-up step
//!   when a long-running operation completes
//! - **Discovery**: reading an existing cluster through its kubeconfig and
//!   registering it with its nodes
//! - **Connectivity**: cordoning, uncordoning and draining clusters
//! - **API surface**: HTTP endpoints for every operation
//!
//! # State Machine
//!
//! Cluster lifecycle states follow a state machine enforced at compile time
//! using the typestate pattern:
//!
//! ```text
//! Provisioning ──▶ Provisioned ──▶ InstallInProgress ──▶ Installed ◀──▶ Scaling
//!       │              ▲                  │                  │
//!       │              └── Uninstalling ◀─┼──────────────────┘
//!       ▼                       │         ▼
//!    Failure ◀──────────────────┴──── Failure
//! ```
//!
//! Only the orchestrator writes lifecycle state; the registry stores it.
//!
//! # Example
//!
//! ```
//! use stratus_control::{
//!     Cluster, Provisioning,
//!     types::{ClusterId, ClusterRecord, ClusterState, ClusterStatus, ClusterType, OrganizationId, Platform},
//! };
//!
//! let record = ClusterRecord {
//!     organization_id: OrganizationId::new("org-1"),
//!     cluster_id: ClusterId::new("edge-1"),
//!     name: "edge".to_owned(),
//!     cluster_type: ClusterType::Kubernetes,
//!     platform: Platform::BareMetal,
//!     hostname: String::new(),
//!     control_plane_hostname: String::new(),
//!     kubernetes_version: "1.30".to_owned(),
//!     labels: Default::default(),
//!     state: ClusterState::Provisioning,
//!     status: ClusterStatus::Offline,
//!     created_at: chrono::Utc::now(),
//! };
//!
//! let provisioning = Cluster::<Provisioning>::placeholder(record);
//! let installed = provisioning.provisioned().start_install().installed();
//! assert_eq!(installed.state(), ClusterState::Installed);
//!
//! // This would not compile:
//! // let invalid = installed.start_install();
//! ```

#![forbid(unsafe_code)]

pub mod api;
pub mod bus;
pub mod client;
pub mod cluster;
pub mod config;
pub mod discovery;
pub mod error;
pub mod installer;
pub mod inventory;
pub(crate) mod mock;
pub mod monitor;
pub mod operation;
pub mod provisioner;
pub mod registry;
pub mod requests;
pub mod service;
pub mod state;
pub mod types;
pub mod validation;

// Re-export commonly used types at the crate root
pub use cluster::{ClusterManager, Collaborators};
pub use config::ControlConfig;
pub use error::{ControlError, ControlResult, ErrorKind};
pub use monitor::{MonitorSettings, MonitorSupervisor, OperationKind};
pub use service::ControlService;
pub use state::{
    AnyCluster, Cluster, Failed, InstallInProgress, Installed, LifecycleState, Provisioned,
    Provisioning, Scaling, Uninstalling,
};
pub use types::{
    ClusterId, ClusterRecord, ClusterState, ClusterStatus, NodeId, NodeRecord, OrganizationId,
    RequestId,
};
