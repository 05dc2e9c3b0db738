//! Error types for stratus-control.

use std::error::Error as _;
use std::fmt::Write as _;
use std::time::Duration;

use crate::types::ClusterId;

/// Result type alias using [`ControlError`].
pub type ControlResult<T> = Result<T, ControlError>;

/// Errors that can occur in the control plane.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// A request is malformed or misses required fields.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The cluster is not in a state that allows the operation.
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    /// The operation is reserved but not supported.
    #[error("operation not supported: {0}")]
    Unimplemented(&'static str),

    /// Requested entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A remote collaborator rejected or failed the call.
    #[error("{service} error: {message}")]
    Upstream {
        /// Service that reported the failure.
        service: &'static str,
        /// Message returned by the service.
        message: String,
    },

    /// A bounded remote call did not complete in time.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Operation that was running.
        operation: &'static str,
        /// Timeout that was applied.
        after: Duration,
    },

    /// Another long-running operation already holds the cluster.
    #[error("cluster {cluster_id} already has a {kind} operation in flight")]
    OperationInFlight {
        /// Cluster that is busy.
        cluster_id: ClusterId,
        /// Kind of operation holding the cluster.
        kind: &'static str,
    },

    /// Attaching discovered nodes stopped part way.
    #[error("failed to attach node {ip} ({attached} node(s) already attached)")]
    NodeAttach {
        /// Address of the node that failed.
        ip: String,
        /// Number of nodes attached before the failure.
        attached: usize,
        /// Underlying failure.
        #[source]
        source: Box<ControlError>,
    },

    /// Live cluster discovery failed.
    #[error("discovery error: {0}")]
    Discovery(String),

    /// Event bus error.
    #[error("event bus error: {0}")]
    Bus(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Filesystem error while staging credentials.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unexpected missing data after a successful call.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`ControlError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller sent a malformed request.
    InvalidArgument,
    /// State, connectivity or workload checks were not met.
    FailedPrecondition,
    /// Reserved operation.
    Unimplemented,
    /// Entity missing.
    NotFound,
    /// Remote collaborator failure.
    Upstream,
    /// Remote call exceeded its bound.
    Timeout,
    /// Anything else.
    Internal,
}

impl ControlError {
    /// Create an invalid argument error.
    #[must_use]
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a failed precondition error.
    #[must_use]
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::FailedPrecondition(msg.into())
    }

    /// Create an upstream error for the named service.
    #[must_use]
    pub fn upstream(service: &'static str, msg: impl Into<String>) -> Self {
        Self::Upstream {
            service,
            message: msg.into(),
        }
    }

    /// Create a discovery error.
    #[must_use]
    pub fn discovery(msg: impl Into<String>) -> Self {
        Self::Discovery(msg.into())
    }

    /// Create an event bus error.
    #[must_use]
    pub fn bus(msg: impl Into<String>) -> Self {
        Self::Bus(msg.into())
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Classify the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::FailedPrecondition(_) | Self::OperationInFlight { .. } => {
                ErrorKind::FailedPrecondition
            }
            Self::Unimplemented(_) => ErrorKind::Unimplemented,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Upstream { .. }
            | Self::NodeAttach { .. }
            | Self::Discovery(_)
            | Self::Bus(_)
            | Self::Http(_) => ErrorKind::Upstream,
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Render the error together with its full source chain.
    #[must_use]
    pub fn debug_report(&self) -> String {
        let mut report = self.to_string();
        let mut source = self.source();
        while let Some(cause) = source {
            let _ = write!(report, "\n  caused by: {cause}");
            source = cause.source();
        }
        report
    }
}
