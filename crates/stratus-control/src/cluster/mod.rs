//! Cluster lifecycle orchestration.
//!
//! [`ClusterManager`] exposes one operation per lifecycle transition. Each
//! operation validates its request, checks preconditions against the
//! registry, makes the initiating call to the owning service and, for
//! long-running phases, launches an operation monitor whose continuation
//! performs the next step.
//!
//! The registry is the only store of lifecycle state. Every transition is
//! written there first and then published on the event bus; a failed
//! publish is logged and does not abort the workflow.

mod continuations;
mod manager;
mod nodes;
mod state_accessor;

pub use manager::{ClusterManager, Collaborators};

use std::future::Future;
use std::time::Duration;

use crate::error::{ControlError, ControlResult};

/// Run a remote call with a deadline.
pub(crate) async fn bounded<T>(
    limit: Duration,
    operation: &'static str,
    call: impl Future<Output = ControlResult<T>>,
) -> ControlResult<T> {
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| ControlError::Timeout {
            operation,
            after: limit,
        })?
}
