//! Runs monitors on a bounded, cancellable pool.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, info_span, warn, Instrument};

use crate::config::MonitorConfig;
use crate::error::{ControlError, ControlResult};
use crate::operation::OperationOutcome;
use crate::types::ClusterId;

use super::{OperationKind, OperationMonitor};

#[derive(Debug, Clone, Copy)]
struct InFlight {
    kind: OperationKind,
    token: u64,
}

/// Marks a cluster as busy with a long-running operation.
///
/// Released on drop. The monitor of the operation holds it until its last
/// callback returns; a chained follow-up operation takes it over with
/// [`transfer`](Self::transfer) instead of acquiring a new one.
#[derive(Debug)]
pub struct OperationGuard {
    cluster_id: ClusterId,
    kind: OperationKind,
    token: u64,
    in_flight: Arc<DashMap<ClusterId, InFlight>>,
}

impl OperationGuard {
    /// Cluster held by the guard.
    #[must_use]
    pub const fn cluster_id(&self) -> &ClusterId {
        &self.cluster_id
    }

    /// Kind of operation holding the cluster.
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Keep holding the cluster for a follow-up operation of `kind`.
    #[must_use]
    pub fn transfer(mut self, kind: OperationKind) -> Self {
        if let Some(mut held) = self.in_flight.get_mut(&self.cluster_id) {
            if held.token == self.token {
                held.kind = kind;
            }
        }
        self.kind = kind;
        self
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        let token = self.token;
        self.in_flight
            .remove_if(&self.cluster_id, |_, held| held.token == token);
    }
}

/// Owns every running monitor.
#[derive(Debug, Clone)]
pub struct MonitorSupervisor {
    tracker: TaskTracker,
    cancel: CancellationToken,
    permits: Arc<Semaphore>,
    in_flight: Arc<DashMap<ClusterId, InFlight>>,
    next_token: Arc<AtomicU64>,
}

impl MonitorSupervisor {
    /// Create a supervisor from configuration.
    #[must_use]
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            in_flight: Arc::new(DashMap::new()),
            next_token: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Claim a cluster for a long-running operation.
    ///
    /// Fails with [`ControlError::OperationInFlight`] while another guard for
    /// the same cluster is alive.
    pub fn try_acquire(
        &self,
        cluster_id: &ClusterId,
        kind: OperationKind,
    ) -> ControlResult<OperationGuard> {
        match self.in_flight.entry(cluster_id.clone()) {
            Entry::Occupied(held) => Err(ControlError::OperationInFlight {
                cluster_id: cluster_id.clone(),
                kind: held.get().kind.as_str(),
            }),
            Entry::Vacant(slot) => {
                let token = self.next_token.fetch_add(1, Ordering::Relaxed);
                slot.insert(InFlight { kind, token });
                Ok(OperationGuard {
                    cluster_id: cluster_id.clone(),
                    kind,
                    token,
                    in_flight: Arc::clone(&self.in_flight),
                })
            }
        }
    }

    /// Start a monitor in the background.
    ///
    /// The monitor waits for a pool permit, then watches its operation inside
    /// a `monitor` span carrying the operation identity.
    pub fn launch<R: OperationOutcome>(
        &self,
        monitor: OperationMonitor<R>,
        guard: Option<OperationGuard>,
    ) {
        let handle = monitor.initial().operation();
        let span = info_span!(
            "monitor",
            kind = %monitor.kind(),
            request_id = %handle.request_id,
            organization_id = %handle.organization_id,
            cluster_id = %handle.cluster_id,
        );

        let permits = Arc::clone(&self.permits);
        let cancel = self.cancel.child_token();
        self.tracker.spawn(
            async move {
                let _permit = tokio::select! {
                    permit = permits.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return,
                    },
                    () = cancel.cancelled() => {
                        info!("monitor cancelled before start");
                        return;
                    }
                };
                monitor.run(cancel, guard).await;
            }
            .instrument(span),
        );
    }

    /// Number of monitors running or waiting for a permit.
    #[must_use]
    pub fn active(&self) -> usize {
        self.tracker.len()
    }

    /// Whether monitors have been cancelled by a shutdown.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether a long-running operation holds the cluster.
    #[must_use]
    pub fn is_in_flight(&self, cluster_id: &ClusterId) -> bool {
        self.in_flight.contains_key(cluster_id)
    }

    /// Count of in-flight operations by kind.
    #[must_use]
    pub fn in_flight_by_kind(&self) -> HashMap<OperationKind, usize> {
        let mut counts = HashMap::new();
        for entry in self.in_flight.iter() {
            *counts.entry(entry.value().kind).or_insert(0) += 1;
        }
        counts
    }

    /// Wait until every launched monitor has finished.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Stop all monitors.
    ///
    /// Running monitors get `grace` to finish on their own, after which they
    /// are cancelled and their callbacks skipped.
    pub async fn shutdown(&self, grace: Duration) {
        self.tracker.close();
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            warn!(
                active = self.tracker.len(),
                "monitors still running after grace period, cancelling"
            );
            self.cancel.cancel();
            self.tracker.wait().await;
        }
        info!("all monitors stopped");
    }
}
