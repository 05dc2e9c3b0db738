//! Asynchronous operation monitors.
//!
//! An [`OperationMonitor`] watches one remote long-running operation until it
//! reaches a terminal outcome, then hands a [`Completion`] to each registered
//! [`CompletionCallback`], in registration order, exactly once. Monitors are
//! started through the [`MonitorSupervisor`], which runs them on a bounded
//! pool, ties them to a cancellation token and serialises long-running
//! operations per cluster.
//!
//! Two failure modes reach callbacks and stay distinguishable:
//!
//! - the operation finished with [`OperationProgress::Failed`]; the watch
//!   itself succeeded and `watch_error` is `None`;
//! - the watch failed ([`MonitorError`]): the deadline passed or the status
//!   endpoint stayed unreachable. The last known response is still passed.
//!
//! A monitor cancelled at shutdown does not invoke its callbacks.
//!
//! The per-cluster [`OperationGuard`] stays held while callbacks run. A
//! callback that chains the next long-running step takes the guard from the
//! [`GuardSlot`] of its completion, so the cluster is never released between
//! chained operations.

mod supervisor;

pub use supervisor::{MonitorSupervisor, OperationGuard};

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::error::ControlResult;
use crate::operation::{OperationOutcome, OperationProgress};
use crate::types::{ClusterId, OrganizationId, RequestId};

/// Kind of long-running operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Infrastructure creation.
    Provision,
    /// Platform installation.
    Install,
    /// Node count change.
    Scale,
    /// Platform removal.
    Uninstall,
    /// Infrastructure release.
    Decommission,
}

impl OperationKind {
    /// Get the kind name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Provision => "provision",
            Self::Install => "install",
            Self::Scale => "scale",
            Self::Uninstall => "uninstall",
            Self::Decommission => "decommission",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of the watch itself, as opposed to a failed operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MonitorError {
    /// The operation did not finish within the watch deadline.
    #[error("operation still running after {0:?}")]
    TimedOut(Duration),

    /// Status polls kept failing.
    #[error("operation status unavailable after {attempts} attempts: {message}")]
    Unreachable {
        /// Consecutive failed polls.
        attempts: u32,
        /// Last poll error.
        message: String,
    },
}

/// Guard of a completed operation, shared by its callbacks.
///
/// Whatever is left in the slot after the last callback is released.
#[derive(Debug, Clone, Default)]
pub struct GuardSlot(Arc<Mutex<Option<OperationGuard>>>);

impl GuardSlot {
    fn new(guard: Option<OperationGuard>) -> Self {
        Self(Arc::new(Mutex::new(guard)))
    }

    /// Take over the guard for a chained operation of `kind`.
    ///
    /// Returns `None` when the monitor ran without a guard or another
    /// callback already took it.
    pub fn take(&self, kind: OperationKind) -> Option<OperationGuard> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .map(|guard| guard.transfer(kind))
    }

    /// Whether the guard is still in the slot.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn release(&self) {
        drop(self.0.lock().unwrap_or_else(PoisonError::into_inner).take());
    }
}

/// Final outcome handed to completion callbacks.
#[derive(Debug, Clone)]
pub struct Completion<R> {
    /// Kind of operation watched.
    pub kind: OperationKind,
    /// Request the operation belongs to.
    pub request_id: RequestId,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Target cluster.
    pub cluster_id: ClusterId,
    /// Last response observed.
    pub response: R,
    /// Set only when the watch failed.
    pub watch_error: Option<MonitorError>,
    /// Guard of the operation, held until the last callback returns.
    pub guard: GuardSlot,
}

impl<R: OperationOutcome> Completion<R> {
    /// Whether the operation finished successfully and was observed doing so.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.watch_error.is_none()
            && self.response.operation().progress == OperationProgress::Succeeded
    }

    /// Human-readable reason for an unsuccessful completion.
    #[must_use]
    pub fn failure_reason(&self) -> String {
        match &self.watch_error {
            Some(err) => err.to_string(),
            None => self
                .response
                .operation()
                .error
                .clone()
                .unwrap_or_else(|| format!("{} operation failed", self.kind)),
        }
    }
}

/// Queries the current status of a remote operation.
#[async_trait]
pub trait ProgressSource<R: OperationOutcome>: Send + Sync {
    /// Fetch the current response for the operation described by `last`.
    async fn progress(&self, last: &R) -> ControlResult<R>;
}

/// Continuation run once when a monitor completes.
pub trait CompletionCallback<R>: Send + 'static {
    /// Consume the callback with the final outcome.
    fn on_complete(self: Box<Self>, completion: Completion<R>) -> BoxFuture<'static, ()>;
}

impl<R, F, Fut> CompletionCallback<R> for F
where
    F: FnOnce(Completion<R>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn on_complete(self: Box<Self>, completion: Completion<R>) -> BoxFuture<'static, ()> {
        Box::pin((*self)(completion))
    }
}

/// Polling parameters of a monitor.
#[derive(Debug, Clone, Copy)]
pub struct MonitorSettings {
    /// Delay between polls.
    pub poll_interval: Duration,
    /// Longest the operation is watched.
    pub max_duration: Duration,
    /// Failed polls in a row tolerated before giving up.
    pub max_consecutive_failures: u32,
}

impl From<&MonitorConfig> for MonitorSettings {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            max_duration: config.max_duration(),
            max_consecutive_failures: config.max_consecutive_failures.max(1),
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self::from(&MonitorConfig::default())
    }
}

/// Watches one remote operation to completion.
pub struct OperationMonitor<R: OperationOutcome> {
    kind: OperationKind,
    source: Arc<dyn ProgressSource<R>>,
    last: R,
    callbacks: Vec<Box<dyn CompletionCallback<R>>>,
    settings: MonitorSettings,
}

impl<R: OperationOutcome> OperationMonitor<R> {
    /// Create a monitor from the response returned by the initiating call.
    #[must_use]
    pub fn new(
        kind: OperationKind,
        source: Arc<dyn ProgressSource<R>>,
        last: R,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            kind,
            source,
            last,
            callbacks: Vec::new(),
            settings,
        }
    }

    /// Register a callback. Callbacks run in registration order.
    pub fn register_callback(&mut self, callback: impl CompletionCallback<R>) {
        self.callbacks.push(Box::new(callback));
    }

    /// Builder form of [`register_callback`](Self::register_callback).
    #[must_use]
    pub fn with_callback(mut self, callback: impl CompletionCallback<R>) -> Self {
        self.register_callback(callback);
        self
    }

    /// Kind of operation watched.
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Response the monitor was created with.
    #[must_use]
    pub const fn initial(&self) -> &R {
        &self.last
    }

    /// Watch the operation and run the callbacks.
    ///
    /// `guard` is held while the callbacks run and released after the last
    /// one, unless a callback took it over. Returns `false` when cancelled
    /// before completion, in which case no callback runs.
    pub async fn run(self, cancel: CancellationToken, guard: Option<OperationGuard>) -> bool {
        let Self {
            kind,
            source,
            last,
            callbacks,
            settings,
        } = self;

        let handle = last.operation().clone();
        let Some((response, watch_error)) = watch(source.as_ref(), last, settings, &cancel).await
        else {
            info!("monitor cancelled, completion callbacks skipped");
            return false;
        };
        let guard = GuardSlot::new(guard);

        match &watch_error {
            Some(err) => warn!(error = %err, "watch failed"),
            None => info!(
                progress = %response.operation().progress,
                "operation finished"
            ),
        }

        let completion = Completion {
            kind,
            request_id: handle.request_id,
            organization_id: handle.organization_id,
            cluster_id: handle.cluster_id,
            response,
            watch_error,
            guard: guard.clone(),
        };

        for callback in callbacks {
            callback.on_complete(completion.clone()).await;
        }
        guard.release();
        true
    }
}

impl<R: OperationOutcome> fmt::Debug for OperationMonitor<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationMonitor")
            .field("kind", &self.kind)
            .field("last", &self.last)
            .field("callbacks", &self.callbacks.len())
            .finish_non_exhaustive()
    }
}

async fn watch<R: OperationOutcome>(
    source: &dyn ProgressSource<R>,
    mut last: R,
    settings: MonitorSettings,
    cancel: &CancellationToken,
) -> Option<(R, Option<MonitorError>)> {
    let outcome = {
        let polling = poll_until_terminal(source, &mut last, settings);
        tokio::select! {
            () = cancel.cancelled() => return None,
            result = tokio::time::timeout(settings.max_duration, polling) => result,
        }
    };

    match outcome {
        Ok(watch_error) => Some((last, watch_error)),
        Err(_) => Some((last, Some(MonitorError::TimedOut(settings.max_duration)))),
    }
}

async fn poll_until_terminal<R: OperationOutcome>(
    source: &dyn ProgressSource<R>,
    last: &mut R,
    settings: MonitorSettings,
) -> Option<MonitorError> {
    let mut failures = 0_u32;
    while !last.operation().progress.is_terminal() {
        tokio::time::sleep(settings.poll_interval).await;
        match source.progress(last).await {
            Ok(response) => {
                failures = 0;
                debug!(progress = %response.operation().progress, "operation progress");
                *last = response;
            }
            Err(err) => {
                failures += 1;
                warn!(error = %err, failures, "failed to poll operation status");
                if failures >= settings.max_consecutive_failures {
                    return Some(MonitorError::Unreachable {
                        attempts: failures,
                        message: err.to_string(),
                    });
                }
            }
        }
    }
    None
}
