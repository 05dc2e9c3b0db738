//! Platform installer.
//!
//! Install and uninstall are both long-running operations that return an
//! [`OperationResponse`] handle. Uninstall is watched with the same progress
//! source as install.

mod http;

pub use http::HttpInstaller;

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::{ControlError, ControlResult};
use crate::mock::OperationScript;
use crate::monitor::ProgressSource;
use crate::operation::{OperationProgress, OperationResponse};
use crate::requests::{InstallRequest, UninstallClusterRequest};
use crate::types::{ClusterId, RequestId};

/// Trait for platform installer implementations.
#[async_trait]
pub trait Installer: Send + Sync {
    /// Start installing the platform.
    async fn install_cluster(&self, request: &InstallRequest) -> ControlResult<OperationResponse>;

    /// Start removing the platform.
    async fn uninstall_cluster(
        &self,
        request: &UninstallClusterRequest,
    ) -> ControlResult<OperationResponse>;

    /// Current status of an install or uninstall.
    async fn check_progress(&self, request_id: &RequestId) -> ControlResult<OperationResponse>;
}

/// Polls an installer operation.
pub struct InstallProgress(pub Arc<dyn Installer>);

#[async_trait]
impl ProgressSource<OperationResponse> for InstallProgress {
    async fn progress(&self, last: &OperationResponse) -> ControlResult<OperationResponse> {
        self.0.check_progress(&last.request_id).await
    }
}

/// Mock installer for testing.
///
/// Operations succeed after one status poll unless configured otherwise.
#[derive(Debug)]
pub struct MockInstaller {
    script: OperationScript,
    installs: RwLock<Vec<InstallRequest>>,
    uninstalls: RwLock<Vec<UninstallClusterRequest>>,
}

impl Default for MockInstaller {
    fn default() -> Self {
        Self {
            script: OperationScript::new("installer"),
            installs: RwLock::default(),
            uninstalls: RwLock::default(),
        }
    }
}

impl MockInstaller {
    /// Create a mock whose operations succeed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Terminal progress of operations started from now on.
    pub fn set_outcome(&self, outcome: OperationProgress) -> ControlResult<()> {
        self.script.set_outcome(outcome)
    }

    /// Number of polls before operations finish.
    pub fn set_polls_until_done(&self, polls: u32) -> ControlResult<()> {
        self.script.set_polls_until_done(polls)
    }

    /// Make install and uninstall calls fail.
    pub fn reject_calls(&self, reject: bool) -> ControlResult<()> {
        self.script.set_reject(reject)
    }

    /// Install requests received.
    pub fn installs(&self) -> ControlResult<Vec<InstallRequest>> {
        self.installs
            .read()
            .map(|r| r.clone())
            .map_err(|_| ControlError::internal("lock poisoned"))
    }

    /// Uninstall requests received.
    pub fn uninstalls(&self) -> ControlResult<Vec<UninstallClusterRequest>> {
        self.uninstalls
            .read()
            .map(|r| r.clone())
            .map_err(|_| ControlError::internal("lock poisoned"))
    }
}

fn handle(
    request_id: Option<&RequestId>,
    organization_id: &crate::types::OrganizationId,
    cluster_id: &ClusterId,
) -> ControlResult<OperationResponse> {
    let request_id = request_id
        .cloned()
        .ok_or_else(|| ControlError::invalid("request_id must be assigned"))?;
    Ok(OperationResponse::queued(
        request_id,
        organization_id.clone(),
        cluster_id.clone(),
    ))
}

#[async_trait]
impl Installer for MockInstaller {
    async fn install_cluster(&self, request: &InstallRequest) -> ControlResult<OperationResponse> {
        let cluster_id = request
            .cluster_id
            .clone()
            .ok_or_else(|| ControlError::invalid("cluster_id must be resolved"))?;
        self.installs
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))?
            .push(request.clone());
        self.script.start(handle(
            request.request_id.as_ref(),
            &request.organization_id,
            &cluster_id,
        )?)
    }

    async fn uninstall_cluster(
        &self,
        request: &UninstallClusterRequest,
    ) -> ControlResult<OperationResponse> {
        self.uninstalls
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))?
            .push(request.clone());
        self.script.start(handle(
            request.request_id.as_ref(),
            &request.organization_id,
            &request.cluster_id,
        )?)
    }

    async fn check_progress(&self, request_id: &RequestId) -> ControlResult<OperationResponse> {
        self.script.poll(request_id)
    }
}
