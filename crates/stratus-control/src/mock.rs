//! Scripted operation ledger behind the mock collaborators.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{ControlError, ControlResult};
use crate::operation::{OperationProgress, OperationResponse};
use crate::types::RequestId;

#[derive(Debug)]
struct Tracked {
    handle: OperationResponse,
    polls: u32,
}

/// Tracks operations started against a mock and resolves them after a
/// configurable number of status polls.
#[derive(Debug)]
pub(crate) struct OperationScript {
    service: &'static str,
    operations: RwLock<HashMap<RequestId, Tracked>>,
    settings: RwLock<ScriptSettings>,
}

#[derive(Debug, Clone, Copy)]
struct ScriptSettings {
    outcome: OperationProgress,
    polls_until_done: u32,
    reject: bool,
}

impl OperationScript {
    pub(crate) fn new(service: &'static str) -> Self {
        Self {
            service,
            operations: RwLock::new(HashMap::new()),
            settings: RwLock::new(ScriptSettings {
                outcome: OperationProgress::Succeeded,
                polls_until_done: 1,
                reject: false,
            }),
        }
    }

    fn settings(&self) -> ControlResult<ScriptSettings> {
        self.settings
            .read()
            .map(|s| *s)
            .map_err(|_| ControlError::internal("lock poisoned"))
    }

    fn update(&self, f: impl FnOnce(&mut ScriptSettings)) -> ControlResult<()> {
        let mut settings = self
            .settings
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))?;
        f(&mut settings);
        Ok(())
    }

    /// Terminal progress reported by operations started from now on.
    pub(crate) fn set_outcome(&self, outcome: OperationProgress) -> ControlResult<()> {
        self.update(|s| s.outcome = outcome)
    }

    /// Number of status polls before an operation reports its outcome.
    pub(crate) fn set_polls_until_done(&self, polls: u32) -> ControlResult<()> {
        self.update(|s| s.polls_until_done = polls)
    }

    /// Make the initiating call fail.
    pub(crate) fn set_reject(&self, reject: bool) -> ControlResult<()> {
        self.update(|s| s.reject = reject)
    }

    /// Accept a new operation, or fail when rejecting.
    pub(crate) fn start(&self, handle: OperationResponse) -> ControlResult<OperationResponse> {
        if self.settings()?.reject {
            return Err(ControlError::upstream(self.service, "operation rejected"));
        }
        let handle = handle.with_progress(OperationProgress::InProgress);
        self.operations
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))?
            .insert(
                handle.request_id.clone(),
                Tracked {
                    handle: handle.clone(),
                    polls: 0,
                },
            );
        Ok(handle)
    }

    /// Advance and report an operation.
    pub(crate) fn poll(&self, request_id: &RequestId) -> ControlResult<OperationResponse> {
        let settings = self.settings()?;
        let mut operations = self
            .operations
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))?;
        let tracked = operations
            .get_mut(request_id)
            .ok_or_else(|| ControlError::NotFound(format!("operation {request_id}")))?;

        tracked.polls += 1;
        if tracked.polls >= settings.polls_until_done && !tracked.handle.progress.is_terminal() {
            tracked.handle.progress = settings.outcome;
            if settings.outcome == OperationProgress::Failed {
                tracked.handle.error = Some(format!("{} operation failed", self.service));
            }
        }
        Ok(tracked.handle.clone())
    }

    /// Number of operations started.
    #[cfg(test)]
    pub(crate) fn started(&self) -> usize {
        self.operations.read().map(|ops| ops.len()).unwrap_or(0)
    }
}
