//! Section scheduler: make sure every configured section has exactly one
//! running workflow, attaching to existing ones instead of starting duplicates.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::runtime::WorkerRuntime;
use crate::section::WorkflowInput;
use crate::workflow::ExecutionStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnsureAction {
    /// A fresh execution was started.
    Started,
    /// An execution was already running (possibly resumed from the store).
    Attached,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnsureReport {
    pub section: String,
    pub workflow_id: String,
    pub action: EnsureAction,
}

pub struct SectionScheduler {
    runtime: Arc<WorkerRuntime>,
}

impl SectionScheduler {
    pub fn new(runtime: Arc<WorkerRuntime>) -> Self {
        Self { runtime }
    }

    /// Attach to or start the workflow for one section.
    pub fn ensure(&self, input: WorkflowInput) -> Result<EnsureReport, ApiError> {
        let section = input.section.to_string();
        let workflow_id = input.section.workflow_id();
        let report = |action| EnsureReport {
            section: section.clone(),
            workflow_id: workflow_id.clone(),
            action,
        };

        if let Some(desc) = self.runtime.describe(&workflow_id)? {
            if desc.status == ExecutionStatus::Running {
                if !desc.live {
                    self.runtime.resume(&workflow_id)?;
                }
                info!(
                    workflow_id = %workflow_id,
                    run_id = %desc.run_id,
                    "Attached to running workflow"
                );
                return Ok(report(EnsureAction::Attached));
            }
        }

        match self.runtime.start_workflow(input) {
            Ok(_) => Ok(report(EnsureAction::Started)),
            Err(ApiError::AlreadyRunning(_)) => {
                info!(workflow_id = %workflow_id, "Workflow started concurrently; attaching");
                Ok(report(EnsureAction::Attached))
            }
            Err(err) => Err(err),
        }
    }

    /// Ensure every input, independently. One section failing does not block the rest.
    pub fn ensure_all(
        &self,
        inputs: impl IntoIterator<Item = WorkflowInput>,
    ) -> Vec<Result<EnsureReport, ApiError>> {
        inputs
            .into_iter()
            .map(|input| {
                let section = input.section.to_string();
                let result = self.ensure(input);
                if let Err(err) = &result {
                    warn!(section = %section, error = %err, "Failed to ensure workflow");
                }
                result
            })
            .collect()
    }
}
