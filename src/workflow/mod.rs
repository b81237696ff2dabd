//! Per-section durable workflow.
//!
//! A workflow loops forever: run a cycle, commit, sleep, repeat. After a
//! configurable number of committed cycles it folds its state into a fresh
//! run under the same identity so history stays bounded.

pub mod control;
pub mod cycle;
pub mod orchestrator;
pub mod state;

pub use control::{ControlState, Interrupt};
pub use cycle::{CycleContext, CycleExecutor, CycleOutcome, RetryState};
pub use orchestrator::{RunOutcome, SectionWorkflow};
pub use state::{CumulativeState, ExecutionRecord, ExecutionStatus, Phase, SectionSnapshot};

use crate::runtime::status_board::StatusBoard;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// What a workflow does after a cycle exhausts its retries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Record the error, keep the unpublished batch and try again next cycle.
    #[default]
    Skip,
    /// End the workflow in the stopped state.
    Stop,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowSettings {
    pub cycle_interval: Duration,
    /// Committed cycles per run before folding
    pub fold_threshold: u64,
    pub failure_policy: FailurePolicy,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            cycle_interval: Duration::from_secs(30),
            fold_threshold: 10,
            failure_policy: FailurePolicy::Skip,
        }
    }
}

/// Latest committed view of a workflow, shared with query callers.
///
/// Writers replace the whole snapshot; readers clone it out, so a query never
/// observes a half-applied cycle.
#[derive(Clone)]
pub struct SnapshotCell {
    inner: Arc<RwLock<SectionSnapshot>>,
    board: Option<Arc<StatusBoard>>,
}

impl SnapshotCell {
    pub fn new(initial: SectionSnapshot, board: Option<Arc<StatusBoard>>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
            board,
        }
    }

    pub fn get(&self) -> SectionSnapshot {
        self.inner.read().clone()
    }

    pub fn set(&self, snapshot: SectionSnapshot) {
        if let Some(board) = &self.board {
            if let Err(err) = board.write(&snapshot) {
                warn!(workflow_id = %snapshot.workflow_id, error = %err, "Failed to mirror status");
            }
        }
        *self.inner.write() = snapshot;
    }
}
