//! Section workflow state machine.
//!
//! One `SectionWorkflow` drives a single run of a workflow identity:
//!
//! ```text
//! Ready -> InCycle{seq} -> Sleeping{wake_at} -> Ready -> ...
//!                                  |
//!                                  +-> fold (new run) / stop / cancel
//! ```
//!
//! Every transition is persisted as one `ExecutionRecord` write before the
//! snapshot visible to queries is replaced.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::error::StorageError;
use crate::runtime::store::WorkflowStore;
use crate::workflow::control::{sleep_unless, ControlReceiver, ControlState, Interrupt};
use crate::workflow::cycle::{CycleContext, CycleExecutor, CycleOutcome};
use crate::workflow::state::{now_millis, ExecutionRecord, ExecutionStatus, Phase, SectionSnapshot};
use crate::workflow::{FailurePolicy, SnapshotCell, WorkflowSettings};

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// State folded into a successor run, already persisted.
    Folded(ExecutionRecord),
    /// Terminal status reached and persisted.
    Finished(ExecutionStatus),
    /// Process shutdown; durable state left for the next process to resume.
    Parked,
}

pub struct SectionWorkflow {
    record: ExecutionRecord,
    executor: Arc<CycleExecutor>,
    store: Arc<WorkflowStore>,
    settings: WorkflowSettings,
    snapshot: SnapshotCell,
    control: ControlReceiver,
}

impl SectionWorkflow {
    pub fn new(
        record: ExecutionRecord,
        executor: Arc<CycleExecutor>,
        store: Arc<WorkflowStore>,
        settings: WorkflowSettings,
        snapshot: SnapshotCell,
        control: ControlReceiver,
    ) -> Self {
        Self {
            record,
            executor,
            store,
            settings,
            snapshot,
            control,
        }
    }

    pub fn record(&self) -> &ExecutionRecord {
        &self.record
    }

    pub async fn run(mut self) -> Result<RunOutcome, StorageError> {
        if let Err(err) = self.record.input.validate() {
            error!(
                workflow_id = %self.record.workflow_id,
                error = %err,
                "Rejecting workflow input"
            );
            return self.finish(ExecutionStatus::Stopped, Some(err.to_string()));
        }

        info!(
            workflow_id = %self.record.workflow_id,
            run_id = %self.record.run_id,
            phase = ?self.record.phase,
            folds = self.record.folds,
            "Workflow run started"
        );
        self.snapshot.set(SectionSnapshot::from_record(&self.record));

        loop {
            match self.record.phase.clone() {
                Phase::Ready => {
                    if let Some(interrupt) = self.control_state().between_cycles() {
                        return self.interrupted(interrupt);
                    }
                    let seq = self.record.cycle_seq + 1;
                    self.record.cycle_seq = seq;
                    self.record.phase = Phase::InCycle { seq };
                    self.commit()?;
                }
                Phase::InCycle { seq } => {
                    let ctx = CycleContext {
                        workflow_id: &self.record.workflow_id,
                        run_id: &self.record.run_id,
                        seq,
                        input: &self.record.input,
                        base: &self.record.published_base,
                        committed: &self.record.state.items,
                        carried: self.record.pending.clone(),
                    };
                    let outcome = self.executor.run(ctx, &mut self.control).await?;
                    if let Some(done) = self.apply(seq, outcome)? {
                        return Ok(done);
                    }
                }
                Phase::Sleeping { wake_at_ms } => {
                    if let Some(interrupt) = self.control_state().between_cycles() {
                        return self.interrupted(interrupt);
                    }
                    if self.record.state.iteration_count >= self.settings.fold_threshold {
                        return self.fold().map(RunOutcome::Folded);
                    }
                    let remaining = Duration::from_millis(wake_at_ms.saturating_sub(now_millis()));
                    let slept = sleep_unless(&mut self.control, remaining, |c| {
                        c.between_cycles().is_some()
                    })
                    .await;
                    if slept {
                        // Not persisted: a past deadline already means "start now".
                        self.record.phase = Phase::Ready;
                    }
                }
            }
        }
    }

    fn apply(
        &mut self,
        seq: u64,
        outcome: CycleOutcome,
    ) -> Result<Option<RunOutcome>, StorageError> {
        match outcome {
            CycleOutcome::Success(batch) => {
                let added = batch.len();
                self.record.state.items.push(batch);
                self.record.state.iteration_count += 1;
                self.record.last_published = self.record.visible_items();
                self.record.pending = None;
                self.record.last_error = None;
                self.record.phase = self.next_sleep();
                self.commit()?;
                info!(
                    workflow_id = %self.record.workflow_id,
                    run_id = %self.record.run_id,
                    seq,
                    iteration = self.record.state.iteration_count,
                    added,
                    total = self.record.last_published.len(),
                    "Cycle committed"
                );
                Ok(None)
            }
            CycleOutcome::FatalFailure { error, unpublished } => {
                if let Some(batch) = unpublished {
                    self.record.pending = Some(batch);
                }
                self.record.last_error = Some(error.to_string());
                if error.is_configuration() || self.settings.failure_policy == FailurePolicy::Stop {
                    error!(
                        workflow_id = %self.record.workflow_id,
                        seq,
                        error = %error,
                        "Cycle failed; stopping workflow"
                    );
                    return self.finish(ExecutionStatus::Stopped, None).map(Some);
                }
                warn!(
                    workflow_id = %self.record.workflow_id,
                    seq,
                    error = %error,
                    pending = self.record.pending.as_ref().map(|b| b.len()).unwrap_or(0),
                    "Cycle failed; continuing with next cycle"
                );
                self.record.phase = self.next_sleep();
                self.commit()?;
                Ok(None)
            }
            CycleOutcome::RetryableFailure { error, .. } => {
                // The executor resolves retries itself; treat a leak as a failed cycle.
                self.apply(
                    seq,
                    CycleOutcome::FatalFailure {
                        error,
                        unpublished: None,
                    },
                )
            }
            CycleOutcome::Interrupted { generated } => {
                match self.control_state().within_cycle() {
                    Some(Interrupt::Cancel) => {
                        if let Some(batch) = generated {
                            self.record.pending = Some(batch);
                        }
                        self.finish(ExecutionStatus::Cancelled, None).map(Some)
                    }
                    _ => {
                        info!(
                            workflow_id = %self.record.workflow_id,
                            seq,
                            "Parking mid-cycle; completed activities stay in the ledger"
                        );
                        Ok(Some(RunOutcome::Parked))
                    }
                }
            }
        }
    }

    fn interrupted(&mut self, interrupt: Interrupt) -> Result<RunOutcome, StorageError> {
        match interrupt {
            Interrupt::Stop => self.finish(ExecutionStatus::Stopped, None),
            Interrupt::Cancel => self.finish(ExecutionStatus::Cancelled, None),
            Interrupt::Shutdown => {
                info!(
                    workflow_id = %self.record.workflow_id,
                    run_id = %self.record.run_id,
                    "Parking workflow for shutdown"
                );
                self.snapshot.set(SectionSnapshot::from_record(&self.record));
                Ok(RunOutcome::Parked)
            }
        }
    }

    fn finish(
        &mut self,
        status: ExecutionStatus,
        error: Option<String>,
    ) -> Result<RunOutcome, StorageError> {
        self.record.status = status;
        self.record.state.running = false;
        if error.is_some() {
            self.record.last_error = error;
        }
        self.commit()?;
        info!(
            workflow_id = %self.record.workflow_id,
            run_id = %self.record.run_id,
            status = status.as_str(),
            iteration = self.record.state.iteration_count,
            "Workflow finished"
        );
        Ok(RunOutcome::Finished(status))
    }

    fn fold(&mut self) -> Result<ExecutionRecord, StorageError> {
        let next = self.record.folded();
        self.store.put_execution(&next)?;
        self.store.flush()?;
        let purged = self.store.purge_run(&self.record.run_id)?;
        info!(
            workflow_id = %self.record.workflow_id,
            from_run = %self.record.run_id,
            to_run = %next.run_id,
            folds = next.folds,
            purged,
            "Folded workflow into a new run"
        );
        Ok(next)
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        self.record.touch();
        self.store.put_execution(&self.record)?;
        self.store.flush()?;
        self.snapshot.set(SectionSnapshot::from_record(&self.record));
        Ok(())
    }

    fn next_sleep(&self) -> Phase {
        Phase::Sleeping {
            wake_at_ms: now_millis() + self.settings.cycle_interval.as_millis() as u64,
        }
    }

    fn control_state(&self) -> ControlState {
        *self.control.borrow()
    }
}
