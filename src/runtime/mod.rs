//! Worker runtime: hosts section workflows, enforces one live execution per
//! workflow identity, and routes queries and control signals to them.
//!
//! Durable state lives in [`WorkflowStore`]. A process that restarts calls
//! [`WorkerRuntime::recover`] to pick up every execution still marked running.

pub mod status_board;
pub mod store;

pub use status_board::StatusBoard;
pub use store::WorkflowStore;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::activity::{Generator, Publisher};
use crate::error::ApiError;
use crate::retry::RetryPolicy;
use crate::section::WorkflowInput;
use crate::workflow::control::{self, ControlReceiver, ControlSender, ControlState};
use crate::workflow::{
    CycleExecutor, ExecutionRecord, ExecutionStatus, RunOutcome, SectionSnapshot, SectionWorkflow,
    SnapshotCell, WorkflowSettings,
};

/// Runtime tuning shared by every workflow it hosts
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub retry: RetryPolicy,
    pub activity_timeout: Duration,
    pub workflow: WorkflowSettings,
    /// Directory for status mirror files; `None` disables mirroring
    pub status_dir: Option<PathBuf>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            activity_timeout: Duration::from_secs(60),
            workflow: WorkflowSettings::default(),
            status_dir: None,
        }
    }
}

/// Why a workflow task ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowExit {
    Finished(ExecutionStatus),
    Parked,
    Faulted(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowDescription {
    pub workflow_id: String,
    pub run_id: String,
    pub status: ExecutionStatus,
    /// A task in this process is driving the workflow
    pub live: bool,
    pub folds: u64,
    pub updated_at_ms: u64,
}

struct LiveWorkflow {
    control: ControlSender,
    snapshot: SnapshotCell,
    exit: watch::Receiver<Option<WorkflowExit>>,
    task: Option<JoinHandle<()>>,
}

impl LiveWorkflow {
    fn is_active(&self) -> bool {
        self.exit.borrow().is_none()
    }
}

pub struct WorkerRuntime {
    store: Arc<WorkflowStore>,
    executor: Arc<CycleExecutor>,
    settings: WorkflowSettings,
    board: Option<Arc<StatusBoard>>,
    live: Mutex<HashMap<String, LiveWorkflow>>,
}

impl WorkerRuntime {
    pub fn new(
        store: Arc<WorkflowStore>,
        generator: Arc<dyn Generator>,
        publisher: Arc<dyn Publisher>,
        options: RuntimeOptions,
    ) -> Self {
        let executor = Arc::new(CycleExecutor::new(
            generator,
            publisher,
            options.retry,
            options.activity_timeout,
            store.clone(),
        ));
        Self {
            store,
            executor,
            settings: options.workflow,
            board: options.status_dir.map(|dir| Arc::new(StatusBoard::new(dir))),
            live: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<WorkflowStore> {
        &self.store
    }

    /// Start a fresh execution for the input's section.
    ///
    /// Fails with [`ApiError::AlreadyRunning`] when an execution with the same
    /// identity is live in this process or still marked running in the store.
    pub fn start_workflow(&self, input: WorkflowInput) -> Result<String, ApiError> {
        let workflow_id = input.section.workflow_id();
        let mut live = self.live.lock();
        if live.get(&workflow_id).map(LiveWorkflow::is_active).unwrap_or(false) {
            return Err(ApiError::AlreadyRunning(workflow_id));
        }

        let previous = self.store.get_execution(&workflow_id)?;
        if let Some(prev) = &previous {
            if prev.status == ExecutionStatus::Running {
                return Err(ApiError::AlreadyRunning(format!(
                    "{} (run {} awaiting recovery)",
                    workflow_id, prev.run_id
                )));
            }
            self.store.purge_run(&prev.run_id)?;
        }

        let mut record = ExecutionRecord::new(input);
        if let Some(prev) = previous {
            record.last_published = prev.last_published;
            record.pending = prev.pending;
        }
        self.store.clear_signal(&workflow_id)?;
        self.store.put_execution(&record)?;
        self.store.flush()?;

        info!(
            workflow_id = %workflow_id,
            run_id = %record.run_id,
            items_per_cycle = record.input.items_per_cycle,
            bucket = %record.input.publish_target.bucket,
            "Starting workflow"
        );
        let entry = self.spawn(record, ControlState::default());
        live.insert(workflow_id.clone(), entry);
        Ok(workflow_id)
    }

    /// Resume every execution the store still marks as running.
    pub fn recover(&self) -> Result<Vec<String>, ApiError> {
        let records = self.store.list_executions()?;
        let mut live = self.live.lock();

        if !live.values().any(LiveWorkflow::is_active) {
            let current: HashSet<String> = records
                .iter()
                .filter(|r| r.status == ExecutionStatus::Running)
                .map(|r| r.run_id.clone())
                .collect();
            let purged = self.store.purge_stale_runs(&current)?;
            if purged > 0 {
                info!(purged, "Purged ledger entries of finished runs");
            }
        }

        let mut resumed = Vec::new();
        for record in records {
            if record.status != ExecutionStatus::Running {
                continue;
            }
            if live.get(&record.workflow_id).map(LiveWorkflow::is_active).unwrap_or(false) {
                continue;
            }
            let workflow_id = record.workflow_id.clone();
            let entry = self.resume_record(record)?;
            live.insert(workflow_id.clone(), entry);
            resumed.push(workflow_id);
        }
        Ok(resumed)
    }

    /// Resume a single durable execution if it is running but not live.
    ///
    /// Returns `true` when a task was spawned.
    pub fn resume(&self, workflow_id: &str) -> Result<bool, ApiError> {
        let mut live = self.live.lock();
        if live.get(workflow_id).map(LiveWorkflow::is_active).unwrap_or(false) {
            return Ok(false);
        }
        let Some(record) = self.store.get_execution(workflow_id)? else {
            return Err(ApiError::WorkflowNotFound(workflow_id.to_string()));
        };
        if record.status != ExecutionStatus::Running {
            return Ok(false);
        }
        let entry = self.resume_record(record)?;
        live.insert(workflow_id.to_string(), entry);
        Ok(true)
    }

    fn resume_record(&self, record: ExecutionRecord) -> Result<LiveWorkflow, ApiError> {
        let signal = self.store.get_signal(&record.workflow_id)?;
        let initial = ControlState {
            stop: signal.stop_requested,
            cancel: signal.cancel_requested,
            shutdown: false,
        };
        info!(
            workflow_id = %record.workflow_id,
            run_id = %record.run_id,
            phase = ?record.phase,
            iteration = record.state.iteration_count,
            "Resuming workflow"
        );
        Ok(self.spawn(record, initial))
    }

    fn spawn(&self, record: ExecutionRecord, initial: ControlState) -> LiveWorkflow {
        let (control_tx, control_rx) = control::channel(initial);
        let (exit_tx, exit_rx) = watch::channel(None);
        let snapshot = SnapshotCell::new(SectionSnapshot::from_record(&record), self.board.clone());

        let executor = self.executor.clone();
        let store = self.store.clone();
        let settings = self.settings.clone();
        let cell = snapshot.clone();
        let task = tokio::spawn(async move {
            let exit = drive(record, executor, store, settings, cell, control_rx).await;
            let _ = exit_tx.send(Some(exit));
        });

        LiveWorkflow {
            control: control_tx,
            snapshot,
            exit: exit_rx,
            task: Some(task),
        }
    }

    pub fn describe(&self, workflow_id: &str) -> Result<Option<WorkflowDescription>, ApiError> {
        let Some(record) = self.store.get_execution(workflow_id)? else {
            return Ok(None);
        };
        let live = self
            .live
            .lock()
            .get(workflow_id)
            .map(LiveWorkflow::is_active)
            .unwrap_or(false);
        Ok(Some(WorkflowDescription {
            workflow_id: record.workflow_id,
            run_id: record.run_id,
            status: record.status,
            live,
            folds: record.folds,
            updated_at_ms: record.updated_at_ms,
        }))
    }

    /// Latest committed snapshot of a workflow.
    pub fn query(&self, workflow_id: &str) -> Result<SectionSnapshot, ApiError> {
        if let Some(entry) = self.live.lock().get(workflow_id) {
            return Ok(entry.snapshot.get());
        }
        match self.store.get_execution(workflow_id)? {
            Some(record) => Ok(SectionSnapshot::from_record(&record)),
            None => Err(ApiError::WorkflowNotFound(workflow_id.to_string())),
        }
    }

    /// Ask a workflow to stop after its current cycle.
    pub fn signal_stop(&self, workflow_id: &str) -> Result<(), ApiError> {
        self.signal(workflow_id, "stop", |c| c.stop = true)
    }

    /// Ask a workflow to stop at its next suspension point.
    pub fn cancel(&self, workflow_id: &str) -> Result<(), ApiError> {
        self.signal(workflow_id, "cancel", |c| c.cancel = true)
    }

    fn signal(
        &self,
        workflow_id: &str,
        name: &str,
        apply: impl Fn(&mut ControlState),
    ) -> Result<(), ApiError> {
        let Some(record) = self.store.get_execution(workflow_id)? else {
            return Err(ApiError::WorkflowNotFound(workflow_id.to_string()));
        };
        if record.status.is_terminal() {
            return Ok(());
        }

        let mut requested = ControlState::default();
        apply(&mut requested);
        self.store.update_signal(workflow_id, |s| {
            s.stop_requested |= requested.stop;
            s.cancel_requested |= requested.cancel;
        })?;
        self.store.flush()?;

        if let Some(entry) = self.live.lock().get(workflow_id) {
            entry.control.send_modify(|c| apply(c));
        }
        info!(workflow_id, signal = name, "Signal delivered");
        Ok(())
    }

    /// Wait for the live task of `workflow_id` to end.
    pub async fn wait(&self, workflow_id: &str) -> Result<WorkflowExit, ApiError> {
        let mut exit = self
            .live
            .lock()
            .get(workflow_id)
            .map(|entry| entry.exit.clone())
            .ok_or_else(|| ApiError::WorkflowNotFound(workflow_id.to_string()))?;
        let value = exit
            .wait_for(Option::is_some)
            .await
            .map_err(|_| ApiError::RuntimeError(format!("workflow task {} vanished", workflow_id)))?
            .clone();
        value.ok_or_else(|| {
            ApiError::RuntimeError(format!("workflow task {} vanished", workflow_id))
        })
    }

    pub fn is_live(&self, workflow_id: &str) -> bool {
        self.live
            .lock()
            .get(workflow_id)
            .map(LiveWorkflow::is_active)
            .unwrap_or(false)
    }

    pub fn list(&self) -> Result<Vec<WorkflowDescription>, ApiError> {
        let mut out = Vec::new();
        for record in self.store.list_executions()? {
            if let Some(desc) = self.describe(&record.workflow_id)? {
                out.push(desc);
            }
        }
        Ok(out)
    }

    /// Park every live workflow and wait for their tasks to return.
    ///
    /// Durable state is left as is; the next process resumes it.
    pub async fn shutdown(&self) -> Result<(), ApiError> {
        let tasks: Vec<JoinHandle<()>> = {
            let mut live = self.live.lock();
            live.values_mut()
                .filter_map(|entry| {
                    entry.control.send_modify(|c| c.shutdown = true);
                    entry.task.take()
                })
                .collect()
        };
        info!(workflows = tasks.len(), "Shutting down workflows");
        for result in futures::future::join_all(tasks).await {
            if let Err(err) = result {
                error!(error = %err, "Workflow task failed during shutdown");
            }
        }
        self.store.flush()?;
        Ok(())
    }
}

/// Drive a workflow identity across folds until it finishes or parks.
async fn drive(
    mut record: ExecutionRecord,
    executor: Arc<CycleExecutor>,
    store: Arc<WorkflowStore>,
    settings: WorkflowSettings,
    snapshot: SnapshotCell,
    control: ControlReceiver,
) -> WorkflowExit {
    loop {
        let workflow_id = record.workflow_id.clone();
        let workflow = SectionWorkflow::new(
            record,
            executor.clone(),
            store.clone(),
            settings.clone(),
            snapshot.clone(),
            control.clone(),
        );
        match workflow.run().await {
            Ok(RunOutcome::Folded(next)) => record = next,
            Ok(RunOutcome::Finished(status)) => return WorkflowExit::Finished(status),
            Ok(RunOutcome::Parked) => return WorkflowExit::Parked,
            Err(err) => {
                error!(
                    workflow_id = %workflow_id,
                    error = %err,
                    "Workflow faulted on storage error"
                );
                return WorkflowExit::Faulted(err.to_string());
            }
        }
    }
}
