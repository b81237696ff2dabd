//! Durable workflow state.
//!
//! `ExecutionRecord` is the single document persisted per workflow identity.
//! Each state transition rewrites it in one atomic insert; nothing else in
//! the record is ever updated piecemeal.

use crate::content::{flatten_batches, ContentBatch, ContentItem};
use crate::section::WorkflowInput;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static RUN_COUNTER: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Stopped,
    Cancelled,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Stopped => "stopped",
            ExecutionStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }
}

/// Where a run is in its loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    /// Next step is to begin a new cycle.
    Ready,
    /// Cycle `seq` has begun and has not been committed.
    InCycle { seq: u64 },
    /// Waiting for the inter-cycle deadline (wall clock, milliseconds).
    Sleeping { wake_at_ms: u64 },
}

/// Per-run accumulated state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CumulativeState {
    pub items: Vec<ContentBatch>,
    pub iteration_count: u64,
    pub running: bool,
}

impl CumulativeState {
    pub fn fresh() -> Self {
        Self {
            items: Vec::new(),
            iteration_count: 0,
            running: true,
        }
    }

    pub fn flattened(&self) -> Vec<ContentItem> {
        flatten_batches(&self.items)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub workflow_id: String,
    pub run_id: String,
    pub input: WorkflowInput,
    pub status: ExecutionStatus,
    pub state: CumulativeState,
    pub phase: Phase,
    /// Last cycle sequence started in this run
    pub cycle_seq: u64,
    /// Generated batch whose publish did not succeed yet
    pub pending: Option<ContentBatch>,
    /// Items most recently made visible by the Publisher
    pub last_published: Vec<ContentItem>,
    /// Content published by earlier runs; republished ahead of this run's batches
    #[serde(default)]
    pub published_base: Vec<ContentItem>,
    /// Number of folds since the workflow was started
    pub folds: u64,
    pub last_error: Option<String>,
    pub started_at_ms: u64,
    pub run_started_at_ms: u64,
    pub updated_at_ms: u64,
}

impl ExecutionRecord {
    /// Record for a brand-new workflow execution.
    pub fn new(input: WorkflowInput) -> Self {
        let now = now_millis();
        Self {
            workflow_id: input.section.workflow_id(),
            run_id: new_run_id(),
            input,
            status: ExecutionStatus::Running,
            state: CumulativeState::fresh(),
            phase: Phase::Ready,
            cycle_seq: 0,
            pending: None,
            last_published: Vec::new(),
            published_base: Vec::new(),
            folds: 0,
            last_error: None,
            started_at_ms: now,
            run_started_at_ms: now,
            updated_at_ms: now,
        }
    }

    /// Successor run produced by a fold.
    ///
    /// Keeps identity, input, visible content, any unpublished batch and the
    /// pending sleep; starts a fresh cumulative state under a new run id.
    pub fn folded(&self) -> Self {
        let now = now_millis();
        Self {
            workflow_id: self.workflow_id.clone(),
            run_id: new_run_id(),
            input: self.input.clone(),
            status: ExecutionStatus::Running,
            state: CumulativeState::fresh(),
            phase: self.phase.clone(),
            cycle_seq: 0,
            pending: self.pending.clone(),
            last_published: self.last_published.clone(),
            published_base: self.last_published.clone(),
            folds: self.folds + 1,
            last_error: self.last_error.clone(),
            started_at_ms: self.started_at_ms,
            run_started_at_ms: now,
            updated_at_ms: now,
        }
    }

    /// Everything the section shows once this run's batches are published.
    pub fn visible_items(&self) -> Vec<ContentItem> {
        let mut items = self.published_base.clone();
        items.extend(self.state.flattened());
        items
    }

    pub fn touch(&mut self) {
        self.updated_at_ms = now_millis();
    }
}

/// Read-only view of a section answered by status queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSnapshot {
    pub section: String,
    pub workflow_id: String,
    pub run_id: String,
    pub status: ExecutionStatus,
    pub running: bool,
    pub iteration_count: u64,
    pub batches: usize,
    /// Items committed in the current run, in order
    pub items: Vec<ContentItem>,
    pub last_published: Vec<ContentItem>,
    pub pending_unpublished: usize,
    pub folds: u64,
    pub last_error: Option<String>,
    pub updated_at_ms: u64,
}

impl SectionSnapshot {
    pub fn from_record(record: &ExecutionRecord) -> Self {
        Self {
            section: record.input.section.to_string(),
            workflow_id: record.workflow_id.clone(),
            run_id: record.run_id.clone(),
            status: record.status,
            running: record.state.running && record.status == ExecutionStatus::Running,
            iteration_count: record.state.iteration_count,
            batches: record.state.items.len(),
            items: record.state.flattened(),
            last_published: record.last_published.clone(),
            pending_unpublished: record.pending.as_ref().map(|b| b.len()).unwrap_or(0),
            folds: record.folds,
            last_error: record.last_error.clone(),
            updated_at_ms: record.updated_at_ms,
        }
    }
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub fn new_run_id() -> String {
    let ts = now_millis();
    let pid = std::process::id();
    let seq = RUN_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("run-{ts}-{pid}-{seq}")
}
