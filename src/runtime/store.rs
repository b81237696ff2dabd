//! Durable sled-backed workflow store.
//!
//! Three trees:
//! - `wf_executions`: one `ExecutionRecord` per workflow id
//! - `wf_activities`: memoized activity results keyed by run, cycle and activity
//! - `wf_signals`: control requests that must survive a restart

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sled::{Db, Tree};

use crate::content::ContentBatch;
use crate::error::StorageError;
use crate::workflow::state::{now_millis, ExecutionRecord};

const TREE_EXECUTIONS: &str = "wf_executions";
const TREE_ACTIVITIES: &str = "wf_activities";
const TREE_SIGNALS: &str = "wf_signals";
const CYCLE_KEY_PAD: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Generate,
    Publish,
}

impl ActivityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityKind::Generate => "generate",
            ActivityKind::Publish => "publish",
        }
    }
}

/// Completed activity result, replayed instead of re-invoking the activity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivityRecord {
    Generated { batch: ContentBatch },
    Published { item_count: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub stop_requested: bool,
    pub cancel_requested: bool,
    pub updated_at_ms: u64,
}

#[derive(Clone)]
pub struct WorkflowStore {
    db: Db,
    executions: Tree,
    activities: Tree,
    signals: Tree,
}

impl WorkflowStore {
    pub fn new(db: Db) -> Result<Self, StorageError> {
        let executions = db
            .open_tree(TREE_EXECUTIONS)
            .map_err(|e| StorageError::from_sled("open executions tree", e))?;
        let activities = db
            .open_tree(TREE_ACTIVITIES)
            .map_err(|e| StorageError::from_sled("open activities tree", e))?;
        let signals = db
            .open_tree(TREE_SIGNALS)
            .map_err(|e| StorageError::from_sled("open signals tree", e))?;
        Ok(Self {
            db,
            executions,
            activities,
            signals,
        })
    }

    /// Open (or create) the store at `path`.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let db = sled::open(path)
            .map_err(|e| StorageError::from_sled(&format!("open {}", path.display()), e))?;
        Self::new(db)
    }

    pub fn shared(db: Db) -> Result<Arc<Self>, StorageError> {
        Ok(Arc::new(Self::new(db)?))
    }

    pub fn put_execution(&self, record: &ExecutionRecord) -> Result<(), StorageError> {
        let value = serde_json::to_vec(record)
            .map_err(|e| StorageError::from_serde(&record.workflow_id, e))?;
        self.executions
            .insert(record.workflow_id.as_bytes(), value)
            .map_err(|e| StorageError::from_sled("write execution", e))?;
        Ok(())
    }

    pub fn get_execution(
        &self,
        workflow_id: &str,
    ) -> Result<Option<ExecutionRecord>, StorageError> {
        let Some(raw) = self
            .executions
            .get(workflow_id.as_bytes())
            .map_err(|e| StorageError::from_sled("read execution", e))?
        else {
            return Ok(None);
        };
        let parsed =
            serde_json::from_slice(&raw).map_err(|e| StorageError::from_serde(workflow_id, e))?;
        Ok(Some(parsed))
    }

    pub fn list_executions(&self) -> Result<Vec<ExecutionRecord>, StorageError> {
        let mut out = Vec::new();
        for result in self.executions.iter() {
            let (key, value) = result.map_err(|e| StorageError::from_sled("scan executions", e))?;
            let rec: ExecutionRecord = serde_json::from_slice(&value)
                .map_err(|e| StorageError::from_serde(&String::from_utf8_lossy(&key), e))?;
            out.push(rec);
        }
        out.sort_by(|a, b| a.workflow_id.cmp(&b.workflow_id));
        Ok(out)
    }

    pub fn record_activity(
        &self,
        run_id: &str,
        cycle: u64,
        kind: ActivityKind,
        record: &ActivityRecord,
    ) -> Result<(), StorageError> {
        let key = encode_activity_key(run_id, cycle, kind);
        let value = serde_json::to_vec(record).map_err(|e| StorageError::from_serde(&key, e))?;
        self.activities
            .insert(key.as_bytes(), value)
            .map_err(|e| StorageError::from_sled("write activity", e))?;
        Ok(())
    }

    pub fn get_activity(
        &self,
        run_id: &str,
        cycle: u64,
        kind: ActivityKind,
    ) -> Result<Option<ActivityRecord>, StorageError> {
        let key = encode_activity_key(run_id, cycle, kind);
        let Some(raw) = self
            .activities
            .get(key.as_bytes())
            .map_err(|e| StorageError::from_sled("read activity", e))?
        else {
            return Ok(None);
        };
        let parsed = serde_json::from_slice(&raw).map_err(|e| StorageError::from_serde(&key, e))?;
        Ok(Some(parsed))
    }

    /// Drop every ledger entry of a run. Returns the number removed.
    pub fn purge_run(&self, run_id: &str) -> Result<usize, StorageError> {
        let prefix = format!("{run_id}:");
        let keys: Vec<Vec<u8>> = self
            .activities
            .scan_prefix(prefix.as_bytes())
            .filter_map(|r| r.ok().map(|(k, _)| k.to_vec()))
            .collect();
        for key in &keys {
            self.activities
                .remove(key)
                .map_err(|e| StorageError::from_sled("purge activity", e))?;
        }
        Ok(keys.len())
    }

    /// Drop ledger entries whose run is not one of `live_runs`.
    pub fn purge_stale_runs(&self, live_runs: &HashSet<String>) -> Result<usize, StorageError> {
        let mut stale = Vec::new();
        for result in self.activities.iter() {
            let (key, _) = result.map_err(|e| StorageError::from_sled("scan activities", e))?;
            let text = String::from_utf8_lossy(&key);
            let run = text.split(':').next().unwrap_or_default();
            if !live_runs.contains(run) {
                stale.push(key.to_vec());
            }
        }
        for key in &stale {
            self.activities
                .remove(key)
                .map_err(|e| StorageError::from_sled("purge activity", e))?;
        }
        Ok(stale.len())
    }

    pub fn activity_count(&self) -> usize {
        self.activities.len()
    }

    pub fn put_signal(&self, workflow_id: &str, signal: &SignalRecord) -> Result<(), StorageError> {
        let value =
            serde_json::to_vec(signal).map_err(|e| StorageError::from_serde(workflow_id, e))?;
        self.signals
            .insert(workflow_id.as_bytes(), value)
            .map_err(|e| StorageError::from_sled("write signal", e))?;
        Ok(())
    }

    pub fn get_signal(&self, workflow_id: &str) -> Result<SignalRecord, StorageError> {
        let Some(raw) = self
            .signals
            .get(workflow_id.as_bytes())
            .map_err(|e| StorageError::from_sled("read signal", e))?
        else {
            return Ok(SignalRecord::default());
        };
        serde_json::from_slice(&raw).map_err(|e| StorageError::from_serde(workflow_id, e))
    }

    /// Read-modify-write of the signal record for `workflow_id`.
    pub fn update_signal(
        &self,
        workflow_id: &str,
        apply: impl FnOnce(&mut SignalRecord),
    ) -> Result<SignalRecord, StorageError> {
        let mut signal = self.get_signal(workflow_id)?;
        apply(&mut signal);
        signal.updated_at_ms = now_millis();
        self.put_signal(workflow_id, &signal)?;
        Ok(signal)
    }

    pub fn clear_signal(&self, workflow_id: &str) -> Result<(), StorageError> {
        self.signals
            .remove(workflow_id.as_bytes())
            .map_err(|e| StorageError::from_sled("clear signal", e))?;
        Ok(())
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.db
            .flush()
            .map_err(|e| StorageError::from_sled("flush", e))?;
        Ok(())
    }

    pub fn encode_activity_key(run_id: &str, cycle: u64, kind: ActivityKind) -> String {
        encode_activity_key(run_id, cycle, kind)
    }
}

fn encode_activity_key(run_id: &str, cycle: u64, kind: ActivityKind) -> String {
    format!("{run_id}:{cycle:0CYCLE_KEY_PAD$}:{}", kind.as_str())
}
