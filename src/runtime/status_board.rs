//! Status mirror files.
//!
//! The sled store is locked by the process running the workflows, so other
//! processes (`bulletin status`) read these JSON mirrors instead. One file per
//! workflow: `<dir>/<workflow id>.json`.

use std::path::{Path, PathBuf};

use crate::atomic_file::write_atomically;
use crate::error::StorageError;
use crate::workflow::state::SectionSnapshot;

#[derive(Debug, Clone)]
pub struct StatusBoard {
    dir: PathBuf,
}

impl StatusBoard {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, workflow_id: &str) -> PathBuf {
        self.dir.join(format!("{workflow_id}.json"))
    }

    pub fn write(&self, snapshot: &SectionSnapshot) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| StorageError::from_serde(&snapshot.workflow_id, e))?;
        let path = self.path_for(&snapshot.workflow_id);
        write_atomically(&path, &bytes)?;
        Ok(())
    }

    pub fn read(&self, workflow_id: &str) -> Result<Option<SectionSnapshot>, StorageError> {
        let path = self.path_for(workflow_id);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read(&path)?;
        let snapshot =
            serde_json::from_slice(&raw).map_err(|e| StorageError::from_serde(workflow_id, e))?;
        Ok(Some(snapshot))
    }

    /// All mirrored snapshots, ordered by workflow id.
    pub fn read_all(&self) -> Result<Vec<SectionSnapshot>, StorageError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = std::fs::read(&path)?;
            let snapshot: SectionSnapshot = serde_json::from_slice(&raw)
                .map_err(|e| StorageError::from_serde(&path.display().to_string(), e))?;
            out.push(snapshot);
        }
        out.sort_by(|a, b| a.workflow_id.cmp(&b.workflow_id));
        Ok(out)
    }
}
