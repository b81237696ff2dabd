//! Directory-backed publisher.
//!
//! Stands in for object storage: each bucket is a directory under `root` and a
//! section's content is a single `index.json` that is replaced wholesale on
//! every publish.

use crate::activity::Publisher;
use crate::atomic_file::write_atomically;
use crate::content::ContentItem;
use crate::error::ActivityError;
use crate::section::{PublishTarget, SectionId};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Document written for each published section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedSection {
    pub section: String,
    pub region: String,
    pub published_at: String,
    pub items: Vec<ContentItem>,
}

#[derive(Debug, Clone)]
pub struct DirectoryPublisher {
    root: PathBuf,
}

impl DirectoryPublisher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of a section's published document.
    pub fn section_path(&self, section: &SectionId, target: &PublishTarget) -> PathBuf {
        self.root
            .join(&target.bucket)
            .join(section.slug())
            .join("index.json")
    }

    /// Read back what is currently published for a section.
    pub fn read(
        &self,
        section: &SectionId,
        target: &PublishTarget,
    ) -> Result<Option<PublishedSection>, ActivityError> {
        let path = self.section_path(section, target);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read(&path).map_err(|e| {
            ActivityError::Transient(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let doc = serde_json::from_slice(&raw).map_err(|e| {
            ActivityError::MalformedContent(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        Ok(Some(doc))
    }
}

fn validate_target(target: &PublishTarget) -> Result<(), ActivityError> {
    let bucket = target.bucket.trim();
    if bucket.is_empty() {
        return Err(ActivityError::Configuration("publish bucket is empty".to_string()));
    }
    if bucket.contains('/') || bucket.contains('\\') || bucket == "." || bucket == ".." {
        return Err(ActivityError::Configuration(format!(
            "publish bucket '{}' is not a valid bucket name",
            target.bucket
        )));
    }
    Ok(())
}

#[async_trait]
impl Publisher for DirectoryPublisher {
    async fn publish(
        &self,
        section: &SectionId,
        items: &[ContentItem],
        target: &PublishTarget,
    ) -> Result<(), ActivityError> {
        validate_target(target)?;

        let doc = PublishedSection {
            section: section.to_string(),
            region: target.region.clone(),
            published_at: Utc::now().to_rfc3339(),
            items: items.to_vec(),
        };
        let bytes = serde_json::to_vec_pretty(&doc)
            .map_err(|e| ActivityError::Transient(format!("Failed to encode section: {}", e)))?;
        let path = self.section_path(section, target);

        let write_path = path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&write_path, &bytes))
            .await
            .map_err(|e| ActivityError::Transient(format!("Publish task failed: {}", e)))?
            .map_err(|e| {
                ActivityError::Transient(format!("Failed to write {}: {}", path.display(), e))
            })?;

        info!(
            section = %section,
            bucket = %target.bucket,
            items = items.len(),
            path = %path.display(),
            "Published section"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "directory"
    }
}
