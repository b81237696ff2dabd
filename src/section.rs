//! Section identity and workflow input.
//!
//! A section is one independent content stream ("Technology", "Sports", ...).
//! Every section maps to exactly one workflow identity in the runtime.

use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sections started when the configuration does not name any.
pub const DEFAULT_SECTIONS: [&str; 5] =
    ["Technology", "Sports", "Entertainment", "Business", "Health"];

const MAX_SECTION_LEN: usize = 64;

/// Validated, immutable section name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SectionId(String);

impl SectionId {
    pub fn new(name: impl Into<String>) -> Result<Self, ApiError> {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(ApiError::InvalidSection("section name cannot be empty".to_string()));
        }
        if trimmed.len() > MAX_SECTION_LEN {
            return Err(ApiError::InvalidSection(format!(
                "section name '{}' exceeds {} characters",
                trimmed, MAX_SECTION_LEN
            )));
        }
        if let Some(bad) = trimmed
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == ' ' || *c == '-' || *c == '_'))
        {
            return Err(ApiError::InvalidSection(format!(
                "section name '{}' contains unsupported character '{}'",
                trimmed, bad
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercase, dash-separated form used for workflow ids and file paths.
    pub fn slug(&self) -> String {
        self.0
            .to_ascii_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("-")
    }

    /// Durable workflow identity for this section.
    pub fn workflow_id(&self) -> String {
        format!("section-{}", self.slug())
    }
}

impl TryFrom<String> for SectionId {
    type Error = ApiError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        SectionId::new(value)
    }
}

impl From<SectionId> for String {
    fn from(value: SectionId) -> Self {
        value.0
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where published content lands (bucket + region for object storage).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishTarget {
    pub bucket: String,
    pub region: String,
}

impl PublishTarget {
    pub fn new(bucket: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: region.into(),
        }
    }
}

/// Input for one section workflow.
///
/// Re-supplied verbatim when a run folds into its successor, so everything a
/// run needs to be reconstructed must live here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowInput {
    pub section: SectionId,
    pub items_per_cycle: u32,
    pub publish_target: PublishTarget,
    #[serde(default)]
    pub model_id: String,
}

impl WorkflowInput {
    pub fn new(section: SectionId, items_per_cycle: u32, publish_target: PublishTarget) -> Self {
        Self {
            section,
            items_per_cycle,
            publish_target,
            model_id: String::new(),
        }
    }

    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        if self.items_per_cycle == 0 {
            return Err(ApiError::InvalidInput(format!(
                "items_per_cycle must be greater than zero for section '{}'",
                self.section
            )));
        }
        if self.publish_target.bucket.trim().is_empty() {
            return Err(ApiError::InvalidInput(format!(
                "publish target bucket is empty for section '{}'",
                self.section
            )));
        }
        Ok(())
    }
}
