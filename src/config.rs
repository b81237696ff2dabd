//! Configuration System
//!
//! Layered configuration built with the `config` crate. Later layers win:
//! built-in defaults, global file, workspace files, then `BULLETIN__*`
//! environment variables. An explicit file replaces the file layers.

use crate::error::ApiError;
use crate::logging::LoggingConfig;
use crate::retry::RetryPolicy;
use crate::runtime::RuntimeOptions;
use crate::section::{PublishTarget, SectionId, WorkflowInput, DEFAULT_SECTIONS};
use crate::workflow::{FailurePolicy, WorkflowSettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod merge;
mod sources;

pub use sources::global_file::global_config_path;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulletinConfig {
    /// Sections to keep running
    #[serde(default = "default_sections")]
    pub sections: Vec<String>,

    #[serde(default)]
    pub workflow: WorkflowConfig,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub generator: GeneratorConfig,

    #[serde(default)]
    pub publish: PublishConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_sections() -> Vec<String> {
    DEFAULT_SECTIONS.iter().map(|s| s.to_string()).collect()
}

/// Per-workflow loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_items_per_cycle")]
    pub items_per_cycle: u32,

    /// Sleep between cycles (milliseconds)
    #[serde(default = "default_cycle_interval_ms")]
    pub cycle_interval_ms: u64,

    /// Committed cycles before the workflow folds into a fresh run
    #[serde(default = "default_fold_threshold")]
    pub fold_threshold: u64,

    /// Upper bound on a single activity attempt (milliseconds)
    #[serde(default = "default_activity_timeout_ms")]
    pub activity_timeout_ms: u64,

    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

fn default_items_per_cycle() -> u32 {
    1
}

fn default_cycle_interval_ms() -> u64 {
    30_000
}

fn default_fold_threshold() -> u64 {
    10
}

fn default_activity_timeout_ms() -> u64 {
    60_000
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            items_per_cycle: default_items_per_cycle(),
            cycle_interval_ms: default_cycle_interval_ms(),
            fold_threshold: default_fold_threshold(),
            activity_timeout_ms: default_activity_timeout_ms(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorKind {
    /// Built-in offline sample generator
    #[default]
    Template,
    /// HTTP content service at `endpoint`
    Http,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default)]
    pub kind: GeneratorKind,

    #[serde(default)]
    pub endpoint: Option<String>,

    /// Passed through to the content source
    #[serde(default)]
    pub model_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    #[serde(default = "default_bucket")]
    pub bucket: String,

    #[serde(default = "default_region")]
    pub region: String,

    /// Directory holding published buckets; defaults to `<data_dir>/published`
    #[serde(default)]
    pub root: Option<PathBuf>,
}

fn default_bucket() -> String {
    "agentic-hackathon-wlg".to_string()
}

fn default_region() -> String {
    "ap-southeast-2".to_string()
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            region: default_region(),
            root: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root for the workflow store, status mirrors and published output
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl Default for BulletinConfig {
    fn default() -> Self {
        Self {
            sections: default_sections(),
            workflow: WorkflowConfig::default(),
            retry: RetryPolicy::default(),
            generator: GeneratorConfig::default(),
            publish: PublishConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Section(String, String),
    Workflow(String),
    Retry(String),
    Generator(String),
    Publish(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Section(name, msg) => write!(f, "Section '{}': {}", name, msg),
            ValidationError::Workflow(msg) => write!(f, "Workflow: {}", msg),
            ValidationError::Retry(msg) => write!(f, "Retry: {}", msg),
            ValidationError::Generator(msg) => write!(f, "Generator: {}", msg),
            ValidationError::Publish(msg) => write!(f, "Publish: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl BulletinConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.sections.is_empty() {
            errors.push(ValidationError::Section(
                String::new(),
                "at least one section is required".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for name in &self.sections {
            match SectionId::new(name.as_str()) {
                Ok(id) => {
                    if !seen.insert(id.workflow_id()) {
                        errors.push(ValidationError::Section(
                            name.clone(),
                            "maps to the same workflow as another section".to_string(),
                        ));
                    }
                }
                Err(e) => errors.push(ValidationError::Section(name.clone(), e.to_string())),
            }
        }

        if self.workflow.items_per_cycle == 0 {
            errors.push(ValidationError::Workflow(
                "items_per_cycle must be at least 1".to_string(),
            ));
        }
        if self.workflow.fold_threshold == 0 {
            errors.push(ValidationError::Workflow("fold_threshold must be at least 1".to_string()));
        }
        if self.workflow.activity_timeout_ms == 0 {
            errors.push(ValidationError::Workflow(
                "activity_timeout_ms must be greater than zero".to_string(),
            ));
        }

        if let Err(e) = self.retry.validate() {
            errors.push(ValidationError::Retry(e));
        }

        if self.generator.kind == GeneratorKind::Http
            && self.generator.endpoint.as_deref().map(str::trim).unwrap_or("").is_empty()
        {
            errors.push(ValidationError::Generator(
                "http generator requires an endpoint".to_string(),
            ));
        }

        if self.publish.bucket.trim().is_empty() {
            errors.push(ValidationError::Publish("bucket cannot be empty".to_string()));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and fold the errors into one `ApiError`.
    pub fn ensure_valid(&self) -> Result<(), ApiError> {
        self.validate().map_err(|errors| {
            let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                error_msgs.join("\n")
            ))
        })
    }

    pub fn data_dir(&self) -> PathBuf {
        self.storage.data_dir.clone().unwrap_or_else(|| {
            directories::ProjectDirs::from("", "", "bulletin")
                .map(|dirs| dirs.data_dir().to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".bulletin"))
        })
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir().join("store")
    }

    pub fn status_dir(&self) -> PathBuf {
        self.data_dir().join("status")
    }

    pub fn publish_root(&self) -> PathBuf {
        self.publish
            .root
            .clone()
            .unwrap_or_else(|| self.data_dir().join("published"))
    }

    pub fn publish_target(&self) -> PublishTarget {
        PublishTarget::new(self.publish.bucket.clone(), self.publish.region.clone())
    }

    /// One workflow input per configured section.
    pub fn workflow_inputs(&self) -> Result<Vec<WorkflowInput>, ApiError> {
        self.sections
            .iter()
            .map(|name| {
                Ok(WorkflowInput::new(
                    SectionId::new(name.as_str())?,
                    self.workflow.items_per_cycle,
                    self.publish_target(),
                )
                .with_model_id(self.generator.model_id.clone()))
            })
            .collect()
    }

    pub fn runtime_options(&self) -> RuntimeOptions {
        RuntimeOptions {
            retry: self.retry.clone(),
            activity_timeout: Duration::from_millis(self.workflow.activity_timeout_ms),
            workflow: WorkflowSettings {
                cycle_interval: Duration::from_millis(self.workflow.cycle_interval_ms),
                fold_threshold: self.workflow.fold_threshold,
                failure_policy: self.workflow.failure_policy,
            },
            status_dir: Some(self.status_dir()),
        }
    }
}

/// Builds a [`BulletinConfig`] from the configuration layers.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from global and workspace files plus the environment.
    pub fn load(workspace_root: &Path) -> Result<BulletinConfig, ApiError> {
        let builder = merge::merge_policy::builder_with_defaults()?;
        let builder = sources::global_file::add_to_builder(builder)?;
        let builder = sources::workspace_file::add_to_builder(builder, workspace_root)?;
        let config = builder
            .add_source(merge::merge_policy::environment())
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Load from one explicit file plus the environment.
    pub fn load_from_file(path: &Path) -> Result<BulletinConfig, ApiError> {
        if !path.exists() {
            return Err(ApiError::ConfigError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let config = merge::merge_policy::builder_with_defaults()?
            .add_source(config::File::from(path.to_path_buf()).required(true))
            .add_source(merge::merge_policy::environment())
            .build()?;
        Ok(config.try_deserialize()?)
    }

    pub fn default() -> BulletinConfig {
        BulletinConfig::default()
    }
}
