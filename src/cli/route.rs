//! CLI route: single route table and run context. Dispatches to the runtime,
//! scheduler and presentation.

use crate::activity::{DirectoryPublisher, Generator, HttpGenerator, TemplateGenerator};
use crate::cli::parse::Commands;
use crate::cli::presentation::{
    format_start_summary, format_status_json, format_status_text, StartLine,
};
use crate::config::{BulletinConfig, ConfigLoader, GeneratorKind};
use crate::error::{ApiError, StorageError};
use crate::runtime::{StatusBoard, WorkerRuntime, WorkflowStore};
use crate::scheduler::{EnsureAction, SectionScheduler};
use crate::section::SectionId;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Grace period for in-flight activities when the process is interrupted
const SHUTDOWN_GRACE: Duration = Duration::from_secs(15);

/// Runtime context for CLI execution: loaded config plus resolved paths.
pub struct RunContext {
    config: BulletinConfig,
}

impl RunContext {
    /// Create run context from workspace root and optional config path. Uses ConfigLoader only.
    pub fn new(
        workspace_root: PathBuf,
        config_path: Option<PathBuf>,
        data_dir: Option<PathBuf>,
    ) -> Result<Self, ApiError> {
        let mut config = if let Some(ref cfg_path) = config_path {
            ConfigLoader::load_from_file(cfg_path)?
        } else {
            ConfigLoader::load(&workspace_root)?
        };
        if data_dir.is_some() {
            config.storage.data_dir = data_dir;
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &BulletinConfig {
        &self.config
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Start {
                bucket,
                region,
                count,
                model_id,
                sections,
                publish_root,
            } => {
                let mut config = self.config.clone();
                if let Some(bucket) = bucket {
                    config.publish.bucket = bucket.clone();
                }
                if let Some(region) = region {
                    config.publish.region = region.clone();
                }
                if let Some(count) = count {
                    config.workflow.items_per_cycle = *count;
                }
                if let Some(model_id) = model_id {
                    config.generator.model_id = model_id.clone();
                }
                if !sections.is_empty() {
                    config.sections = sections.clone();
                }
                if publish_root.is_some() {
                    config.publish.root = publish_root.clone();
                }
                config.ensure_valid()?;

                let rt = tokio::runtime::Runtime::new().map_err(|e| {
                    ApiError::RuntimeError(format!("Failed to create runtime: {}", e))
                })?;
                rt.block_on(run_start(config))
            }
            Commands::Status {
                section,
                format,
                items,
            } => self.handle_status(section.as_deref(), format, *items),
        }
    }

    fn handle_status(
        &self,
        section: Option<&str>,
        format: &str,
        show_items: bool,
    ) -> Result<String, ApiError> {
        let board = StatusBoard::new(self.config.status_dir());
        let mut snapshots = board.read_all()?;
        if let Some(section) = section {
            let wanted = SectionId::new(section)?.workflow_id();
            snapshots.retain(|s| s.workflow_id == wanted);
            if snapshots.is_empty() {
                return Err(ApiError::WorkflowNotFound(wanted));
            }
        }
        match format {
            "json" => format_status_json(&snapshots),
            "text" => Ok(format_status_text(&snapshots, show_items)),
            other => Err(ApiError::InvalidInput(format!(
                "Unknown format '{}' (expected text or json)",
                other
            ))),
        }
    }
}

fn build_generator(config: &BulletinConfig) -> Result<Arc<dyn Generator>, ApiError> {
    match config.generator.kind {
        GeneratorKind::Template => Ok(Arc::new(TemplateGenerator::new())),
        GeneratorKind::Http => {
            let endpoint = config.generator.endpoint.clone().unwrap_or_default();
            let timeout = Duration::from_millis(config.workflow.activity_timeout_ms);
            let generator = HttpGenerator::new(endpoint, timeout)
                .map_err(|e| ApiError::ConfigError(e.to_string()))?;
            Ok(Arc::new(generator))
        }
    }
}

async fn run_start(config: BulletinConfig) -> Result<String, ApiError> {
    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)
        .map_err(|e| ApiError::StorageError(StorageError::IoError(e)))?;

    let store = Arc::new(WorkflowStore::open(&config.store_path())?);
    let generator = build_generator(&config)?;
    let publisher = Arc::new(DirectoryPublisher::new(config.publish_root()));
    let runtime = Arc::new(WorkerRuntime::new(
        store,
        generator,
        publisher,
        config.runtime_options(),
    ));

    let resumed = runtime.recover()?;
    if !resumed.is_empty() {
        info!(count = resumed.len(), "Resumed workflows from a previous process");
    }

    let inputs = config.workflow_inputs()?;
    let scheduler = SectionScheduler::new(runtime.clone());
    let mut lines = Vec::new();
    let mut workflow_ids = Vec::new();
    for (input, result) in inputs
        .iter()
        .cloned()
        .zip(scheduler.ensure_all(inputs.clone()))
    {
        let workflow_id = input.section.workflow_id();
        let outcome = match result {
            Ok(report) => {
                workflow_ids.push(report.workflow_id.clone());
                match report.action {
                    EnsureAction::Started => "started".to_string(),
                    EnsureAction::Attached if resumed.contains(&report.workflow_id) => {
                        "resumed".to_string()
                    }
                    EnsureAction::Attached => "attached".to_string(),
                }
            }
            Err(err) => format!("error: {}", err),
        };
        lines.push(StartLine {
            section: input.section.to_string(),
            workflow_id,
            outcome,
        });
    }
    println!(
        "{}",
        format_start_summary(&lines, &data_dir, &config.publish_root())
    );

    let all_finished = {
        let runtime = runtime.clone();
        let ids = workflow_ids.clone();
        async move {
            for id in ids {
                if let Err(err) = runtime.wait(&id).await {
                    warn!(workflow_id = %id, error = %err, "Lost track of workflow");
                }
            }
        }
    };

    let reason = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(|e| {
                ApiError::RuntimeError(format!("Failed to listen for Ctrl+C: {}", e))
            })?;
            "interrupted"
        }
        _ = all_finished => "all workflows finished",
    };
    info!(reason, "Stopping worker");

    match tokio::time::timeout(SHUTDOWN_GRACE, runtime.shutdown()).await {
        Ok(result) => result?,
        Err(_) => warn!(
            grace_secs = SHUTDOWN_GRACE.as_secs(),
            "Workflows still busy after grace period; they resume from the ledger on next start"
        ),
    }

    let snapshots: Vec<_> = workflow_ids
        .iter()
        .filter_map(|id| runtime.query(id).ok())
        .collect();
    Ok(format!(
        "Worker stopped ({}).\n{}",
        reason,
        format_status_text(&snapshots, false)
    ))
}
