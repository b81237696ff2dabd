//! CLI presentation: text and json formatters for start and status.

use crate::error::{ApiError, StorageError};
use crate::workflow::SectionSnapshot;
use chrono::{TimeZone, Utc};
use comfy_table::Table;
use owo_colors::OwoColorize;
use std::path::Path;

/// One row of the start summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartLine {
    pub section: String,
    pub workflow_id: String,
    pub outcome: String,
}

fn title(text: &str) -> String {
    format!("{}", text.bold().underline())
}

fn format_millis(ms: u64) -> String {
    match Utc.timestamp_millis_opt(ms as i64).single() {
        Some(ts) => ts.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => "-".to_string(),
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

pub fn format_start_summary(lines: &[StartLine], data_dir: &Path, publish_root: &Path) -> String {
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Section", "Workflow", "Outcome"]);
    for line in lines {
        table.add_row(vec![&line.section, &line.workflow_id, &line.outcome]);
    }
    format!(
        "{}\n{}\n  Data directory: {}\n  Publishing to:  {}\n  {}",
        title("Section workflows"),
        table,
        data_dir.display(),
        publish_root.display(),
        "Press Ctrl+C to stop; workflows resume on next start."
    )
}

pub fn format_status_text(snapshots: &[SectionSnapshot], show_items: bool) -> String {
    if snapshots.is_empty() {
        return "No section workflows have reported status yet.".to_string();
    }

    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec![
        "Section",
        "Status",
        "Iteration",
        "Items",
        "Published",
        "Pending",
        "Folds",
        "Updated",
        "Last error",
    ]);
    for s in snapshots {
        let status = if s.running { "running" } else { s.status.as_str() };
        table.add_row(vec![
            s.section.clone(),
            status.to_string(),
            s.iteration_count.to_string(),
            s.items.len().to_string(),
            s.last_published.len().to_string(),
            s.pending_unpublished.to_string(),
            s.folds.to_string(),
            format_millis(s.updated_at_ms),
            s.last_error
                .as_deref()
                .map(|e| truncate(e, 60))
                .unwrap_or_else(|| "-".to_string()),
        ]);
    }

    let mut out = format!("{}\n{}", title("Section status"), table);
    if show_items {
        for s in snapshots {
            out.push_str(&format!("\n\n{}", title(&s.section)));
            if s.last_published.is_empty() {
                out.push_str("\n  (nothing published yet)");
            }
            for (i, item) in s.last_published.iter().enumerate() {
                out.push_str(&format!("\n  {}. {} ({})", i + 1, item.headline, item.author));
            }
        }
    }
    out
}

pub fn format_status_json(snapshots: &[SectionSnapshot]) -> Result<String, ApiError> {
    serde_json::to_string_pretty(snapshots).map_err(|e| {
        ApiError::StorageError(StorageError::from_serde("status", e))
    })
}
