//! Merge rules: defaults, override order, conflict handling.

use config::builder::DefaultState;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;
use config::Environment;

use crate::section::DEFAULT_SECTIONS;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("sections", DEFAULT_SECTIONS.to_vec())?
        .set_default("publish.bucket", "agentic-hackathon-wlg")?
        .set_default("publish.region", "ap-southeast-2")?
        .set_default("workflow.items_per_cycle", 1)?
        .set_default("workflow.cycle_interval_ms", 30_000)?
        .set_default("workflow.fold_threshold", 10)
}

/// Environment layer: `BULLETIN__WORKFLOW__FOLD_THRESHOLD=5`, `BULLETIN__SECTIONS=Sports,Health`.
pub fn environment() -> Environment {
    Environment::with_prefix("BULLETIN")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("sections")
}
