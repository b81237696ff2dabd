//! CLI parse: clap types for Bulletin. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Bulletin CLI - durable periodic content generation per section
#[derive(Parser, Debug)]
#[command(name = "bulletin")]
#[command(about = "Keep one durable generate-and-publish workflow running per section")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory (looked up for config/config.toml)
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Data directory for the workflow store, status mirrors and published output
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Disable logging
    #[arg(long, short)]
    pub quiet: bool,

    /// Enable verbose logging
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, both)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output includes a file)
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ensure every section workflow is running and host them until Ctrl+C
    Start {
        /// Publish bucket
        #[arg(long)]
        bucket: Option<String>,
        /// Publish region
        #[arg(long)]
        region: Option<String>,
        /// Items generated per cycle
        #[arg(long)]
        count: Option<u32>,
        /// Content-source model identifier
        #[arg(long)]
        model_id: Option<String>,
        /// Restrict to these sections (repeatable); defaults to the configured list
        #[arg(long = "section")]
        sections: Vec<String>,
        /// Directory that receives published buckets
        #[arg(long)]
        publish_root: Option<PathBuf>,
    },
    /// Show the latest committed snapshot of each section
    Status {
        /// Only this section
        #[arg(long)]
        section: Option<String>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
        /// List the published headlines as well
        #[arg(long)]
        items: bool,
    },
}
