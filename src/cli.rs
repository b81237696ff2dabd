//! CLI domain: parse, route, output, and presentation only.
//! No orchestration logic; the route table dispatches to the runtime and scheduler.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::map_error;
pub use parse::{Cli, Commands};
pub use presentation::{
    format_start_summary, format_status_json, format_status_text, StartLine,
};
pub use route::RunContext;
