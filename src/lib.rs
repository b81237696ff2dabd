//! Bulletin: durable, periodic content generation and publishing.
//!
//! Each named section runs one long-lived workflow that generates a batch of
//! items, publishes the section's full accumulated content, sleeps, and repeats.
//! Workflow state is persisted in an embedded sled store so a restarted process
//! resumes every section where it left off without redoing completed work.

pub mod activity;
pub mod atomic_file;
pub mod cli;
pub mod config;
pub mod content;
pub mod error;
pub mod logging;
pub mod retry;
pub mod runtime;
pub mod scheduler;
pub mod section;
pub mod workflow;

pub use error::{ActivityError, ApiError, StorageError};
pub use runtime::{RuntimeOptions, WorkerRuntime, WorkflowExit};
pub use scheduler::{EnsureAction, EnsureReport, SectionScheduler};
pub use section::{PublishTarget, SectionId, WorkflowInput};
pub use workflow::{ExecutionStatus, SectionSnapshot};
