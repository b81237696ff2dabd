//! External collaborators invoked by a cycle: the Generator and the Publisher.
//!
//! Both are called through the runtime's retry machinery and must be safe to
//! invoke more than once for the same logical step. Generation is append-only,
//! so a duplicate batch is acceptable; publishing always receives the full
//! accumulated item set and overwrites the previous output.

pub mod generator;
pub mod publisher;

pub use generator::{HttpGenerator, TemplateGenerator};
pub use publisher::DirectoryPublisher;

use crate::content::{ContentBatch, ContentItem};
use crate::error::ActivityError;
use crate::section::{PublishTarget, SectionId};
use async_trait::async_trait;

/// Parameters for one generation call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateRequest {
    pub section: SectionId,
    pub count: u32,
    /// Content-source hint; generators that have no notion of a model ignore it
    pub model_id: String,
    /// Cycle sequence within the current run
    pub sequence: u64,
}

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: &GenerateRequest) -> Result<ContentBatch, ActivityError>;

    fn name(&self) -> &str;
}

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Make `items` the complete visible content of `section` at `target`.
    async fn publish(
        &self,
        section: &SectionId,
        items: &[ContentItem],
        target: &PublishTarget,
    ) -> Result<(), ActivityError>;

    fn name(&self) -> &str;
}
