//! Cycle executor: generate one batch, then publish the full item set.
//!
//! Each activity runs under the retry policy with a per-attempt timeout.
//! Completed activity results are written to the store's ledger before the
//! executor moves on, so a cycle resumed after a crash replays them instead
//! of calling the activity again.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::activity::{GenerateRequest, Generator, Publisher};
use crate::content::{flatten_batches, ContentBatch, ContentItem};
use crate::error::{ActivityError, StorageError};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::runtime::store::{ActivityKind, ActivityRecord, WorkflowStore};
use crate::section::WorkflowInput;
use crate::workflow::control::{sleep_unless, ControlReceiver};

/// Result of a cycle, or of a single failed attempt inside one
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Generated and published; the batch is ready to commit.
    Success(ContentBatch),
    /// An attempt failed and will be retried after `next_delay`.
    RetryableFailure {
        error: ActivityError,
        next_delay: Duration,
    },
    /// Retries exhausted or a configuration error.
    /// `unpublished` holds the batch when generation had succeeded.
    FatalFailure {
        error: ActivityError,
        unpublished: Option<ContentBatch>,
    },
    /// Cancel or shutdown arrived while waiting to retry.
    Interrupted { generated: Option<ContentBatch> },
}

/// Attempt bookkeeping for a single activity invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    pub attempt: u32,
    pub next_delay: Duration,
}

/// Inputs for one cycle
pub struct CycleContext<'a> {
    pub workflow_id: &'a str,
    pub run_id: &'a str,
    pub seq: u64,
    pub input: &'a WorkflowInput,
    /// Content published by earlier runs of the workflow
    pub base: &'a [ContentItem],
    /// Batches committed earlier in this run
    pub committed: &'a [ContentBatch],
    /// Unpublished batch carried from an earlier failed cycle
    pub carried: Option<ContentBatch>,
}

enum Attempted<T> {
    Completed(T),
    GaveUp(ActivityError),
    Interrupted,
}

pub struct CycleExecutor {
    generator: Arc<dyn Generator>,
    publisher: Arc<dyn Publisher>,
    retry: RetryPolicy,
    activity_timeout: Duration,
    store: Arc<WorkflowStore>,
}

impl CycleExecutor {
    pub fn new(
        generator: Arc<dyn Generator>,
        publisher: Arc<dyn Publisher>,
        retry: RetryPolicy,
        activity_timeout: Duration,
        store: Arc<WorkflowStore>,
    ) -> Self {
        Self {
            generator,
            publisher,
            retry,
            activity_timeout,
            store,
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Classify a failed attempt.
    pub fn assess(&self, attempt: u32, error: ActivityError) -> CycleOutcome {
        match self.retry.next_action(attempt, &error) {
            RetryDecision::RetryAfter(next_delay) => {
                CycleOutcome::RetryableFailure { error, next_delay }
            }
            RetryDecision::GiveUp => CycleOutcome::FatalFailure {
                error,
                unpublished: None,
            },
        }
    }

    pub async fn run(
        &self,
        mut ctx: CycleContext<'_>,
        control: &mut ControlReceiver,
    ) -> Result<CycleOutcome, StorageError> {
        let batch = match ctx.carried.take() {
            Some(batch) => {
                debug!(
                    workflow_id = ctx.workflow_id,
                    seq = ctx.seq,
                    items = batch.len(),
                    "Reusing unpublished batch; skipping generation"
                );
                batch
            }
            None => match self.generate(&ctx, control).await? {
                Attempted::Completed(batch) => batch,
                Attempted::GaveUp(error) => {
                    return Ok(CycleOutcome::FatalFailure {
                        error,
                        unpublished: None,
                    })
                }
                Attempted::Interrupted => return Ok(CycleOutcome::Interrupted { generated: None }),
            },
        };

        match self.publish(&ctx, &batch, control).await? {
            Attempted::Completed(()) => Ok(CycleOutcome::Success(batch)),
            Attempted::GaveUp(error) => Ok(CycleOutcome::FatalFailure {
                error,
                unpublished: Some(batch),
            }),
            Attempted::Interrupted => Ok(CycleOutcome::Interrupted {
                generated: Some(batch),
            }),
        }
    }

    async fn generate(
        &self,
        ctx: &CycleContext<'_>,
        control: &mut ControlReceiver,
    ) -> Result<Attempted<ContentBatch>, StorageError> {
        if let Some(ActivityRecord::Generated { batch }) =
            self.store.get_activity(ctx.run_id, ctx.seq, ActivityKind::Generate)?
        {
            debug!(workflow_id = ctx.workflow_id, seq = ctx.seq, "Replaying generated batch");
            return Ok(Attempted::Completed(batch));
        }

        let request = GenerateRequest {
            section: ctx.input.section.clone(),
            count: ctx.input.items_per_cycle,
            model_id: ctx.input.model_id.clone(),
            sequence: ctx.seq,
        };
        let generator = &self.generator;
        let request = &request;
        let result = self
            .attempt(ctx, ActivityKind::Generate, control, || generator.generate(request))
            .await;

        if let Attempted::Completed(batch) = &result {
            self.store.record_activity(
                ctx.run_id,
                ctx.seq,
                ActivityKind::Generate,
                &ActivityRecord::Generated { batch: batch.clone() },
            )?;
        }
        Ok(result)
    }

    async fn publish(
        &self,
        ctx: &CycleContext<'_>,
        batch: &ContentBatch,
        control: &mut ControlReceiver,
    ) -> Result<Attempted<()>, StorageError> {
        if let Some(ActivityRecord::Published { .. }) =
            self.store.get_activity(ctx.run_id, ctx.seq, ActivityKind::Publish)?
        {
            debug!(workflow_id = ctx.workflow_id, seq = ctx.seq, "Replaying completed publish");
            return Ok(Attempted::Completed(()));
        }

        let mut items = ctx.base.to_vec();
        items.extend(flatten_batches(
            ctx.committed.iter().chain(std::iter::once(batch)),
        ));
        let publisher = &self.publisher;
        let section = &ctx.input.section;
        let target = &ctx.input.publish_target;
        let items_ref = &items;
        let result = self
            .attempt(ctx, ActivityKind::Publish, control, || {
                publisher.publish(section, items_ref, target)
            })
            .await;

        if let Attempted::Completed(()) = &result {
            self.store.record_activity(
                ctx.run_id,
                ctx.seq,
                ActivityKind::Publish,
                &ActivityRecord::Published {
                    item_count: items.len(),
                },
            )?;
        }
        Ok(result)
    }

    async fn attempt<T, F, Fut>(
        &self,
        ctx: &CycleContext<'_>,
        kind: ActivityKind,
        control: &mut ControlReceiver,
        mut call: F,
    ) -> Attempted<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ActivityError>>,
    {
        let mut state = RetryState {
            attempt: 1,
            next_delay: Duration::ZERO,
        };
        loop {
            let result = match tokio::time::timeout(self.activity_timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(ActivityError::Timeout(self.activity_timeout)),
            };
            let error = match result {
                Ok(value) => {
                    if state.attempt > 1 {
                        info!(
                            workflow_id = ctx.workflow_id,
                            seq = ctx.seq,
                            activity = kind.as_str(),
                            attempt = state.attempt,
                            "Activity succeeded after retry"
                        );
                    }
                    return Attempted::Completed(value);
                }
                Err(error) => error,
            };

            match self.assess(state.attempt, error) {
                CycleOutcome::RetryableFailure { error, next_delay } => {
                    state.next_delay = next_delay;
                    warn!(
                        workflow_id = ctx.workflow_id,
                        seq = ctx.seq,
                        activity = kind.as_str(),
                        attempt = state.attempt,
                        delay_ms = next_delay.as_millis() as u64,
                        error = %error,
                        "Activity attempt failed; retrying"
                    );
                    let waited =
                        sleep_unless(control, next_delay, |c| c.within_cycle().is_some()).await;
                    if !waited {
                        return Attempted::Interrupted;
                    }
                    state.attempt += 1;
                }
                CycleOutcome::FatalFailure { error, .. } => {
                    warn!(
                        workflow_id = ctx.workflow_id,
                        seq = ctx.seq,
                        activity = kind.as_str(),
                        attempt = state.attempt,
                        error = %error,
                        "Activity failed; giving up"
                    );
                    return Attempted::GaveUp(error);
                }
                CycleOutcome::Success(_) | CycleOutcome::Interrupted { .. } => {
                    return Attempted::Interrupted;
                }
            }
        }
    }
}
