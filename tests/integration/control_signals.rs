//! Stop and cancel signals delivered through the runtime.

use crate::integration::test_utils::{input, options, wait_for_snapshot, wait_until, Harness};
use bulletin::workflow::ExecutionStatus;
use bulletin::{ActivityError, ApiError, WorkflowExit};
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_stop_during_sleep_ends_promptly() {
    let h = Harness::new(options(10));
    let id = h.runtime.start_workflow(input("Sports", 2)).unwrap();
    wait_for_snapshot(&h.runtime, &id, |s| s.iteration_count == 1).await;

    let requested = Instant::now();
    h.runtime.signal_stop(&id).unwrap();
    assert_eq!(
        h.runtime.wait(&id).await.unwrap(),
        WorkflowExit::Finished(ExecutionStatus::Stopped)
    );
    assert!(requested.elapsed() < Duration::from_secs(30));
    assert_eq!(h.generator.call_count(), 1);

    let snapshot = h.runtime.query(&id).unwrap();
    assert!(!snapshot.running);
    assert_eq!(snapshot.iteration_count, 1);
    assert_eq!(snapshot.last_published.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stop_mid_cycle_lets_the_cycle_commit() {
    let h = Harness::new(options(10));
    let gate = h.publisher.hold();
    let id = h.runtime.start_workflow(input("Sports", 2)).unwrap();

    let publisher = h.publisher.clone();
    wait_until(|| publisher.started() == 1).await;
    h.runtime.signal_stop(&id).unwrap();
    gate.add_permits(1);

    assert_eq!(
        h.runtime.wait(&id).await.unwrap(),
        WorkflowExit::Finished(ExecutionStatus::Stopped)
    );
    let snapshot = h.runtime.query(&id).unwrap();
    assert_eq!(snapshot.iteration_count, 1);
    assert_eq!(snapshot.items.len(), 2);
    assert_eq!(snapshot.last_published, snapshot.items);
    assert_eq!(h.publisher.published().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_interrupts_retry_backoff() {
    let h = Harness::new(options(10));
    h.generator
        .fail_always(ActivityError::Transient("upstream busy".to_string()));
    let id = h.runtime.start_workflow(input("Sports", 2)).unwrap();

    let generator = h.generator.clone();
    wait_until(|| generator.call_count() == 1).await;
    h.runtime.cancel(&id).unwrap();

    assert_eq!(
        h.runtime.wait(&id).await.unwrap(),
        WorkflowExit::Finished(ExecutionStatus::Cancelled)
    );
    assert_eq!(h.generator.call_count(), 1);
    assert_eq!(
        h.store.get_execution(&id).unwrap().unwrap().status,
        ExecutionStatus::Cancelled
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_publish_retries_keeps_generated_batch() {
    let h = Harness::new(options(10));
    h.publisher
        .fail_always(ActivityError::Transient("bucket unavailable".to_string()));
    let id = h.runtime.start_workflow(input("Sports", 2)).unwrap();

    let publisher = h.publisher.clone();
    wait_until(|| publisher.started() == 1).await;
    h.runtime.cancel(&id).unwrap();

    assert_eq!(
        h.runtime.wait(&id).await.unwrap(),
        WorkflowExit::Finished(ExecutionStatus::Cancelled)
    );
    let record = h.store.get_execution(&id).unwrap().unwrap();
    assert_eq!(record.pending.map(|b| b.len()), Some(2));
    assert_eq!(record.state.iteration_count, 0);
    assert!(record.last_published.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_signals_to_finished_workflows_are_ignored() {
    let h = Harness::new(options(10));
    let id = h.runtime.start_workflow(input("Sports", 2)).unwrap();
    wait_for_snapshot(&h.runtime, &id, |s| s.iteration_count == 1).await;

    h.runtime.signal_stop(&id).unwrap();
    h.runtime.wait(&id).await.unwrap();

    h.runtime.cancel(&id).unwrap();
    h.runtime.signal_stop(&id).unwrap();
    assert_eq!(h.runtime.query(&id).unwrap().status, ExecutionStatus::Stopped);
}

#[tokio::test]
async fn test_unknown_workflow_is_reported() {
    let h = Harness::new(options(10));

    assert!(matches!(
        h.runtime.signal_stop("section-nowhere"),
        Err(ApiError::WorkflowNotFound(_))
    ));
    assert!(matches!(
        h.runtime.cancel("section-nowhere"),
        Err(ApiError::WorkflowNotFound(_))
    ));
    assert!(matches!(
        h.runtime.query("section-nowhere"),
        Err(ApiError::WorkflowNotFound(_))
    ));
    assert!(h.runtime.describe("section-nowhere").unwrap().is_none());
}
