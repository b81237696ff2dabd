//! End-to-end section workflow behavior against scripted collaborators.

use crate::integration::test_utils::{input, options, wait_for_snapshot, wait_until, Harness};
use bulletin::workflow::ExecutionStatus;
use bulletin::{ActivityError, PublishTarget, SectionId, WorkflowExit, WorkflowInput};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_each_cycle_republishes_everything_so_far() {
    let h = Harness::new(options(10));
    let id = h.runtime.start_workflow(input("Sports", 2)).unwrap();
    assert_eq!(id, "section-sports");

    let snapshot = wait_for_snapshot(&h.runtime, &id, |s| s.iteration_count >= 3).await;
    assert!(snapshot.running);
    assert_eq!(snapshot.status, ExecutionStatus::Running);

    let published = h.publisher.published();
    assert!(published.len() >= 3);
    let sizes: Vec<usize> = published.iter().take(3).map(Vec::len).collect();
    assert_eq!(sizes, vec![2, 4, 6]);
    for pair in published.windows(2) {
        assert_eq!(&pair[1][..pair[0].len()], &pair[0][..]);
    }

    assert_eq!(snapshot.items.len(), 6);
    assert_eq!(snapshot.last_published, snapshot.items);
    assert_eq!(snapshot.batches, 3);

    let sequences: Vec<u64> = h.generator.calls().iter().take(3).map(|c| c.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3]);
    assert!(h.generator.calls().iter().all(|c| c.section == "Sports"));

    h.runtime.signal_stop(&id).unwrap();
    assert_eq!(
        h.runtime.wait(&id).await.unwrap(),
        WorkflowExit::Finished(ExecutionStatus::Stopped)
    );
}

#[tokio::test(start_paused = true)]
async fn test_demo_bucket_section_shows_one_cycle_of_items() {
    let h = Harness::new(options(10));
    let workflow_input = WorkflowInput::new(
        SectionId::new("Sports").unwrap(),
        5,
        PublishTarget::new("demo-bucket", "us-east-1"),
    );
    let id = h.runtime.start_workflow(workflow_input).unwrap();

    let snapshot = wait_for_snapshot(&h.runtime, &id, |s| s.iteration_count == 1).await;
    assert!(snapshot.running);
    assert_eq!(snapshot.items.len(), 5);
    assert_eq!(snapshot.last_published.len(), 5);
    assert_eq!(h.publisher.published(), vec![snapshot.items.clone()]);

    h.runtime.signal_stop(&id).unwrap();
    h.runtime.wait(&id).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_generation_skips_the_cycle() {
    let h = Harness::new(options(10));
    for _ in 0..3 {
        h.generator
            .push(Err(ActivityError::Transient("upstream busy".to_string())));
    }
    let id = h.runtime.start_workflow(input("Sports", 2)).unwrap();

    let failed = wait_for_snapshot(&h.runtime, &id, |s| s.last_error.is_some()).await;
    assert_eq!(failed.iteration_count, 0);
    assert!(failed.items.is_empty());
    assert_eq!(failed.status, ExecutionStatus::Running);
    assert!(h.publisher.published().is_empty());

    let recovered = wait_for_snapshot(&h.runtime, &id, |s| s.iteration_count == 1).await;
    assert!(recovered.last_error.is_none());
    assert_eq!(recovered.items.len(), 2);

    let calls = h.generator.calls();
    assert_eq!(calls.len(), 4);
    assert!(calls[1].at - calls[0].at >= Duration::from_secs(1));
    assert!(calls[2].at - calls[1].at >= Duration::from_secs(2));
    // The failed cycle is followed by a full interval before the next one
    assert!(calls[3].at - calls[2].at >= Duration::from_secs(29));
    assert_eq!(h.publisher.published().len(), 1);

    h.runtime.cancel(&id).unwrap();
    h.runtime.wait(&id).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_failed_publish_keeps_the_batch_for_next_cycle() {
    let h = Harness::new(options(10));
    for _ in 0..3 {
        h.publisher
            .push(Err(ActivityError::Transient("bucket unavailable".to_string())));
    }
    let id = h.runtime.start_workflow(input("Sports", 2)).unwrap();

    let failed = wait_for_snapshot(&h.runtime, &id, |s| s.last_error.is_some()).await;
    assert_eq!(failed.iteration_count, 0);
    assert_eq!(failed.pending_unpublished, 2);
    assert!(failed.items.is_empty());

    let committed = wait_for_snapshot(&h.runtime, &id, |s| s.iteration_count == 1).await;
    assert_eq!(committed.pending_unpublished, 0);
    assert_eq!(committed.items.len(), 2);

    // Generated once, published on the fourth attempt overall
    assert_eq!(h.generator.call_count(), 1);
    assert_eq!(h.publisher.started(), 4);
    assert_eq!(h.publisher.published(), vec![committed.items.clone()]);

    h.runtime.signal_stop(&id).unwrap();
    h.runtime.wait(&id).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_configuration_error_stops_the_workflow() {
    let h = Harness::new(options(10));
    h.publisher
        .fail_always(ActivityError::Configuration("bucket does not exist".to_string()));
    let id = h.runtime.start_workflow(input("Sports", 2)).unwrap();

    assert_eq!(
        h.runtime.wait(&id).await.unwrap(),
        WorkflowExit::Finished(ExecutionStatus::Stopped)
    );
    assert_eq!(h.publisher.started(), 1);

    let snapshot = h.runtime.query(&id).unwrap();
    assert_eq!(snapshot.status, ExecutionStatus::Stopped);
    assert!(!snapshot.running);
    assert!(snapshot
        .last_error
        .as_deref()
        .unwrap_or_default()
        .contains("bucket does not exist"));

    let record = h.store.get_execution(&id).unwrap().unwrap();
    assert_eq!(record.status, ExecutionStatus::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_fold_keeps_identity_and_visible_content() {
    let h = Harness::new(options(2));
    let id = h.runtime.start_workflow(input("Sports", 2)).unwrap();
    let first_run = h.runtime.describe(&id).unwrap().unwrap().run_id;

    let publisher = h.publisher.clone();
    wait_until(|| publisher.published().len() >= 4).await;

    let snapshot = h.runtime.query(&id).unwrap();
    assert_eq!(snapshot.workflow_id, id);
    assert!(snapshot.folds >= 1);
    assert_ne!(snapshot.run_id, first_run);
    assert_eq!(snapshot.status, ExecutionStatus::Running);

    // The successor run keeps publishing on top of what readers already see
    let published = h.publisher.published();
    let sizes: Vec<usize> = published.iter().take(4).map(Vec::len).collect();
    assert_eq!(sizes, vec![2, 4, 6, 8]);
    for pair in published.windows(2) {
        assert_eq!(&pair[1][..pair[0].len()], &pair[0][..]);
    }
    assert!(snapshot.items.len() < snapshot.last_published.len());

    let record = h.store.get_execution(&id).unwrap().unwrap();
    assert_eq!(record.workflow_id, id);
    assert!(!record.last_published.is_empty());

    h.runtime.signal_stop(&id).unwrap();
    h.runtime.wait(&id).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_fold_at_tenth_iteration_is_invisible_to_readers() {
    let h = Harness::new(options(10));
    let id = h.runtime.start_workflow(input("Technology", 5)).unwrap();

    let before = wait_for_snapshot(&h.runtime, &id, |s| s.iteration_count == 9).await;
    assert!(before.running);
    assert_eq!(before.folds, 0);
    assert_eq!(before.last_published.len(), 45);

    let after = wait_for_snapshot(&h.runtime, &id, |s| s.folds == 1).await;
    assert!(after.running);
    assert_eq!(after.iteration_count, 0);
    assert_ne!(after.run_id, before.run_id);
    assert_eq!(after.workflow_id, before.workflow_id);
    assert_eq!(after.last_published.len(), 50);
    assert_eq!(&after.last_published[..45], &before.last_published[..]);
    // The tenth publish is exactly what readers see across the fold
    assert_eq!(h.publisher.published()[9], after.last_published);

    let next = wait_for_snapshot(&h.runtime, &id, |s| s.folds == 1 && s.iteration_count == 1).await;
    assert_eq!(next.last_published.len(), 55);
    assert_eq!(&next.last_published[..50], &after.last_published[..]);
    assert_eq!(next.items.len(), 5);
    assert_eq!(h.publisher.published()[10].len(), 55);

    h.runtime.signal_stop(&id).unwrap();
    h.runtime.wait(&id).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_query_never_sees_a_half_applied_cycle() {
    let h = Harness::new(options(10));
    let id = h.runtime.start_workflow(input("Sports", 2)).unwrap();
    wait_for_snapshot(&h.runtime, &id, |s| s.iteration_count == 1).await;

    let gate = h.publisher.hold();
    let publisher = h.publisher.clone();
    wait_until(|| publisher.started() == 2).await;

    // Cycle two has generated its batch and is publishing
    assert_eq!(h.generator.call_count(), 2);
    let mid_cycle = h.runtime.query(&id).unwrap();
    assert_eq!(mid_cycle.iteration_count, 1);
    assert_eq!(mid_cycle.items.len(), 2);
    assert_eq!(mid_cycle.last_published.len(), 2);

    gate.add_permits(1);
    let after = wait_for_snapshot(&h.runtime, &id, |s| s.iteration_count == 2).await;
    assert_eq!(after.items.len(), 4);
    assert_eq!(after.last_published, after.items);

    gate.add_permits(16);
    h.runtime.cancel(&id).unwrap();
    h.runtime.wait(&id).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_sections_run_independently() {
    let h = Harness::new(options(10));
    let sports = h.runtime.start_workflow(input("Sports", 1)).unwrap();
    let health = h.runtime.start_workflow(input("Health", 3)).unwrap();

    let s = wait_for_snapshot(&h.runtime, &sports, |s| s.iteration_count >= 2).await;
    let hl = wait_for_snapshot(&h.runtime, &health, |s| s.iteration_count >= 2).await;

    assert!(s.items.iter().all(|i| i.headline.starts_with("Sports")));
    assert!(hl.items.iter().all(|i| i.headline.starts_with("Health")));
    assert_eq!(hl.items.len() as u64, hl.iteration_count * 3);

    h.runtime.signal_stop(&sports).unwrap();
    assert_eq!(
        h.runtime.wait(&sports).await.unwrap(),
        WorkflowExit::Finished(ExecutionStatus::Stopped)
    );
    assert!(h.runtime.is_live(&health));

    h.runtime.shutdown().await.unwrap();
}
