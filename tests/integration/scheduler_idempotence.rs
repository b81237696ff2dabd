//! Scheduler start-or-attach behavior and workflow identity uniqueness.

use crate::integration::test_utils::{
    input, options, wait_for_snapshot, wait_until, Harness, ScriptedGenerator, ScriptedPublisher,
};
use bulletin::workflow::ExecutionStatus;
use bulletin::{ActivityError, ApiError, EnsureAction, SectionScheduler, WorkflowExit};

#[tokio::test(start_paused = true)]
async fn test_ensure_twice_attaches_to_the_first_execution() {
    let h = Harness::new(options(10));
    let scheduler = SectionScheduler::new(h.runtime.clone());

    let first = scheduler.ensure(input("Sports", 2)).unwrap();
    assert_eq!(first.action, EnsureAction::Started);
    assert_eq!(first.workflow_id, "section-sports");
    let run_id = h.runtime.describe(&first.workflow_id).unwrap().unwrap().run_id;

    let second = scheduler.ensure(input("Sports", 2)).unwrap();
    assert_eq!(second.action, EnsureAction::Attached);
    assert_eq!(second.workflow_id, first.workflow_id);

    wait_for_snapshot(&h.runtime, &first.workflow_id, |s| s.iteration_count == 1).await;
    let description = h.runtime.describe(&first.workflow_id).unwrap().unwrap();
    assert_eq!(description.run_id, run_id);
    assert_eq!(h.runtime.list().unwrap().len(), 1);
    assert_eq!(h.generator.call_count(), 1);

    h.runtime.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_start_workflow_rejects_a_duplicate_identity() {
    let h = Harness::new(options(10));
    h.runtime.start_workflow(input("Sports", 2)).unwrap();

    let err = h.runtime.start_workflow(input("Sports", 5)).unwrap_err();
    assert!(matches!(err, ApiError::AlreadyRunning(_)));

    h.runtime.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_ensure_resumes_a_parked_execution() {
    let h = Harness::new(options(10));
    let id = h.runtime.start_workflow(input("Sports", 2)).unwrap();
    wait_for_snapshot(&h.runtime, &id, |s| s.iteration_count == 1).await;
    let run_id = h.runtime.describe(&id).unwrap().unwrap().run_id;

    let h = h
        .restart(ScriptedGenerator::new(), ScriptedPublisher::new())
        .await;
    assert!(matches!(
        h.runtime.start_workflow(input("Sports", 2)),
        Err(ApiError::AlreadyRunning(_))
    ));

    let scheduler = SectionScheduler::new(h.runtime.clone());
    let report = scheduler.ensure(input("Sports", 2)).unwrap();
    assert_eq!(report.action, EnsureAction::Attached);
    assert!(h.runtime.is_live(&id));

    let snapshot = wait_for_snapshot(&h.runtime, &id, |s| s.iteration_count == 2).await;
    assert_eq!(snapshot.run_id, run_id);

    h.runtime.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_ensure_after_stop_starts_a_fresh_run() {
    let h = Harness::new(options(10));
    let scheduler = SectionScheduler::new(h.runtime.clone());
    let id = scheduler.ensure(input("Sports", 2)).unwrap().workflow_id;
    let stopped = wait_for_snapshot(&h.runtime, &id, |s| s.iteration_count == 1).await;
    h.runtime.signal_stop(&id).unwrap();
    h.runtime.wait(&id).await.unwrap();

    let report = scheduler.ensure(input("Sports", 2)).unwrap();
    assert_eq!(report.action, EnsureAction::Started);

    let fresh = h.runtime.query(&id).unwrap();
    assert_ne!(fresh.run_id, stopped.run_id);
    assert_eq!(fresh.status, ExecutionStatus::Running);
    assert_eq!(fresh.iteration_count, 0);
    // Readers keep seeing the previous content until the new run publishes
    assert_eq!(fresh.last_published, stopped.last_published);

    let next = wait_for_snapshot(&h.runtime, &id, |s| s.iteration_count == 1).await;
    assert_eq!(next.items.len(), 2);

    h.runtime.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_ensure_after_cancel_publishes_the_carried_batch() {
    let h = Harness::new(options(10));
    let scheduler = SectionScheduler::new(h.runtime.clone());
    h.publisher
        .push(Err(ActivityError::Transient("bucket unavailable".to_string())));
    let id = scheduler.ensure(input("Sports", 2)).unwrap().workflow_id;

    let publisher = h.publisher.clone();
    wait_until(|| publisher.started() == 1).await;
    h.runtime.cancel(&id).unwrap();
    assert_eq!(
        h.runtime.wait(&id).await.unwrap(),
        WorkflowExit::Finished(ExecutionStatus::Cancelled)
    );
    let cancelled = h.store.get_execution(&id).unwrap().unwrap();
    let carried = cancelled.pending.expect("generated batch is kept");
    assert_eq!(carried.len(), 2);
    assert!(h.publisher.published().is_empty());

    let report = scheduler.ensure(input("Sports", 2)).unwrap();
    assert_eq!(report.action, EnsureAction::Started);
    let restarted = h.store.get_execution(&id).unwrap().unwrap();
    assert_eq!(restarted.pending.map(|b| b.items), Some(carried.items.clone()));

    let snapshot = wait_for_snapshot(&h.runtime, &id, |s| s.iteration_count == 1).await;
    assert_ne!(snapshot.run_id, cancelled.run_id);
    assert_eq!(h.generator.call_count(), 1);
    assert_eq!(h.publisher.published(), vec![carried.items.clone()]);
    assert_eq!(snapshot.items, carried.items);

    h.runtime.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_one_bad_section_does_not_block_the_others() {
    let h = Harness::new(options(10));
    let scheduler = SectionScheduler::new(h.runtime.clone());

    let reports = scheduler.ensure_all(vec![input("Sports", 0), input("Health", 2)]);
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(Result::is_ok));

    let sports = h.runtime.wait("section-sports").await.unwrap();
    assert_eq!(
        sports,
        bulletin::WorkflowExit::Finished(ExecutionStatus::Stopped)
    );
    let rejected = h.runtime.query("section-sports").unwrap();
    assert!(rejected.last_error.is_some());

    let health = wait_for_snapshot(&h.runtime, "section-health", |s| s.iteration_count == 1).await;
    assert_eq!(health.items.len(), 2);
    assert_eq!(h.generator.calls().len(), 1);
    assert_eq!(h.generator.calls()[0].section, "Health");

    h.runtime.shutdown().await.unwrap();
}
