//! Cancellation hierarchy: scope cancel reaches every descendant, joins
//! stay bounded, and supervision policies decide what a failure does to
//! siblings.

mod common;

use common::init_test_logging;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use taskloom::{
    now, sleep, CancelKind, JoinError, Runtime, ScopeOptions, ScopeOutcome, SupervisionPolicy,
    TaskError, Time,
};

#[test]
fn cancel_mid_sleep_cancels_both_children_promptly() {
    init_test_logging();
    test_phase!("cancel_mid_sleep_cancels_both_children_promptly");

    let mut rt = Runtime::new();
    let scope = rt.new_scope(ScopeOptions::new());
    let worker = scope.clone();
    let outcome = rt.spawn(async move {
        let short = worker.spawn_child(async {
            sleep(Duration::from_millis(500)).await;
        });
        let long = worker.spawn_child(async {
            sleep(Duration::from_millis(1000)).await;
        });
        sleep(Duration::from_millis(200)).await;
        worker.cancel();
        let results = (short.join().await, long.join().await);
        (results, worker.join().await, now())
    });
    let report = rt.run();

    assert!(report.is_quiescent());
    assert_eq!(report.cancelled, 2);
    let ((short, long), scope_outcome, finished_at) = outcome.try_join().unwrap().unwrap();
    assert!(matches!(short, Err(JoinError::Cancelled(_))));
    assert!(matches!(long, Err(JoinError::Cancelled(_))));
    assert!(matches!(scope_outcome, ScopeOutcome::Cancelled(_)));
    // The join resolves at the cancel instant, not at either sleep deadline.
    assert_eq!(finished_at, Time::from_millis(200));
    test_complete!("cancel_mid_sleep_cancels_both_children_promptly");
}

#[test]
fn cancellation_reaches_arbitrary_nesting() {
    init_test_logging();
    test_phase!("cancellation_reaches_arbitrary_nesting");

    let mut rt = Runtime::new();
    let root = rt.new_scope(ScopeOptions::new());
    let mut scope = root.clone();
    let mut leaves = Vec::new();
    for _ in 0..5 {
        scope = scope.child_scope(ScopeOptions::new());
        leaves.push(scope.spawn_child(async {
            sleep(Duration::from_secs(3600)).await;
        }));
    }
    // Park every leaf on its timer before cancelling the top.
    while rt.step() {}
    root.cancel();
    let report = rt.run();

    assert!(report.is_quiescent());
    assert_eq!(report.cancelled, 5);
    for leaf in leaves {
        match leaf.try_join().unwrap().unwrap_err() {
            JoinError::Cancelled(reason) => {
                // cancel() propagates its own reason down the whole tree.
                assert_eq!(reason.kind(), CancelKind::User);
            }
            JoinError::Failed(error) => panic!("expected cancellation, got {error}"),
        }
    }
    assert!(matches!(
        root.outcome(),
        Some(ScopeOutcome::Cancelled(_))
    ));
    test_complete!("cancellation_reaches_arbitrary_nesting");
}

#[test]
fn fail_fast_failure_cancels_siblings_and_fails_scope() {
    init_test_logging();
    test_phase!("fail_fast_failure_cancels_siblings_and_fails_scope");

    let mut rt = Runtime::new();
    let scope = rt.new_scope(ScopeOptions::new().with_policy(SupervisionPolicy::FailFast));
    let worker = scope.clone();
    let outcome = rt.spawn(async move {
        let _sibling = worker.spawn_child(async {
            sleep(Duration::from_secs(60)).await;
            "never"
        });
        let _failing = worker.spawn_child_try(async {
            sleep(Duration::from_millis(100)).await;
            Err::<(), _>(TaskError::failed("worker broke"))
        });
        worker.join().await
    });
    let report = rt.run();

    assert!(report.is_quiescent());
    assert_eq!(report.failed, 1);
    assert_eq!(report.cancelled, 1);
    match outcome.try_join().unwrap().unwrap() {
        ScopeOutcome::Failed(error) => assert_eq!(error.message(), Some("worker broke")),
        other => panic!("expected scope failure, got {other:?}"),
    }
    test_complete!("fail_fast_failure_cancels_siblings_and_fails_scope");
}

#[test]
fn collect_all_lets_siblings_finish() {
    init_test_logging();
    test_phase!("collect_all_lets_siblings_finish");

    let mut rt = Runtime::new();
    let scope = rt.new_scope(
        ScopeOptions::new()
            .with_policy(SupervisionPolicy::CollectAll)
            .with_failure_handler(|_, _| {}),
    );
    let worker = scope.clone();
    let outcome = rt.spawn(async move {
        let survivor = worker.spawn_child(async {
            sleep(Duration::from_millis(300)).await;
            "survived"
        });
        let _failing = worker.spawn_child_try(async {
            Err::<(), _>(TaskError::failed("one of many"))
        });
        let value = survivor.join().await.unwrap();
        (value, worker.join().await)
    });
    let report = rt.run();

    assert!(report.is_quiescent());
    assert_eq!(report.completed, 2);
    assert_eq!(report.failed, 1);
    let (value, scope_outcome) = outcome.try_join().unwrap().unwrap();
    assert_eq!(value, "survived");
    // The collected failure still decides the aggregate.
    assert!(matches!(scope_outcome, ScopeOutcome::Failed(_)));
    test_complete!("collect_all_lets_siblings_finish");
}

#[test]
fn cancelled_children_do_not_count_as_failures() {
    init_test_logging();
    test_phase!("cancelled_children_do_not_count_as_failures");

    let mut rt = Runtime::new();
    let scope = rt.new_scope(ScopeOptions::new().with_policy(SupervisionPolicy::FailFast));
    let worker = scope.clone();
    let outcome = rt.spawn(async move {
        let child = worker.spawn_child(async {
            sleep(Duration::from_secs(60)).await;
        });
        let sibling = worker.spawn_child(async {
            sleep(Duration::from_millis(100)).await;
            "untouched"
        });
        child.cancel_and_join().await.unwrap_err();
        let survivor = sibling.join().await;
        (survivor, worker.join().await)
    });
    let report = rt.run();

    // A cancelled child never triggers fail-fast: the sibling runs to
    // completion and the aggregate is not a failure.
    assert_eq!(report.failed, 0);
    let (survivor, scope_outcome) = outcome.try_join().unwrap().unwrap();
    assert_eq!(survivor.unwrap(), "untouched");
    assert!(!scope_outcome.is_failed());
    test_complete!("cancelled_children_do_not_count_as_failures");
}

#[test]
fn spawn_into_cancelled_scope_is_born_cancelled() {
    init_test_logging();
    test_phase!("spawn_into_cancelled_scope_is_born_cancelled");

    let mut rt = Runtime::new();
    let scope = rt.new_scope(ScopeOptions::new());
    scope.cancel();
    let ran = Arc::new(Mutex::new(false));
    let flag = Arc::clone(&ran);
    let handle = scope.spawn_child(async move {
        *flag.lock().unwrap() = true;
    });
    let report = rt.run();

    assert!(report.is_quiescent());
    assert!(!*ran.lock().unwrap());
    assert!(matches!(
        handle.try_join().unwrap().unwrap_err(),
        JoinError::Cancelled(_)
    ));
    assert!(!scope.is_active());
    test_complete!("spawn_into_cancelled_scope_is_born_cancelled");
}
