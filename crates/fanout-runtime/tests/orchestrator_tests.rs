// crates/fanout-runtime/tests/orchestrator_tests.rs
//
// End-to-end tests of the orchestrator with real tokio execution units.
// Task costs are a few milliseconds so each test finishes quickly.

use std::sync::Arc;
use std::time::Duration;

use fanout_core::{
    Dispatcher, FanoutError, MembershipChange, PolicyConfig, PolicyKind, PoolConfig, Priority,
    TaskRequest, TaskState,
};
use fanout_runtime::{DispatchEvent, Orchestrator, RuntimeState, SleepExecutor};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn dispatcher(kind: PolicyKind, workers: usize, capacity: usize) -> Dispatcher {
    Dispatcher::new(
        &PoolConfig::new(workers).with_capacity(capacity),
        &PolicyConfig::new(kind).with_seed(4),
    )
    .unwrap()
    .with_validation(true)
}

fn task(cost_ms: u64) -> TaskRequest {
    TaskRequest::new(Duration::from_millis(cost_ms))
}

async fn with_timeout<F: std::future::Future>(f: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), f)
        .await
        .expect("operation timed out")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_all_tasks_complete_and_drain() {
    let (handle, join) = Orchestrator::spawn(
        dispatcher(PolicyKind::LeastConnections, 3, 1),
        Arc::new(SleepExecutor::default()),
    );

    let mut ids = Vec::new();
    for _ in 0..12 {
        ids.push(handle.submit(task(5)).await.unwrap());
    }
    with_timeout(handle.drain()).await.unwrap();

    for id in ids {
        assert_eq!(handle.task_state(id).await.unwrap(), Some(TaskState::Completed));
    }
    let (stats, load) = handle.stats().await.unwrap();
    assert_eq!(stats.submitted, 12);
    assert_eq!(stats.completed, 12);
    assert_eq!(load.max, 0);

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.iter().map(|w| w.completed).sum::<u64>(), 12);
    assert!(snapshot.iter().all(|w| !w.busy));

    handle.shutdown().await.unwrap();
    with_timeout(join).await.unwrap();
}

#[tokio::test]
async fn test_events_follow_task_lifecycle() {
    let (handle, _join) = Orchestrator::spawn(
        dispatcher(PolicyKind::RoundRobin, 2, 1),
        Arc::new(SleepExecutor::default()),
    );
    let mut events = handle.subscribe();

    let id = handle.submit(task(2)).await.unwrap();
    with_timeout(handle.drain()).await.unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        if event.task_id() == Some(id) {
            seen.push(event);
        }
    }
    assert_eq!(seen.len(), 3);
    assert!(matches!(seen[0], DispatchEvent::Queued { .. }));
    assert!(matches!(seen[1], DispatchEvent::Assigned { worker_id: 0, .. }));
    assert!(matches!(seen[2], DispatchEvent::Completed { worker_id: 0, .. }));
    assert!(seen[0].at() <= seen[2].at());
}

#[tokio::test]
async fn test_priority_batch_dispatch_order() {
    let (handle, _join) = Orchestrator::spawn(
        dispatcher(PolicyKind::PriorityQueue, 1, 1),
        Arc::new(SleepExecutor::default()),
    );
    let mut events = handle.subscribe();

    handle
        .submit_all(vec![
            task(2).with_priority(Priority::Low),
            task(2).with_priority(Priority::Low),
            task(2).with_priority(Priority::High),
            task(2).with_priority(Priority::Medium),
        ])
        .await
        .unwrap();
    with_timeout(handle.drain()).await.unwrap();

    let mut order = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let DispatchEvent::Assigned { task_id, .. } = event {
            order.push(task_id);
        }
    }
    assert_eq!(order, vec![3, 4, 1, 2]);
}

#[tokio::test]
async fn test_blind_policy_overcommit_completes() {
    // Round robin stacks tasks on busy workers; the units queue them on
    // their semaphores and every task still completes exactly once.
    let (handle, _join) = Orchestrator::spawn(
        dispatcher(PolicyKind::RoundRobin, 2, 1),
        Arc::new(SleepExecutor::default()),
    );
    handle
        .submit_all((0..8).map(|_| task(3)).collect())
        .await
        .unwrap();
    let snapshot = handle.snapshot().await.unwrap();
    assert!(snapshot.iter().any(|w| w.active_count > w.capacity));

    with_timeout(handle.drain()).await.unwrap();
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot[0].completed, 4);
    assert_eq!(snapshot[1].completed, 4);
}

#[tokio::test]
async fn test_membership_change_emits_rebalance() {
    let (handle, _join) = Orchestrator::spawn(
        dispatcher(PolicyKind::ConsistentHash, 3, 1),
        Arc::new(SleepExecutor::default()),
    );
    let mut events = handle.subscribe();
    for i in 0..20 {
        handle
            .submit(task(1).with_key(format!("session-{}", i)))
            .await
            .unwrap();
    }
    with_timeout(handle.drain()).await.unwrap();

    let report = handle
        .membership(MembershipChange::RemoveWorker(2))
        .await
        .unwrap();
    assert_eq!(report.total_keys, 20);
    assert!(report.moved.iter().all(|m| m.from.as_deref() == Some("worker-2")));

    let mut rebalanced = false;
    while let Ok(event) = events.try_recv() {
        if let DispatchEvent::Rebalanced { moved, .. } = event {
            assert_eq!(moved, report.moved_count());
            rebalanced = true;
        }
    }
    assert!(rebalanced);
}

#[tokio::test]
async fn test_membership_unsupported_for_least_connections() {
    let (handle, _join) = Orchestrator::spawn(
        dispatcher(PolicyKind::LeastConnections, 2, 1),
        Arc::new(SleepExecutor::default()),
    );
    let err = handle
        .membership(MembershipChange::AddWorker(0))
        .await
        .unwrap_err();
    assert!(matches!(err, FanoutError::Unsupported(_)));
}

#[tokio::test]
async fn test_submit_rejected_while_draining() {
    let (handle, _join) = Orchestrator::spawn(
        dispatcher(PolicyKind::LeastConnections, 1, 1),
        Arc::new(SleepExecutor::default()),
    );
    handle.submit(task(100)).await.unwrap();

    let drainer = handle.clone();
    let drain = tokio::spawn(async move { drainer.drain().await });
    // Give the drain command time to reach the event loop.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(handle.state().await.unwrap(), RuntimeState::Draining);
    assert!(matches!(
        handle.submit(task(1)).await,
        Err(FanoutError::InvalidState(_))
    ));

    with_timeout(drain).await.unwrap().unwrap();
    assert_eq!(handle.state().await.unwrap(), RuntimeState::Running);
    handle.submit(task(1)).await.unwrap();
}

#[tokio::test]
async fn test_handle_errors_after_shutdown() {
    let (handle, join) = Orchestrator::spawn(
        dispatcher(PolicyKind::RoundRobin, 1, 1),
        Arc::new(SleepExecutor::default()),
    );
    handle.shutdown().await.unwrap();
    with_timeout(join).await.unwrap();
    assert!(matches!(
        handle.submit(task(1)).await,
        Err(FanoutError::Runtime(_))
    ));
}
