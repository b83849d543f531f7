//! Tests for the status monitor: aggregate snapshots while work is in
//! flight, silence when idle, idempotent start, clean stop.

use std::sync::Arc;
use std::time::Duration;

use flowtrack::engine::bus::ExecutionEvent;
use flowtrack::engine::manager::ExecutionManager;
use flowtrack::engine::monitor::StatusMonitor;
use flowtrack::engine::runner::StepRunner;
use flowtrack::storage::memory_store::MemoryExecutionStore;
use tokio_util::sync::CancellationToken;

struct IdleRunner;

#[async_trait::async_trait]
impl StepRunner for IdleRunner {
    async fn run(
        &self,
        _manager: Arc<ExecutionManager>,
        _execution_id: String,
        _cancel: CancellationToken,
    ) {
    }
}

fn manager() -> Arc<ExecutionManager> {
    ExecutionManager::new(Arc::new(MemoryExecutionStore::new()), Arc::new(IdleRunner))
}

#[tokio::test]
async fn publishes_snapshot_while_executions_are_active() {
    let manager = manager();
    let execution = manager
        .start("wf-kyc", "KYC review", None, None)
        .await
        .unwrap();

    let monitor = StatusMonitor::new(Arc::clone(&manager), Duration::from_millis(20));
    let mut rx = manager.subscribe();
    monitor.start();

    // Skip per-execution noise until the aggregate arrives
    let snapshot = loop {
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no aggregate snapshot published")
            .expect("event bus closed");
        if let ExecutionEvent::StatusSnapshot(snapshot) = event {
            break snapshot;
        }
    };

    assert_eq!(snapshot.total_active, 1);
    assert_eq!(snapshot.executions.len(), 1);
    assert_eq!(snapshot.executions[0].id, execution.id);

    monitor.stop().await;
}

#[tokio::test]
async fn stays_silent_when_nothing_is_running() {
    let manager = manager();
    let monitor = StatusMonitor::new(Arc::clone(&manager), Duration::from_millis(10));
    let mut rx = manager.subscribe();
    monitor.start();

    let result = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(result.is_err(), "expected no events on an idle tracker");

    monitor.stop().await;
}

#[tokio::test]
async fn start_is_idempotent_and_stop_is_clean() {
    let manager = manager();
    let monitor = StatusMonitor::new(Arc::clone(&manager), Duration::from_millis(10));

    assert!(!monitor.is_running());
    monitor.start();
    monitor.start(); // second start is a no-op
    assert!(monitor.is_running());

    monitor.stop().await;
    assert!(!monitor.is_running());

    // Stopping again is fine
    monitor.stop().await;

    // And it can be started back up afterwards
    monitor.start();
    assert!(monitor.is_running());
    monitor.stop().await;
}

#[tokio::test]
async fn snapshots_stop_after_last_execution_finishes() {
    let manager = manager();
    let execution = manager
        .start("wf-kyc", "KYC review", None, None)
        .await
        .unwrap();

    let monitor = StatusMonitor::new(Arc::clone(&manager), Duration::from_millis(10));
    monitor.start();

    manager.cancel(&execution.id).await;

    // Drain whatever was in flight, then expect silence
    let mut rx = manager.subscribe();
    tokio::time::sleep(Duration::from_millis(50)).await;
    while rx.try_recv().is_ok() {}

    let result = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(result.is_err(), "monitor kept publishing for an empty set");

    monitor.stop().await;
}
