//! Integration tests for the execution manager: lifecycle, idempotency,
//! cancellation, and history/stats aggregation.

use std::sync::Arc;
use std::time::Duration;

use flowtrack::engine::manager::{ExecutionManager, StartError};
use flowtrack::engine::runner::{SimulatedStepRunner, StepRunner};
use flowtrack::engine::types::{ExecutionStatus, ExecutionUpdate, WorkflowExecution};
use flowtrack::storage::memory_store::MemoryExecutionStore;
use tokio_util::sync::CancellationToken;

/// Runner that never advances anything — executions stay `running` until
/// the test itself completes or cancels them.
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

fn manager_with_idle_runner() -> Arc<ExecutionManager> {
    ExecutionManager::new(Arc::new(MemoryExecutionStore::new()), Arc::new(IdleRunner))
}

fn manager_with_fast_runner() -> Arc<ExecutionManager> {
    ExecutionManager::new(
        Arc::new(MemoryExecutionStore::new()),
        Arc::new(SimulatedStepRunner::with_step_delay(Duration::from_millis(5))),
    )
}

/// Poll until the execution is observable in a terminal state (live store
/// first, then persisted history).
async fn wait_terminal(manager: &Arc<ExecutionManager>, id: &str) -> WorkflowExecution {
    for _ in 0..500 {
        if let Some(execution) = manager.get(id).await
            && execution.status.is_terminal()
        {
            return execution;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("execution '{}' did not reach a terminal state in time", id);
}

// --- start ---

#[tokio::test]
async fn start_returns_running_record() {
    let manager = manager_with_idle_runner();

    let execution = manager
        .start("wf-kyc", "KYC review", Some("user-7".to_string()), None)
        .await
        .unwrap();

    assert!(!execution.id.is_empty());
    assert_eq!(execution.status, ExecutionStatus::Running);
    assert_eq!(execution.progress, 0);
    assert!(execution.finished_at.is_none());
    assert!(execution.error.is_none());
    assert_eq!(execution.user_id.as_deref(), Some("user-7"));
    assert!(manager.is_running(&execution.id).await);
}

#[tokio::test]
async fn start_rejects_blank_identifiers() {
    let manager = manager_with_idle_runner();

    let err = manager.start("", "KYC review", None, None).await.unwrap_err();
    assert!(matches!(err, StartError::MissingWorkflowId));

    let err = manager.start("wf-kyc", "   ", None, None).await.unwrap_err();
    assert!(matches!(err, StartError::MissingWorkflowName));

    // Nothing was created
    assert_eq!(manager.active_count().await, 0);
}

#[tokio::test]
async fn start_preserves_caller_payload() {
    let manager = manager_with_idle_runner();
    let payload = serde_json::json!({"clientId": 42, "tier": "gold"});

    let execution = manager
        .start("wf-report", "Quarterly report", None, Some(payload.clone()))
        .await
        .unwrap();

    assert_eq!(execution.data, Some(payload));
}

// --- update ---

#[tokio::test]
async fn update_applies_partial_fields() {
    let manager = manager_with_idle_runner();
    let execution = manager
        .start("wf-kyc", "KYC review", None, None)
        .await
        .unwrap();

    manager
        .update(
            &execution.id,
            ExecutionUpdate {
                progress: Some(35),
                current_step: Some("Screening against watchlists".to_string()),
                ..Default::default()
            },
        )
        .await;

    let live = manager.get(&execution.id).await.unwrap();
    assert_eq!(live.progress, 35);
    assert_eq!(live.current_step, "Screening against watchlists");
    assert_eq!(live.status, ExecutionStatus::Running);
}

#[tokio::test]
async fn update_progress_never_regresses() {
    let manager = manager_with_idle_runner();
    let execution = manager
        .start("wf-kyc", "KYC review", None, None)
        .await
        .unwrap();

    manager
        .update(
            &execution.id,
            ExecutionUpdate {
                progress: Some(70),
                ..Default::default()
            },
        )
        .await;
    manager
        .update(
            &execution.id,
            ExecutionUpdate {
                progress: Some(20),
                ..Default::default()
            },
        )
        .await;

    assert_eq!(manager.get(&execution.id).await.unwrap().progress, 70);
}

#[tokio::test]
async fn update_unknown_id_is_noop() {
    let manager = manager_with_idle_runner();
    let execution = manager
        .start("wf-kyc", "KYC review", None, None)
        .await
        .unwrap();

    manager
        .update(
            "no-such-id",
            ExecutionUpdate {
                progress: Some(99),
                ..Default::default()
            },
        )
        .await;

    // The real execution is untouched
    assert_eq!(manager.get(&execution.id).await.unwrap().progress, 0);
    assert_eq!(manager.active_count().await, 1);
}

// --- complete / cancel ---

#[tokio::test]
async fn complete_retires_execution_from_live_store() {
    let manager = manager_with_idle_runner();
    let execution = manager
        .start("wf-kyc", "KYC review", None, None)
        .await
        .unwrap();

    manager
        .complete(&execution.id, ExecutionStatus::Succeeded, None)
        .await;

    assert!(!manager.is_running(&execution.id).await);
    assert_eq!(manager.active_count().await, 0);

    // Still resolvable through persisted history
    let finished = wait_terminal(&manager, &execution.id).await;
    assert_eq!(finished.status, ExecutionStatus::Succeeded);
    assert_eq!(finished.progress, 100);
    assert!(finished.finished_at.unwrap() >= finished.started_at);
}

#[tokio::test]
async fn complete_is_idempotent() {
    let manager = manager_with_idle_runner();
    let execution = manager
        .start("wf-kyc", "KYC review", None, None)
        .await
        .unwrap();

    manager
        .complete(&execution.id, ExecutionStatus::Succeeded, None)
        .await;
    // A racing second completion must not overwrite the first outcome
    manager
        .complete(
            &execution.id,
            ExecutionStatus::Failed,
            Some("late failure".to_string()),
        )
        .await;

    let finished = wait_terminal(&manager, &execution.id).await;
    assert_eq!(finished.status, ExecutionStatus::Succeeded);
    assert!(finished.error.is_none());
}

#[tokio::test]
async fn complete_refuses_non_terminal_status() {
    let manager = manager_with_idle_runner();
    let execution = manager
        .start("wf-kyc", "KYC review", None, None)
        .await
        .unwrap();

    manager
        .complete(&execution.id, ExecutionStatus::Running, None)
        .await;

    assert!(manager.is_running(&execution.id).await);
}

#[tokio::test]
async fn cancel_freezes_progress_and_records_reason() {
    let manager = manager_with_idle_runner();
    let execution = manager
        .start("wf-kyc", "KYC review", None, None)
        .await
        .unwrap();

    manager
        .update(
            &execution.id,
            ExecutionUpdate {
                progress: Some(45),
                ..Default::default()
            },
        )
        .await;
    manager.cancel(&execution.id).await;

    let finished = wait_terminal(&manager, &execution.id).await;
    assert_eq!(finished.status, ExecutionStatus::Cancelled);
    assert_eq!(finished.progress, 45);
    assert_eq!(finished.error.as_deref(), Some("Execution cancelled by user"));
    assert!(finished.finished_at.is_some());
}

#[tokio::test]
async fn cancel_unknown_id_is_noop() {
    let manager = manager_with_idle_runner();
    manager.cancel("no-such-id").await;
    assert_eq!(manager.active_count().await, 0);
}

// --- queries ---

#[tokio::test]
async fn list_active_snapshots_running_executions() {
    let manager = manager_with_idle_runner();

    let a = manager.start("wf-a", "Alpha", None, None).await.unwrap();
    let b = manager.start("wf-b", "Beta", None, None).await.unwrap();

    let active = manager.list_active().await;
    assert_eq!(active.len(), 2);

    manager.cancel(&a.id).await;
    let active = manager.list_active().await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, b.id);
}

#[tokio::test]
async fn get_unknown_id_is_none() {
    let manager = manager_with_idle_runner();
    assert!(manager.get("no-such-id").await.is_none());
}

#[tokio::test]
async fn stats_match_manual_history_count() {
    let manager = manager_with_fast_runner();

    let ok = manager.start("wf-a", "Alpha", None, None).await.unwrap();
    let failed = manager
        .start(
            "wf-b",
            "Beta",
            None,
            Some(serde_json::json!({"simulateFailure": true})),
        )
        .await
        .unwrap();

    wait_terminal(&manager, &ok.id).await;
    wait_terminal(&manager, &failed.id).await;

    let history = manager.history(100).await.unwrap();
    let stats = manager.stats().await.unwrap();

    assert_eq!(stats.total as usize, history.len());
    assert_eq!(
        stats.total,
        stats.running + stats.succeeded + stats.failed + stats.cancelled
    );
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.failed, 1);
}

#[tokio::test]
async fn concurrent_executions_do_not_interleave() {
    let manager = manager_with_fast_runner();

    // Same workflow, two independent runs
    let first = manager
        .start("wf-recon", "Reconciliation", None, None)
        .await
        .unwrap();
    let second = manager
        .start("wf-recon", "Reconciliation", None, None)
        .await
        .unwrap();
    assert_ne!(first.id, second.id);

    let first_done = wait_terminal(&manager, &first.id).await;
    let second_done = wait_terminal(&manager, &second.id).await;

    assert_eq!(first_done.status, ExecutionStatus::Succeeded);
    assert_eq!(second_done.status, ExecutionStatus::Succeeded);
    assert_eq!(first_done.id, first.id);
    assert_eq!(second_done.id, second.id);
    assert_eq!(first_done.progress, 100);
    assert_eq!(second_done.progress, 100);
}
