use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::engine::bus::{EventBus, ExecutionEvent};
use crate::engine::runner::StepRunner;
use crate::engine::store::RecordStore;
use crate::engine::types::{
    ExecutionStats, ExecutionStatus, ExecutionUpdate, WorkflowExecution,
};
use crate::storage::ExecutionStore;

/// Synchronous validation failures on `start`. Everything else in the
/// manager's contract is a silent no-op, never an error.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("workflowId is required")]
    MissingWorkflowId,
    #[error("workflowName is required")]
    MissingWorkflowName,
}

/// The execution tracker façade.
///
/// Owns the live record store, the broadcast hub, and the persistence
/// queue. Constructed once at process start and shared as an `Arc` with the
/// HTTP layer, the monitoring loop, and every spawned step runner — there is
/// no global instance.
pub struct ExecutionManager {
    active: RecordStore,
    store: Arc<dyn ExecutionStore>,
    bus: EventBus,
    runner: Arc<dyn StepRunner>,
    /// One token per live execution; cancelled on terminal transition so the
    /// runner's next checkpoint unwinds without touching the record again.
    tokens: Mutex<HashMap<String, CancellationToken>>,
    persist_tx: mpsc::UnboundedSender<WorkflowExecution>,
}

impl ExecutionManager {
    /// Build the manager and spawn its persistence writer.
    ///
    /// Durable writes are applied by a single task draining an ordered
    /// queue: the live view is never rolled back on a write failure, but the
    /// store always sees one execution's transitions in mutation order.
    pub fn new(store: Arc<dyn ExecutionStore>, runner: Arc<dyn StepRunner>) -> Arc<Self> {
        let (persist_tx, mut persist_rx) = mpsc::unbounded_channel::<WorkflowExecution>();

        let writer_store = Arc::clone(&store);
        tokio::spawn(async move {
            while let Some(execution) = persist_rx.recv().await {
                if let Err(e) = writer_store.save(&execution).await {
                    let err_msg = format!("{:#}", e);
                    error!(
                        execution_id = %execution.id,
                        error = %err_msg,
                        "Failed to persist execution state"
                    );
                }
            }
        });

        Arc::new(Self {
            active: RecordStore::new(),
            store,
            bus: EventBus::default(),
            runner,
            tokens: Mutex::new(HashMap::new()),
            persist_tx,
        })
    }

    /// Register a new execution and hand it to the step runner.
    ///
    /// Returns the freshly created record (not yet advanced). The runner
    /// progresses it asynchronously; callers observe the outcome via
    /// `get`/`history` or the broadcast hub.
    pub async fn start(
        self: &Arc<Self>,
        workflow_id: &str,
        workflow_name: &str,
        user_id: Option<String>,
        data: Option<serde_json::Value>,
    ) -> Result<WorkflowExecution, StartError> {
        if workflow_id.trim().is_empty() {
            return Err(StartError::MissingWorkflowId);
        }
        if workflow_name.trim().is_empty() {
            return Err(StartError::MissingWorkflowName);
        }

        let execution = WorkflowExecution {
            id: Uuid::new_v4().to_string(),
            workflow_id: workflow_id.to_string(),
            workflow_name: workflow_name.to_string(),
            status: ExecutionStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            progress: 0,
            current_step: "Queued".to_string(),
            error: None,
            data,
            user_id,
        };

        let token = CancellationToken::new();
        self.tokens
            .lock()
            .expect("cancellation token map poisoned")
            .insert(execution.id.clone(), token.clone());

        self.active
            .insert(execution.clone(), |stored| {
                self.enqueue_persist(stored);
                self.bus.publish(ExecutionEvent::Started(stored.clone()));
            })
            .await;

        info!(
            execution_id = %execution.id,
            workflow = %execution.workflow_name,
            "Execution started"
        );

        let manager = Arc::clone(self);
        let runner = Arc::clone(&self.runner);
        let id = execution.id.clone();
        tokio::spawn(async move {
            runner.run(manager, id, token).await;
        });

        Ok(execution)
    }

    /// Apply a partial update to a live execution.
    ///
    /// Unknown or already-terminal ids are ignored: a cancel racing a
    /// natural completion must never corrupt state, so late updates simply
    /// evaporate.
    pub async fn update(&self, id: &str, update: ExecutionUpdate) {
        let applied = self
            .active
            .mutate(
                id,
                |execution| execution.apply(&update),
                |execution| {
                    self.enqueue_persist(execution);
                    self.bus.publish(ExecutionEvent::Updated(execution.clone()));
                },
            )
            .await;

        if !applied {
            debug!(execution_id = %id, "Ignoring update for unknown or finished execution");
        }
    }

    /// Drive an execution into a terminal state and retire it from the live
    /// store. Idempotent: a second completion for the same id is a no-op.
    pub async fn complete(&self, id: &str, status: ExecutionStatus, error: Option<String>) {
        if !status.is_terminal() {
            warn!(execution_id = %id, status = %status, "Refusing completion to a non-terminal status");
            return;
        }

        let removed = self
            .active
            .remove(
                id,
                |execution| {
                    execution.finished_at = Some(Utc::now());
                    execution.current_step = match status {
                        ExecutionStatus::Succeeded => "Completed successfully".to_string(),
                        ExecutionStatus::Failed => "Execution failed".to_string(),
                        _ => "Execution cancelled".to_string(),
                    };
                    if status == ExecutionStatus::Succeeded {
                        execution.progress = 100;
                    }
                    execution.error = error.clone();
                    execution.status = status.clone();
                },
                |execution| {
                    self.enqueue_persist(execution);
                    self.bus
                        .publish(ExecutionEvent::Completed(execution.clone()));
                },
            )
            .await;

        match removed {
            Some(execution) => {
                if let Some(token) = self
                    .tokens
                    .lock()
                    .expect("cancellation token map poisoned")
                    .remove(id)
                {
                    token.cancel();
                }
                info!(
                    execution_id = %id,
                    status = %execution.status,
                    progress = execution.progress,
                    "Execution finished"
                );
            }
            None => {
                debug!(execution_id = %id, "Ignoring completion for unknown or finished execution");
            }
        }
    }

    /// Cancel a running execution. Fire-and-forget; no-op if not running.
    pub async fn cancel(&self, id: &str) {
        self.complete(
            id,
            ExecutionStatus::Cancelled,
            Some("Execution cancelled by user".to_string()),
        )
        .await;
    }

    /// Look up an execution: live store first, then persisted history, so
    /// finished executions stay resolvable.
    pub async fn get(&self, id: &str) -> Option<WorkflowExecution> {
        if let Some(execution) = self.active.get(id).await {
            return Some(execution);
        }

        match self.store.fetch(id).await {
            Ok(found) => found,
            Err(e) => {
                let err_msg = format!("{:#}", e);
                error!(execution_id = %id, error = %err_msg, "History lookup failed");
                None
            }
        }
    }

    /// True while the execution is present in the live store.
    pub async fn is_running(&self, id: &str) -> bool {
        self.active.get(id).await.is_some()
    }

    /// Snapshot of every in-flight execution at call time.
    pub async fn list_active(&self) -> Vec<WorkflowExecution> {
        self.active.snapshot().await
    }

    pub async fn active_count(&self) -> usize {
        self.active.len().await
    }

    /// Persisted history, most recent first.
    pub async fn history(&self, limit: u32) -> Result<Vec<WorkflowExecution>> {
        self.store.history(limit).await
    }

    /// Aggregate counters over the whole persisted history.
    pub async fn stats(&self) -> Result<ExecutionStats> {
        self.store.stats().await
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Subscribe to the broadcast hub. Receives every event published after
    /// this call; no replay.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.bus.subscribe()
    }

    fn enqueue_persist(&self, execution: &WorkflowExecution) {
        if self.persist_tx.send(execution.clone()).is_err() {
            error!(
                execution_id = %execution.id,
                "Persistence writer is gone; dropping durable write"
            );
        }
    }
}
