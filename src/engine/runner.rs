use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::engine::manager::ExecutionManager;
use crate::engine::types::{ExecutionStatus, ExecutionUpdate, WorkflowExecution};

/// Advances a single execution through its steps.
///
/// This is the seam where real step logic plugs in: the manager only ever
/// calls `run` on a spawned task, once per execution, so an implementation
/// owns its id exclusively and its updates are naturally sequential.
#[async_trait]
pub trait StepRunner: Send + Sync {
    async fn run(
        &self,
        manager: Arc<ExecutionManager>,
        execution_id: String,
        cancel: CancellationToken,
    );
}

/// Fixed step sequence with progress checkpoints, stand-in for real work.
const SIMULATED_STEPS: &[(&str, u8)] = &[
    ("Initializing execution context", 10),
    ("Loading workflow definition", 25),
    ("Executing workflow steps", 50),
    ("Processing results", 75),
    ("Finalizing output", 95),
];

/// Step index at which a `simulateFailure` payload takes effect, so a
/// simulated failure still leaves partial progress behind.
const FAILURE_CHECKPOINT: usize = 2;

/// Step runner that simulates work with timed delays.
pub struct SimulatedStepRunner {
    step_delay: Duration,
}

impl SimulatedStepRunner {
    pub fn new() -> Self {
        Self {
            step_delay: Duration::from_millis(800),
        }
    }

    pub fn with_step_delay(step_delay: Duration) -> Self {
        Self { step_delay }
    }

    /// Walk the step table. Returns Ok(true) when the full sequence ran,
    /// Ok(false) when the execution stopped being ours to advance (cancelled
    /// or otherwise terminal), Err on a step failure.
    async fn advance(
        &self,
        manager: &Arc<ExecutionManager>,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        for (index, (step_name, progress)) in SIMULATED_STEPS.iter().enumerate() {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(execution_id = %id, "Step runner stopping at cancelled checkpoint");
                    return Ok(false);
                }
                _ = tokio::time::sleep(self.step_delay) => {}
            }

            // The terminal state recorded by cancel/complete is
            // authoritative; a stale runner must not write past it.
            let Some(execution) = manager.get(id).await else {
                return Ok(false);
            };
            if execution.status != ExecutionStatus::Running {
                return Ok(false);
            }

            if index == FAILURE_CHECKPOINT && failure_requested(&execution) {
                anyhow::bail!("Step '{}' failed: simulated failure requested", step_name);
            }

            manager
                .update(
                    id,
                    ExecutionUpdate {
                        progress: Some(*progress),
                        current_step: Some((*step_name).to_string()),
                        ..Default::default()
                    },
                )
                .await;
        }

        Ok(true)
    }
}

impl Default for SimulatedStepRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StepRunner for SimulatedStepRunner {
    async fn run(
        &self,
        manager: Arc<ExecutionManager>,
        execution_id: String,
        cancel: CancellationToken,
    ) {
        match self.advance(&manager, &execution_id, &cancel).await {
            Ok(true) => {
                manager
                    .complete(&execution_id, ExecutionStatus::Succeeded, None)
                    .await;
            }
            // Terminal state already recorded elsewhere; nothing to do.
            Ok(false) => {}
            Err(e) => {
                manager
                    .complete(
                        &execution_id,
                        ExecutionStatus::Failed,
                        Some(format!("{:#}", e)),
                    )
                    .await;
            }
        }
    }
}

fn failure_requested(execution: &WorkflowExecution) -> bool {
    execution
        .data
        .as_ref()
        .and_then(|data| data.get("simulateFailure"))
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false)
}
