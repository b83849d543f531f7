use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::engine::types::WorkflowExecution;

/// Default broadcast channel capacity. A subscriber that falls further
/// behind than this loses its oldest events (observed as a `Lagged` recv
/// error); the publisher is never blocked.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Lifecycle event fanned out to every connected observer.
///
/// Serializes as `{"event": "<name>", "payload": {...}}` using the message
/// names the dashboard listens for.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload")]
pub enum ExecutionEvent {
    #[serde(rename = "workflow-execution-started")]
    Started(WorkflowExecution),
    #[serde(rename = "workflow-execution-update")]
    Updated(WorkflowExecution),
    #[serde(rename = "workflow-execution-completed")]
    Completed(WorkflowExecution),
    #[serde(rename = "workflow-executions-status")]
    StatusSnapshot(StatusSnapshot),
}

impl ExecutionEvent {
    /// Wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            ExecutionEvent::Started(_) => "workflow-execution-started",
            ExecutionEvent::Updated(_) => "workflow-execution-update",
            ExecutionEvent::Completed(_) => "workflow-execution-completed",
            ExecutionEvent::StatusSnapshot(_) => "workflow-executions-status",
        }
    }

    /// Execution id this event concerns, if it concerns a single one.
    pub fn execution_id(&self) -> Option<&str> {
        match self {
            ExecutionEvent::Started(e)
            | ExecutionEvent::Updated(e)
            | ExecutionEvent::Completed(e) => Some(&e.id),
            ExecutionEvent::StatusSnapshot(_) => None,
        }
    }
}

/// Aggregate view of every in-flight execution, republished periodically by
/// the monitoring loop.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub executions: Vec<WorkflowExecution>,
    pub total_active: usize,
    pub timestamp: DateTime<Utc>,
}

/// Publish/subscribe hub for execution lifecycle events.
///
/// Publishing never blocks and never fails when nobody is listening. A
/// subscriber receives every event published strictly after it subscribed,
/// in publish order; there is no replay of history.
#[derive(Debug)]
pub struct EventBus {
    tx: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn publish(&self, event: ExecutionEvent) {
        // send only errors when there are no receivers; that is fine here.
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
