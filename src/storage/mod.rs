pub mod memory_store;
pub mod sqlite_store;

use anyhow::Result;
use async_trait::async_trait;

use crate::engine::types::{ExecutionStats, WorkflowExecution};

/// Durable history of every execution ever created.
///
/// Writes are dispatched fire-and-forget from the manager's serialized
/// mutation path; a failed write is logged and never rolls back the live
/// view. Rows survive the live record's removal.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Insert or update the row for this execution id.
    async fn save(&self, execution: &WorkflowExecution) -> Result<()>;

    /// Read back a single execution by id.
    async fn fetch(&self, id: &str) -> Result<Option<WorkflowExecution>>;

    /// Time-ordered history, most recent first.
    async fn history(&self, limit: u32) -> Result<Vec<WorkflowExecution>>;

    /// Aggregate counters over the full history.
    async fn stats(&self) -> Result<ExecutionStats>;
}
