use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use crate::engine::types::{ExecutionStats, WorkflowExecution};
use crate::storage::ExecutionStore;

/// In-memory history store for tests and ephemeral deployments.
/// Rows live only as long as the store instance.
pub struct MemoryExecutionStore {
    rows: Mutex<HashMap<String, WorkflowExecution>>,
}

impl MemoryExecutionStore {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryExecutionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionStore for MemoryExecutionStore {
    async fn save(&self, execution: &WorkflowExecution) -> Result<()> {
        self.rows
            .lock()
            .unwrap()
            .insert(execution.id.clone(), execution.clone());
        Ok(())
    }

    async fn fetch(&self, id: &str) -> Result<Option<WorkflowExecution>> {
        Ok(self.rows.lock().unwrap().get(id).cloned())
    }

    async fn history(&self, limit: u32) -> Result<Vec<WorkflowExecution>> {
        let mut rows: Vec<WorkflowExecution> =
            self.rows.lock().unwrap().values().cloned().collect();

        // Most recent activity first: finish time for terminal rows, start
        // time for ones still marked running.
        rows.sort_by_key(|row| std::cmp::Reverse(row.finished_at.unwrap_or(row.started_at)));
        rows.truncate(limit as usize);

        Ok(rows)
    }

    async fn stats(&self) -> Result<ExecutionStats> {
        let rows: Vec<WorkflowExecution> =
            self.rows.lock().unwrap().values().cloned().collect();
        Ok(ExecutionStats::from_executions(&rows))
    }
}
