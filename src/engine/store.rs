use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::engine::types::WorkflowExecution;

/// Live table of in-flight executions, keyed by execution id.
///
/// Holds only `running` records: a record is inserted on start and removed
/// on its terminal transition. All mutation goes through the execution
/// manager, which serializes writes behind this store's write lock. The
/// `on_commit` callbacks run before the lock is released, so side effects
/// (persistence enqueue, broadcast) observe mutations in store order.
pub struct RecordStore {
    records: RwLock<HashMap<String, WorkflowExecution>>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a freshly created record.
    pub async fn insert(
        &self,
        execution: WorkflowExecution,
        on_commit: impl FnOnce(&WorkflowExecution),
    ) {
        let mut records = self.records.write().await;
        on_commit(&execution);
        records.insert(execution.id.clone(), execution);
    }

    /// Mutate a live record in place. Returns false if the id is unknown,
    /// in which case neither closure runs.
    pub async fn mutate(
        &self,
        id: &str,
        apply: impl FnOnce(&mut WorkflowExecution),
        on_commit: impl FnOnce(&WorkflowExecution),
    ) -> bool {
        let mut records = self.records.write().await;
        let Some(execution) = records.get_mut(id) else {
            return false;
        };
        apply(execution);
        on_commit(execution);
        true
    }

    /// Remove a record, applying `finalize` to it on the way out. Returns
    /// the finalized record, or None if the id was already gone.
    pub async fn remove(
        &self,
        id: &str,
        finalize: impl FnOnce(&mut WorkflowExecution),
        on_commit: impl FnOnce(&WorkflowExecution),
    ) -> Option<WorkflowExecution> {
        let mut records = self.records.write().await;
        let mut execution = records.remove(id)?;
        finalize(&mut execution);
        on_commit(&execution);
        Some(execution)
    }

    pub async fn get(&self, id: &str) -> Option<WorkflowExecution> {
        self.records.read().await.get(id).cloned()
    }

    /// Snapshot of every live record at call time. No ordering guarantee.
    pub async fn snapshot(&self) -> Vec<WorkflowExecution> {
        self.records.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}
