use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a workflow execution.
///
/// The only legal transitions are `Running` into one of the three terminal
/// states; terminal records accept no further mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Running => write!(f, "running"),
            ExecutionStatus::Succeeded => write!(f, "succeeded"),
            ExecutionStatus::Failed => write!(f, "failed"),
            ExecutionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(ExecutionStatus::Running),
            "succeeded" => Ok(ExecutionStatus::Succeeded),
            "failed" => Ok(ExecutionStatus::Failed),
            "cancelled" => Ok(ExecutionStatus::Cancelled),
            other => anyhow::bail!(
                "Invalid execution status '{}'. Use: running, succeeded, failed, cancelled",
                other
            ),
        }
    }
}

/// One tracked run of a named workflow.
///
/// Serializes to the camelCase JSON shape the dashboard consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecution {
    pub id: String,
    pub workflow_id: String,
    pub workflow_name: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Percentage in [0, 100], non-decreasing while running.
    pub progress: u8,
    pub current_step: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Caller-supplied payload, stored verbatim and never interpreted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl WorkflowExecution {
    /// Merge a partial update into a live record.
    ///
    /// Progress is clamped to 100 and never moves backwards.
    pub fn apply(&mut self, update: &ExecutionUpdate) {
        if let Some(progress) = update.progress {
            self.progress = self.progress.max(progress.min(100));
        }
        if let Some(ref step) = update.current_step {
            self.current_step = step.clone();
        }
        if let Some(ref error) = update.error {
            self.error = Some(error.clone());
        }
        if let Some(ref data) = update.data {
            self.data = Some(data.clone());
        }
    }
}

/// Partial update applied to a running execution. Absent fields are left
/// untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionUpdate {
    #[serde(default)]
    pub progress: Option<u8>,
    #[serde(default)]
    pub current_step: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// Aggregate counters over persisted execution history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStats {
    pub total: u64,
    pub running: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub cancelled: u64,
    /// Mean wall-clock duration over rows with both timestamps set.
    pub average_duration_seconds: f64,
}

impl ExecutionStats {
    pub fn from_executions(executions: &[WorkflowExecution]) -> Self {
        let mut stats = ExecutionStats {
            total: executions.len() as u64,
            running: 0,
            succeeded: 0,
            failed: 0,
            cancelled: 0,
            average_duration_seconds: 0.0,
        };

        let mut durations_ms: Vec<i64> = Vec::new();

        for execution in executions {
            match execution.status {
                ExecutionStatus::Running => stats.running += 1,
                ExecutionStatus::Succeeded => stats.succeeded += 1,
                ExecutionStatus::Failed => stats.failed += 1,
                ExecutionStatus::Cancelled => stats.cancelled += 1,
            }

            if let Some(finished) = execution.finished_at {
                durations_ms.push((finished - execution.started_at).num_milliseconds());
            }
        }

        if !durations_ms.is_empty() {
            let total_ms: i64 = durations_ms.iter().sum();
            stats.average_duration_seconds = total_ms as f64 / durations_ms.len() as f64 / 1000.0;
        }

        stats
    }
}
