use std::str::FromStr;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};

use crate::engine::types::{ExecutionStats, WorkflowExecution};
use crate::storage::ExecutionStore;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS workflow_executions (
    id            TEXT PRIMARY KEY,
    workflow_id   TEXT NOT NULL,
    workflow_name TEXT NOT NULL,
    status        TEXT NOT NULL,
    started_at    TEXT NOT NULL,
    finished_at   TEXT,
    progress      INTEGER NOT NULL,
    current_step  TEXT NOT NULL,
    error         TEXT,
    user_id       TEXT,
    data          TEXT,
    created_at    TEXT NOT NULL
)
"#;

/// SQLite-backed history store.
pub struct SqliteExecutionStore {
    pool: SqlitePool,
}

impl SqliteExecutionStore {
    /// Open (and create if missing) the database at `url`, e.g.
    /// `sqlite://data/executions.db`, and ensure the schema exists.
    pub async fn connect(url: &str) -> Result<Self> {
        if let Some(path) = url.strip_prefix("sqlite://")
            && path != ":memory:"
            && let Some(parent) = std::path::Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create database directory: {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid database URL: {}", url))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database: {}", url))?;

        sqlx::query(SCHEMA).execute(&pool).await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl ExecutionStore for SqliteExecutionStore {
    async fn save(&self, execution: &WorkflowExecution) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO workflow_executions
                (id, workflow_id, workflow_name, status, started_at, finished_at,
                 progress, current_step, error, user_id, data, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                finished_at = excluded.finished_at,
                progress = excluded.progress,
                current_step = excluded.current_step,
                error = excluded.error,
                data = excluded.data
            "#,
        )
        .bind(&execution.id)
        .bind(&execution.workflow_id)
        .bind(&execution.workflow_name)
        .bind(execution.status.to_string())
        .bind(format_timestamp(&execution.started_at))
        .bind(execution.finished_at.as_ref().map(format_timestamp))
        .bind(execution.progress as i64)
        .bind(&execution.current_step)
        .bind(&execution.error)
        .bind(&execution.user_id)
        .bind(execution.data.as_ref().map(|data| data.to_string()))
        .bind(format_timestamp(&Utc::now()))
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to save execution '{}'", execution.id))?;

        Ok(())
    }

    async fn fetch(&self, id: &str) -> Result<Option<WorkflowExecution>> {
        let row = sqlx::query("SELECT * FROM workflow_executions WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to fetch execution '{}'", id))?;

        row.as_ref().map(row_to_execution).transpose()
    }

    async fn history(&self, limit: u32) -> Result<Vec<WorkflowExecution>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM workflow_executions
            ORDER BY COALESCE(finished_at, started_at) DESC
            LIMIT ?1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list execution history")?;

        rows.iter().map(row_to_execution).collect()
    }

    async fn stats(&self) -> Result<ExecutionStats> {
        let rows = sqlx::query("SELECT * FROM workflow_executions")
            .fetch_all(&self.pool)
            .await
            .context("Failed to read executions for stats")?;

        let executions: Vec<WorkflowExecution> = rows
            .iter()
            .map(row_to_execution)
            .collect::<Result<Vec<_>>>()?;

        Ok(ExecutionStats::from_executions(&executions))
    }
}

/// Fixed-width RFC 3339 (nanosecond precision) so lexicographic TEXT
/// ordering matches time order and values round-trip exactly.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("Invalid timestamp in database: '{}'", s))?
        .with_timezone(&Utc))
}

fn row_to_execution(row: &SqliteRow) -> Result<WorkflowExecution> {
    let status: String = row.try_get("status")?;
    let started_at: String = row.try_get("started_at")?;
    let finished_at: Option<String> = row.try_get("finished_at")?;
    let progress: i64 = row.try_get("progress")?;
    let data: Option<String> = row.try_get("data")?;

    Ok(WorkflowExecution {
        id: row.try_get("id")?,
        workflow_id: row.try_get("workflow_id")?,
        workflow_name: row.try_get("workflow_name")?,
        status: status.parse()?,
        started_at: parse_timestamp(&started_at)?,
        finished_at: finished_at.as_deref().map(parse_timestamp).transpose()?,
        progress: progress.clamp(0, 100) as u8,
        current_step: row.try_get("current_step")?,
        error: row.try_get("error")?,
        data: data
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .context("Invalid JSON payload in database")?,
        user_id: row.try_get("user_id")?,
    })
}
