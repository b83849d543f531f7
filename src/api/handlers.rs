use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::engine::types::WorkflowExecution;

use super::AppState;
use super::errors::AppError;

// --- Request/Response types ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartExecutionRequest {
    #[serde(default)]
    pub workflow_id: String,
    #[serde(default)]
    pub workflow_name: String,
    /// Opaque payload carried on the execution, never interpreted.
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

const DEFAULT_HISTORY_LIMIT: u32 = 50;

// --- Handlers ---

/// POST /executions/start
pub async fn start_execution(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<StartExecutionRequest>,
) -> Result<Json<WorkflowExecution>, AppError> {
    // Identity is injected by the auth layer in front of this service.
    let user_id = headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let execution = state
        .manager
        .start(&req.workflow_id, &req.workflow_name, user_id, req.data)
        .await?;

    Ok(Json(execution))
}

/// POST /executions/:id/cancel
pub async fn cancel_execution(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<serde_json::Value> {
    // Idempotent: acknowledging a cancel for an already-finished execution
    // is fine, the terminal state on record wins.
    state.manager.cancel(&id).await;

    Json(serde_json::json!({
        "acknowledged": true,
        "id": id,
    }))
}

/// GET /executions/:id
pub async fn get_execution(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<WorkflowExecution>, AppError> {
    state
        .manager
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Execution '{}' not found", id)))
}

/// GET /executions/active
pub async fn list_active(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let executions = state.manager.list_active().await;
    let total = executions.len();

    Json(serde_json::json!({
        "executions": executions,
        "total": total,
    }))
}

/// GET /executions/history?limit=N
pub async fn history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<Vec<WorkflowExecution>>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let executions = state.manager.history(limit).await?;
    Ok(Json(executions))
}

/// GET /executions/stats/overview
pub async fn stats_overview(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let stats = state.manager.stats().await?;
    Ok(Json(serde_json::to_value(&stats).map_err(anyhow::Error::from)?))
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
