//! Thin HTTP surface over the orchestrator.
//!
//! `/submit` accepts the same JSON shapes as a task file; the remaining
//! routes only read orchestrator state.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::models::NewTask;
use crate::services::task_parser::parse_task_data;
use crate::services::Orchestrator;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(service_info))
        .route("/submit", post(submit))
        .route("/generate_tasks", post(generate_tasks))
        .route("/continue", post(continue_platform))
        .route("/status", get(run_state))
        .route("/run_state", get(run_state))
        .route("/set_active", get(set_active))
        .route("/db_status", get(db_status))
        .route("/databases", get(databases))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn service_info() -> Json<Value> {
    Json(json!({
        "service": "social-collection-backend",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Parse a task payload and route the tasks to their platform managers.
/// Returns the names of the tasks actually added.
async fn submit(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<Json<Vec<String>>, ApiError> {
    let tasks = parse_payload(&payload)?;
    let (added, _all_added) = state.orchestrator.add_tasks(tasks).await?;
    Ok(Json(added))
}

/// Dry-run expansion of a task payload, nothing is persisted.
async fn generate_tasks(
    Json(payload): Json<Value>,
) -> Result<Json<Vec<NewTask>>, ApiError> {
    Ok(Json(parse_payload(&payload)?))
}

fn parse_payload(payload: &Value) -> Result<Vec<NewTask>, ApiError> {
    parse_task_data(payload).map_err(|err| ApiError::BadRequest(err.to_string()))
}

#[derive(Deserialize)]
struct ContinueParams {
    platform: String,
}

/// Kick off one background pass over a single platform's queue.
async fn continue_platform(
    State(state): State<AppState>,
    Query(params): Query<ContinueParams>,
) -> Result<Json<Value>, ApiError> {
    if state.orchestrator.manager(&params.platform).is_none() {
        return Err(ApiError::NotFound(format!("platform '{}'", params.platform)));
    }
    let orchestrator = Arc::clone(&state.orchestrator);
    let platform = params.platform.clone();
    tokio::spawn(async move {
        if let Err(err) = orchestrator
            .progress_tasks(Some(std::slice::from_ref(&platform)))
            .await
        {
            tracing::error!(platform = %platform, error = %err, "background pass failed");
        }
    });
    Ok(Json(json!({ "started": params.platform })))
}

async fn run_state(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.orchestrator.status()))
}

#[derive(Deserialize)]
struct SetActiveParams {
    platform: String,
    active: bool,
}

async fn set_active(
    State(state): State<AppState>,
    Query(params): Query<SetActiveParams>,
) -> Result<Json<Value>, ApiError> {
    let manager = state
        .orchestrator
        .manager(&params.platform)
        .ok_or_else(|| ApiError::NotFound(format!("platform '{}'", params.platform)))?;
    manager.set_active(params.active);
    Ok(Json(json!(state.orchestrator.status())))
}

#[derive(Deserialize)]
struct StatusParams {
    #[serde(default = "default_true")]
    task_status: bool,
}

fn default_true() -> bool {
    true
}

/// Store summaries: post counts, file sizes, task-status counts.
async fn db_status(
    State(state): State<AppState>,
    Query(params): Query<StatusParams>,
) -> Result<Json<Value>, ApiError> {
    let rows = state
        .orchestrator
        .meta()
        .general_status(params.task_status)
        .await?;
    Ok(Json(json!(rows)))
}

/// Catalog entries of the meta store.
async fn databases(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let entries = state.orchestrator.meta().list_databases().await?;
    Ok(Json(json!(entries)))
}
