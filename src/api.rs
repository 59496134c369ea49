//! HTTP surface for the policy pipeline.
//!
//! This module exposes a compact Axum router with a handful of endpoints:
//!
//! - `POST /pipeline` – Register and dispatch a processing chain over document
//!   paths, with an optional map of policy numbers to roofing invoice paths.
//!   Returns `202 Accepted` with the task id to poll.
//! - `GET /pipeline/status/:task_id` – Task snapshot with status, progress,
//!   and the final result or error.
//! - `POST /query` – Answer a free-text question scoped to one policy.
//! - `GET /policies` – Compact summaries of all stored policies.
//! - `DELETE /policies/:policy_number` – Remove a policy and its chunks.
//! - `POST /policies/:policy_number/maintenance` – Chunk cleanup operations.
//! - `GET /metrics` – Observe pipeline counters.

use crate::retrieval::QueryError;
use crate::service::PolicyApi;
use crate::store::{PolicySummary, StoreError};
use crate::tasks::TaskSnapshot;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Build the HTTP router exposing the pipeline API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: PolicyApi + 'static,
{
    Router::new()
        .route("/pipeline", post(start_pipeline::<S>))
        .route("/pipeline/status/:task_id", get(pipeline_status::<S>))
        .route("/query", post(query_policy::<S>))
        .route("/policies", get(list_policies::<S>))
        .route("/policies/:policy_number", delete(delete_policy::<S>))
        .route(
            "/policies/:policy_number/maintenance",
            post(policy_maintenance::<S>),
        )
        .route("/metrics", get(get_metrics::<S>))
        .with_state(service)
}

/// Request body for `POST /pipeline`.
#[derive(Deserialize)]
struct StartPipelineRequest {
    /// Document or directory paths to process.
    documents: Vec<PathBuf>,
    /// Roofing invoice paths keyed by policy number.
    #[serde(default)]
    invoices: HashMap<String, PathBuf>,
}

/// Response body for `POST /pipeline`.
#[derive(Serialize)]
struct StartPipelineResponse {
    task_id: String,
    status: &'static str,
}

/// Register a processing chain and return its task id.
async fn start_pipeline<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<StartPipelineRequest>,
) -> impl IntoResponse
where
    S: PolicyApi,
{
    let started = service.start_chain(request.documents, request.invoices);
    tracing::info!(task_id = %started.task_id, dispatched = started.dispatched, "Chain accepted");
    (
        StatusCode::ACCEPTED,
        Json(StartPipelineResponse {
            task_id: started.task_id,
            status: "started",
        }),
    )
}

/// Poll the state of a pipeline task.
async fn pipeline_status<S>(
    State(service): State<Arc<S>>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskSnapshot>, AppError>
where
    S: PolicyApi,
{
    service
        .task_status(&task_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("task not found: {task_id}")))
}

/// Request body for `POST /query`.
#[derive(Deserialize)]
struct QueryRequest {
    /// Free-text question.
    query: String,
    /// Policy number scoping the question.
    policy_id: String,
}

/// Answer a question against one policy's stored chunks.
async fn query_policy<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<QueryRequest>,
) -> Result<Response, AppError>
where
    S: PolicyApi,
{
    let answer = service.query(&request.query, &request.policy_id).await?;
    Ok(Json(answer).into_response())
}

/// Response body for `GET /policies`.
#[derive(Serialize)]
struct PoliciesResponse {
    policies: Vec<PolicySummary>,
}

/// List stored policies.
async fn list_policies<S>(State(service): State<Arc<S>>) -> Json<PoliciesResponse>
where
    S: PolicyApi,
{
    Json(PoliciesResponse {
        policies: service.list_policies().await,
    })
}

/// Delete a policy and its chunks.
async fn delete_policy<S>(
    State(service): State<Arc<S>>,
    Path(policy_number): Path<String>,
) -> Result<StatusCode, AppError>
where
    S: PolicyApi,
{
    service.delete_policy(&policy_number).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Request body for `POST /policies/:policy_number/maintenance`.
#[derive(Deserialize)]
struct MaintenanceRequest {
    /// `clear_chunks` drops all chunks; `dedupe_chunks` drops duplicates.
    action: MaintenanceAction,
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum MaintenanceAction {
    ClearChunks,
    DedupeChunks,
}

/// Response body for maintenance operations.
#[derive(Serialize)]
struct MaintenanceResponse {
    removed: usize,
}

/// Run a chunk cleanup operation for one policy.
async fn policy_maintenance<S>(
    State(service): State<Arc<S>>,
    Path(policy_number): Path<String>,
    Json(request): Json<MaintenanceRequest>,
) -> Result<Json<MaintenanceResponse>, AppError>
where
    S: PolicyApi,
{
    let removed = match request.action {
        MaintenanceAction::ClearChunks => service.clear_policy_chunks(&policy_number).await?,
        MaintenanceAction::DedupeChunks => service.remove_duplicate_chunks(&policy_number).await?,
    };
    Ok(Json(MaintenanceResponse { removed }))
}

/// Return the current pipeline counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<crate::metrics::MetricsSnapshot>
where
    S: PolicyApi,
{
    Json(service.metrics_snapshot())
}

enum AppError {
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message).into_response(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::PolicyNotFound(_) => Self::NotFound(error.to_string()),
        }
    }
}

impl From<QueryError> for AppError {
    fn from(error: QueryError) -> Self {
        match error {
            QueryError::Store(inner) => inner.into(),
        }
    }
}
