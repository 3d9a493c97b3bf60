use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use tf_core::store::TaskStore;
use tf_core::types::Task;
use tf_engine::{HealthReport, ValidationReport};
use tracing::info;
use uuid::Uuid;

use super::state::ApiState;
use super::types::{
    parse_status, AvailableTransitionsResponse, BatchTransitionRequest, BatchTransitionResponse,
    ProgressRequest, TransitionRequestBody, ValidateTransitionRequest,
};
use crate::api_error::ApiError;

async fn load(state: &ApiState, id: Uuid) -> Result<Task, ApiError> {
    state
        .store()
        .load(id)
        .await
        .map_err(|e| ApiError::from(tf_engine::WorkflowError::from(e)))
}

/// GET /api/tasks/{id}
pub(crate) async fn get_task(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>, ApiError> {
    Ok(Json(load(&state, id).await?))
}

/// GET /api/tasks/{id}/available-transitions -- statuses the task could move
/// to right now, after every rule has been consulted.
pub(crate) async fn available_transitions(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<AvailableTransitionsResponse>, ApiError> {
    let task = load(&state, id).await?;
    let available = state.engine.available_transitions(&task).await?;
    Ok(Json(AvailableTransitionsResponse {
        task_id: task.id,
        current_status: task.status,
        available,
    }))
}

/// POST /api/tasks/{id}/validate-transition -- dry run reporting every
/// blocking reason. Never mutates.
pub(crate) async fn validate_transition(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<ValidateTransitionRequest>,
) -> Result<Json<ValidationReport>, ApiError> {
    let to = parse_status(&req.to_status)?;
    let task = load(&state, id).await?;
    Ok(Json(state.engine.validate_transition(&task, to).await?))
}

/// POST /api/tasks/{id}/transition -- 200 with the updated task, or 422 with
/// the rejection reasons.
pub(crate) async fn transition(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<TransitionRequestBody>,
) -> Result<Json<Task>, ApiError> {
    let to = parse_status(&req.to_status)?;
    let outcome = state.engine.transition(id, to, req.context).await?;
    if !outcome.applied {
        return Err(ApiError::Rejected(outcome.errors));
    }
    info!(task_id = %id, from = %outcome.from, to = %outcome.to, "transition via api");
    Ok(Json(outcome.task))
}

/// GET /api/tasks/{id}/health
pub(crate) async fn health(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<HealthReport>, ApiError> {
    let task = load(&state, id).await?;
    Ok(Json(state.engine.check_workflow_health(&task).await?))
}

/// POST /api/tasks/batch-transition -- per-item results in request order.
pub(crate) async fn batch_transition(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<BatchTransitionRequest>,
) -> Result<Json<BatchTransitionResponse>, ApiError> {
    let to = parse_status(&req.to_status)?;
    let results = state
        .engine
        .batch_transition(&req.task_ids, to, req.context)
        .await;
    Ok(Json(BatchTransitionResponse { results }))
}

/// POST /api/tasks/{id}/progress
pub(crate) async fn update_progress(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<ProgressRequest>,
) -> Result<Json<Task>, ApiError> {
    if req.progress > 100 {
        return Err(ApiError::BadRequest(format!(
            "progress must be between 0 and 100, got {}",
            req.progress
        )));
    }
    Ok(Json(state.engine.update_progress(id, req.progress).await?))
}
