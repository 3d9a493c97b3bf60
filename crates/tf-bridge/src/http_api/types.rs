use serde::{Deserialize, Serialize};
use tf_core::types::{TaskStatus, TransitionContext};
use tf_engine::BatchItemResult;
use uuid::Uuid;

use crate::api_error::ApiError;

/// Parse a status supplied by a client, mapping failures to 400.
pub(crate) fn parse_status(raw: &str) -> Result<TaskStatus, ApiError> {
    raw.parse()
        .map_err(|e: tf_core::types::UnknownStatus| ApiError::BadRequest(e.to_string()))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableTransitionsResponse {
    pub task_id: Uuid,
    pub current_status: TaskStatus,
    pub available: Vec<TaskStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateTransitionRequest {
    pub to_status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRequestBody {
    pub to_status: String,
    #[serde(default)]
    pub context: TransitionContext,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchTransitionRequest {
    pub task_ids: Vec<Uuid>,
    pub to_status: String,
    #[serde(default)]
    pub context: TransitionContext,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchTransitionResponse {
    pub results: Vec<BatchItemResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRequest {
    pub progress: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub uptime_seconds: u64,
    pub rules: Vec<String>,
}
