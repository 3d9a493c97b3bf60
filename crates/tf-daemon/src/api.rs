//! Automation routes served next to the task API.

use std::sync::Arc;

use axum::{body::Bytes, extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tf_bridge::api_error::ApiError;
use tf_core::config::AutomationConfig;

use crate::auto_flow::{AutoFlowReport, AutoFlowRunner};
use crate::patrol::{PatrolRunner, ScheduleReport};
use crate::sweep::{AutomationError, SweepOptions};

impl From<AutomationError> for ApiError {
    fn from(err: AutomationError) -> Self {
        match err {
            AutomationError::AlreadyRunning(_) => ApiError::Conflict(err.to_string()),
            AutomationError::Workflow(e) => ApiError::from(e),
        }
    }
}

pub struct AutomationState {
    pub auto_flow: Arc<AutoFlowRunner>,
    pub patrol: Arc<PatrolRunner>,
    pub defaults: AutomationConfig,
}

/// Optional body of both automation routes; missing fields fall back to
/// the configured defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutomationRequest {
    #[serde(default)]
    pub timeout_hours: Option<u64>,
    #[serde(default)]
    pub dry_run: Option<bool>,
}

impl AutomationRequest {
    fn parse(body: &Bytes) -> Result<Self, ApiError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(e.to_string()))
    }

    fn options(&self, defaults: &AutomationConfig) -> Result<SweepOptions, ApiError> {
        let timeout_hours = self.timeout_hours.unwrap_or(defaults.timeout_hours);
        if timeout_hours == 0 {
            return Err(ApiError::BadRequest("timeout_hours must be positive".into()));
        }
        Ok(SweepOptions::from_config(defaults)
            .with_timeout_hours(timeout_hours)
            .with_dry_run(self.dry_run.unwrap_or(false)))
    }
}

/// POST /api/automation/auto-flow
async fn run_auto_flow(
    State(state): State<Arc<AutomationState>>,
    body: Bytes,
) -> Result<Json<AutoFlowReport>, ApiError> {
    let opts = AutomationRequest::parse(&body)?.options(&state.defaults)?;
    Ok(Json(state.auto_flow.run(opts).await?))
}

/// POST /api/automation/schedule
async fn run_schedule(
    State(state): State<Arc<AutomationState>>,
    body: Bytes,
) -> Result<Json<ScheduleReport>, ApiError> {
    let opts = AutomationRequest::parse(&body)?.options(&state.defaults)?;
    Ok(Json(state.patrol.run(opts).await?))
}

pub fn automation_routes(state: Arc<AutomationState>) -> Router {
    Router::new()
        .route("/api/automation/auto-flow", post(run_auto_flow))
        .route("/api/automation/schedule", post(run_schedule))
        .with_state(state)
}
