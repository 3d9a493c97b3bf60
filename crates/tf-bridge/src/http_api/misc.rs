use std::sync::Arc;

use axum::{extract::State, Json};

use super::state::ApiState;
use super::types::StatusResponse;

/// GET /api/status -- version, uptime and the active rule chain.
pub(crate) async fn get_status(State(state): State<Arc<ApiState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        rules: state
            .engine
            .rules()
            .names()
            .into_iter()
            .map(str::to_string)
            .collect(),
    })
}
