// ---------------------------------------------------------------------------
// HTTP API
// ---------------------------------------------------------------------------
//
// Handlers are grouped by resource; this file owns the router and the
// middleware stack shared with routes added by the daemon.

mod misc;
pub mod state;
mod tasks;
#[cfg(test)]
mod tests;
pub mod types;

pub use state::ApiState;
pub use types::*;

pub use self::router::{api_router, api_routes, with_middleware};

mod router {
    use super::*;
    use axum::{
        middleware as axum_middleware,
        routing::{get, post},
        Router,
    };
    use std::sync::Arc;
    use tf_telemetry::tracing_setup::request_id_middleware;
    use tower_http::{cors::CorsLayer, trace::TraceLayer};

    /// Task routes without middleware, for callers that merge in more
    /// routes before layering.
    pub fn api_routes(state: Arc<ApiState>) -> Router {
        Router::new()
            .route("/api/status", get(misc::get_status))
            .route("/api/tasks/batch-transition", post(tasks::batch_transition))
            .route("/api/tasks/{id}", get(tasks::get_task))
            .route(
                "/api/tasks/{id}/available-transitions",
                get(tasks::available_transitions),
            )
            .route(
                "/api/tasks/{id}/validate-transition",
                post(tasks::validate_transition),
            )
            .route("/api/tasks/{id}/transition", post(tasks::transition))
            .route("/api/tasks/{id}/health", get(tasks::health))
            .route("/api/tasks/{id}/progress", post(tasks::update_progress))
            .with_state(state)
    }

    /// Request ids, request tracing and CORS for every route of `router`.
    pub fn with_middleware(router: Router) -> Router {
        router
            .layer(TraceLayer::new_for_http())
            .layer(axum_middleware::from_fn(request_id_middleware))
            .layer(CorsLayer::permissive())
    }

    /// The complete task API.
    pub fn api_router(state: Arc<ApiState>) -> Router {
        with_middleware(api_routes(state))
    }
}
