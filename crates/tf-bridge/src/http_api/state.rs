use std::sync::Arc;
use std::time::Instant;

use tf_core::store::TaskStore;
use tf_engine::WorkflowEngine;

/// Shared state for all HTTP handlers.
pub struct ApiState {
    pub engine: Arc<WorkflowEngine>,
    pub start_time: Instant,
}

impl ApiState {
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        Self {
            engine,
            start_time: Instant::now(),
        }
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        self.engine.store()
    }
}
