use tf_core::store::StoreError;
use tf_core::types::TaskStatus;
use uuid::Uuid;

/// Failures that abort a single engine operation.
///
/// A rule rejecting a transition is not an error; it is reported through
/// [`crate::TransitionOutcome`] and [`crate::ValidationReport`].
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A rule broke its contract instead of returning a rejection.
    #[error("rule '{rule}' failed: {message}")]
    Rule { rule: String, message: String },

    #[error("task {0} is {1} and can no longer be updated")]
    Terminal(Uuid, TaskStatus),
}

impl WorkflowError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, WorkflowError::Store(e) if e.is_not_found())
    }
}
