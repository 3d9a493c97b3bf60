//! Rule-gated workflow engine for taskflow tasks.
//!
//! A transition request is checked against an ordered [`RuleSet`] of
//! [`WorkflowRule`]s before the engine commits the status change through the
//! [`tf_core::store::TaskStore`].
//!
//! Key modules:
//! - [`rule`]: the rule trait and the request/effects types rules see
//! - [`rules`]: the rule set and the three default rules
//! - [`engine`]: [`WorkflowEngine`], the single place status is mutated
//! - [`health`]: workflow health heuristics

pub mod engine;
pub mod error;
pub mod health;
pub mod rule;
pub mod rules;

pub use engine::{
    BatchItemResult, ParentCompletion, TransitionOutcome, TransitionPreview, ValidationReport,
    WorkflowEngine,
};
pub use error::WorkflowError;
pub use health::HealthReport;
pub use rule::{HookEffects, RuleError, TaskRelations, TransitionRequest, WorkflowRule};
pub use rules::RuleSet;
