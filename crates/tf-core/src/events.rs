use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{TaskStatus, TransitionContext};

// ---------------------------------------------------------------------------
// WorkflowEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TransitionAttempted,
    TransitionApplied,
    TransitionRejected,
    SweepAction,
    HealthIssue,
    StaleReminder,
    DueSoonReminder,
}

/// Emitted on every attempted and successful transition and on every
/// automation sweep action. Delivery is left to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub id: Uuid,
    pub kind: EventKind,
    pub task_id: Uuid,
    pub from_status: Option<TaskStatus>,
    pub to_status: Option<TaskStatus>,
    pub context: TransitionContext,
    pub timestamp: DateTime<Utc>,
}

impl WorkflowEvent {
    pub fn new(kind: EventKind, task_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            task_id,
            from_status: None,
            to_status: None,
            context: TransitionContext::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn transition(
        kind: EventKind,
        task_id: Uuid,
        from: TaskStatus,
        to: TaskStatus,
        context: &TransitionContext,
    ) -> Self {
        Self {
            from_status: Some(from),
            to_status: Some(to),
            context: context.clone(),
            ..Self::new(kind, task_id)
        }
    }

    pub fn with_context(mut self, context: TransitionContext) -> Self {
        self.context = context;
        self
    }
}

// ---------------------------------------------------------------------------
// EventSink
// ---------------------------------------------------------------------------

/// Fire-and-forget consumer of workflow events (notifications, audit).
pub trait EventSink: Send + Sync {
    fn emit(&self, event: WorkflowEvent);
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// A broadcast-style event bus built on top of flume channels.
///
/// Each call to [`subscribe`](EventBus::subscribe) creates a new receiver that
/// sees every event published after the subscription was created. Cloning is
/// cheap; clones share subscribers.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<Vec<flume::Sender<WorkflowEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn senders(&self) -> MutexGuard<'_, Vec<flume::Sender<WorkflowEvent>>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe(&self) -> flume::Receiver<WorkflowEvent> {
        let (tx, rx) = flume::unbounded();
        self.senders().push(tx);
        rx
    }

    /// Publish to all current subscribers. Disconnected subscribers are
    /// pruned.
    pub fn publish(&self, event: WorkflowEvent) {
        self.senders().retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.senders().len()
    }
}

impl EventSink for EventBus {
    fn emit(&self, event: WorkflowEvent) {
        self.publish(event);
    }
}
