use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tf_core::config::AutomationConfig;
use tf_core::events::{EventKind, WorkflowEvent};
use tf_core::types::{Task, TaskStatus, TransitionContext};
use tf_engine::WorkflowEngine;
use tf_telemetry::tracing_setup::create_operation_span;
use tracing::{debug, info, warn, Instrument};

use crate::sweep::{
    hours, older_than, timeout_sweep, AutomationError, SweepContext, SweepGuard, SweepOptions,
};

/// Result of one scheduled patrol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleReport {
    /// IN_PROGRESS tasks blocked for inactivity.
    pub timed_out: usize,
    /// Non-terminal tasks failing at least one health heuristic.
    pub unhealthy: usize,
    /// PENDING tasks idle for longer than `stale_pending_days`.
    pub stale_reminders: usize,
    /// Open tasks due within `due_soon_hours`.
    pub due_soon_reminders: usize,
    pub errors: usize,
    pub dry_run: bool,
    pub timestamp: DateTime<Utc>,
}

/// Runs the schedule job: timeout detection, workflow health checks and
/// reminders. Only the timeout sweep mutates tasks.
pub struct PatrolRunner {
    engine: Arc<WorkflowEngine>,
    stale_pending: Duration,
    due_soon: Duration,
    guard: SweepGuard,
}

impl PatrolRunner {
    pub fn new(engine: Arc<WorkflowEngine>, config: &AutomationConfig) -> Self {
        Self {
            engine,
            stale_pending: hours(config.stale_pending_days.saturating_mul(24)),
            due_soon: hours(config.due_soon_hours),
            guard: SweepGuard::new("schedule"),
        }
    }

    /// Execute one patrol. Fails with [`AutomationError::AlreadyRunning`]
    /// when a previous patrol has not finished yet.
    pub async fn run(&self, opts: SweepOptions) -> Result<ScheduleReport, AutomationError> {
        let _running = self.guard.try_acquire()?;
        let (span, trace_id) = create_operation_span("schedule");
        debug!(%trace_id, dry_run = opts.dry_run, "patrol starting");
        self.run_patrol(opts).instrument(span).await
    }

    async fn run_patrol(&self, opts: SweepOptions) -> Result<ScheduleReport, AutomationError> {
        let mut cx = SweepContext::new(&self.engine, opts);
        let mut report = ScheduleReport {
            timed_out: 0,
            unhealthy: 0,
            stale_reminders: 0,
            due_soon_reminders: 0,
            errors: 0,
            dry_run: opts.dry_run,
            timestamp: cx.now,
        };

        let timeouts = timeout_sweep(&mut cx).await?;
        report.timed_out = timeouts.acted;
        report.errors += timeouts.errors;

        self.health_sweep(&cx, &mut report).await?;
        self.reminder_sweep(&cx, &mut report).await?;

        info!(
            timed_out = report.timed_out,
            unhealthy = report.unhealthy,
            stale_reminders = report.stale_reminders,
            due_soon_reminders = report.due_soon_reminders,
            errors = report.errors,
            dry_run = report.dry_run,
            "patrol completed"
        );
        Ok(report)
    }

    async fn health_sweep(
        &self,
        cx: &SweepContext<'_>,
        report: &mut ScheduleReport,
    ) -> Result<(), AutomationError> {
        let open: Vec<Task> = cx
            .list_all()
            .await?
            .into_iter()
            .filter(|t| !t.status.is_terminal())
            .collect();

        for task in &open {
            let health = match self.engine.check_workflow_health(task).await {
                Ok(health) => health,
                Err(e) => {
                    warn!(sweep = "health", task_id = %task.id, error = %e, "health check failed");
                    report.errors += 1;
                    continue;
                }
            };
            if health.is_healthy {
                continue;
            }

            report.unhealthy += 1;
            warn!(
                task_id = %task.id,
                status = %task.status,
                issues = %health.issues.join("; "),
                "unhealthy task"
            );
            let context = TransitionContext::new()
                .with("issues", json!(health.issues))
                .with("recommendations", json!(health.recommendations));
            cx.emit(WorkflowEvent::new(EventKind::HealthIssue, task.id).with_context(context));
        }
        Ok(())
    }

    async fn reminder_sweep(
        &self,
        cx: &SweepContext<'_>,
        report: &mut ScheduleReport,
    ) -> Result<(), AutomationError> {
        let pending = cx.list(TaskStatus::Pending).await?;
        let stale_cutoff = older_than(cx.now, self.stale_pending);

        for task in pending.iter().filter(|t| t.updated_at < stale_cutoff) {
            report.stale_reminders += 1;
            let idle_days = cx.now.signed_duration_since(task.updated_at).num_days();
            debug!(task_id = %task.id, idle_days, "stale pending task");
            let context = TransitionContext::new().with("idle_days", idle_days);
            cx.emit(WorkflowEvent::new(EventKind::StaleReminder, task.id).with_context(context));
        }

        let horizon = cx
            .now
            .checked_add_signed(self.due_soon)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let mut open = pending;
        open.extend(cx.list(TaskStatus::InProgress).await?);

        for task in &open {
            let Some(due) = task.due_date else {
                continue;
            };
            if due <= cx.now || due > horizon {
                continue;
            }
            report.due_soon_reminders += 1;
            debug!(task_id = %task.id, due = %due, "task due soon");
            let context = TransitionContext::new().with("due_date", due.to_rfc3339());
            cx.emit(WorkflowEvent::new(EventKind::DueSoonReminder, task.id).with_context(context));
        }
        Ok(())
    }
}
