use anyhow::Result;
use tf_daemon::auto_flow::AutoFlowReport;
use tf_daemon::daemon::Daemon;
use tf_daemon::patrol::ScheduleReport;
use tf_daemon::sweep::SweepOptions;

use super::table;

fn options(daemon: &Daemon, timeout_hours: Option<u64>, dry_run: bool) -> SweepOptions {
    let defaults = &daemon.config().automation;
    SweepOptions::from_config(defaults)
        .with_timeout_hours(timeout_hours.unwrap_or(defaults.timeout_hours))
        .with_dry_run(dry_run)
}

fn title(job: &str, dry_run: bool) -> String {
    if dry_run {
        format!("{job} (dry run)")
    } else {
        job.to_string()
    }
}

pub fn format_auto_flow(report: &AutoFlowReport) -> String {
    table(
        &title("auto-flow", report.dry_run),
        &[
            ("timed out", report.timed_out.to_string()),
            ("auto-completed", report.auto_completed.to_string()),
            ("auto-started", report.auto_started.to_string()),
            ("skipped", report.skipped.to_string()),
            ("errors", report.errors.to_string()),
        ],
    )
}

pub fn format_schedule(report: &ScheduleReport) -> String {
    table(
        &title("schedule", report.dry_run),
        &[
            ("timed out", report.timed_out.to_string()),
            ("unhealthy", report.unhealthy.to_string()),
            ("stale reminders", report.stale_reminders.to_string()),
            ("due-soon reminders", report.due_soon_reminders.to_string()),
            ("errors", report.errors.to_string()),
        ],
    )
}

/// Run auto-flow once and render its counts.
pub async fn auto_flow(daemon: &Daemon, timeout_hours: Option<u64>, dry_run: bool) -> Result<String> {
    let report = daemon
        .auto_flow()
        .run(options(daemon, timeout_hours, dry_run))
        .await?;
    Ok(format_auto_flow(&report))
}

/// Run the schedule job once and render its counts.
pub async fn schedule(daemon: &Daemon, timeout_hours: Option<u64>, dry_run: bool) -> Result<String> {
    let report = daemon
        .patrol()
        .run(options(daemon, timeout_hours, dry_run))
        .await?;
    Ok(format_schedule(&report))
}
