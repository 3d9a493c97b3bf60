use tf_core::types::*;
use uuid::Uuid;

#[test]
fn task_status_valid_transitions() {
    assert!(TaskStatus::Pending.can_transition_to(&TaskStatus::InProgress));
    assert!(TaskStatus::Pending.can_transition_to(&TaskStatus::Blocked));
    assert!(TaskStatus::Pending.can_transition_to(&TaskStatus::Cancelled));
    assert!(TaskStatus::InProgress.can_transition_to(&TaskStatus::Completed));
    assert!(TaskStatus::InProgress.can_transition_to(&TaskStatus::Blocked));
    assert!(TaskStatus::InProgress.can_transition_to(&TaskStatus::OnHold));
    assert!(TaskStatus::InProgress.can_transition_to(&TaskStatus::Cancelled));
    assert!(TaskStatus::Blocked.can_transition_to(&TaskStatus::InProgress));
    assert!(TaskStatus::Blocked.can_transition_to(&TaskStatus::Cancelled));
    assert!(TaskStatus::OnHold.can_transition_to(&TaskStatus::InProgress));
    assert!(TaskStatus::OnHold.can_transition_to(&TaskStatus::Cancelled));
}

#[test]
fn task_status_invalid_transitions() {
    assert!(!TaskStatus::Pending.can_transition_to(&TaskStatus::Completed));
    assert!(!TaskStatus::Pending.can_transition_to(&TaskStatus::OnHold));
    assert!(!TaskStatus::Blocked.can_transition_to(&TaskStatus::OnHold));
    assert!(!TaskStatus::OnHold.can_transition_to(&TaskStatus::Blocked));
    assert!(!TaskStatus::Blocked.can_transition_to(&TaskStatus::Completed));
}

#[test]
fn self_transitions_are_never_legal() {
    for status in TaskStatus::all() {
        assert!(!status.can_transition_to(status), "{status} -> {status}");
    }
}

#[test]
fn terminal_statuses_have_no_targets() {
    for status in TaskStatus::all() {
        assert_eq!(status.is_terminal(), status.allowed_targets().is_empty());
    }
    assert!(TaskStatus::Completed.is_terminal());
    assert!(TaskStatus::Cancelled.is_terminal());
}

#[test]
fn matrix_has_eleven_edges() {
    let edges: usize = TaskStatus::all()
        .iter()
        .map(|s| s.allowed_targets().len())
        .sum();
    assert_eq!(edges, 11);
}

#[test]
fn status_parses_common_spellings() {
    assert_eq!("in_progress".parse::<TaskStatus>().unwrap(), TaskStatus::InProgress);
    assert_eq!("IN_PROGRESS".parse::<TaskStatus>().unwrap(), TaskStatus::InProgress);
    assert_eq!("on-hold".parse::<TaskStatus>().unwrap(), TaskStatus::OnHold);
    assert!("archived".parse::<TaskStatus>().is_err());
}

#[test]
fn status_serializes_snake_case() {
    let json = serde_json::to_string(&TaskStatus::OnHold).unwrap();
    assert_eq!(json, "\"on_hold\"");
    assert!(serde_json::from_str::<TaskStatus>("\"paused\"").is_err());
}

#[test]
fn task_creation_defaults() {
    let task = Task::main("release 1.0");
    assert_eq!(task.title, "release 1.0");
    assert_eq!(task.task_type, TaskType::Main);
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.priority, TaskPriority::Medium);
    assert_eq!(task.progress, 0);
    assert!(task.parent_task_id.is_none());
    assert!(task.metadata.is_empty());
}

#[test]
fn sub_task_records_parent() {
    let parent = Uuid::new_v4();
    let sub = Task::sub("write docs", parent);
    assert!(sub.is_sub());
    assert_eq!(sub.parent_task_id, Some(parent));
}

#[test]
fn progress_builder_clamps() {
    let task = Task::new("x", TaskType::Bug).with_progress(250);
    assert_eq!(task.progress, 100);
}

#[test]
fn assignee_serializes_tagged() {
    let task = Task::new("x", TaskType::Feature).with_assignee(Assignee::Agent { id: "coder-1".into() });
    let json = serde_json::to_value(&task).unwrap();
    assert_eq!(json["assignee"]["kind"], "agent");
    assert_eq!(json["assignee"]["id"], "coder-1");
}

#[test]
fn transition_context_helpers() {
    let ctx = TransitionContext::new()
        .with("auto_blocked", true)
        .with("reason", "timeout");
    assert!(ctx.flag("auto_blocked"));
    assert!(!ctx.flag("auto_completed"));
    assert_eq!(ctx.reason(), Some("timeout"));
    assert_eq!(ctx.to_value()["reason"], "timeout");
}
