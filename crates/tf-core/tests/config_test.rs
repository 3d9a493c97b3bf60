use std::io::Write;

use tf_core::config::{Config, ConfigError};

#[test]
fn default_config() {
    let cfg = Config::default();
    assert_eq!(cfg.general.project_name, "taskflow");
    assert_eq!(cfg.general.log_level, "info");
    assert!(!cfg.general.json_logs());
    assert!(cfg.workflow.auto_complete_parent);
    assert!(!cfg.workflow.auto_start_children);
    assert_eq!(cfg.workflow.batch_concurrency, 8);
    assert_eq!(cfg.health.in_progress_timeout_hours, 72);
    assert_eq!(cfg.health.main_without_subtasks_grace_hours, 24);
    assert_eq!(cfg.automation.timeout_hours, 72);
    assert_eq!(cfg.automation.stale_pending_days, 7);
    assert_eq!(cfg.automation.due_soon_hours, 24);
    assert_eq!(cfg.daemon.port, 9720);
    cfg.validate().expect("defaults validate");
}

#[test]
fn config_roundtrip() {
    let cfg = Config::default();
    let toml_str = cfg.to_toml().expect("serialize to toml");
    assert!(toml_str.contains("taskflow"));

    let parsed: Config = toml::from_str(&toml_str).expect("parse toml back");
    assert_eq!(parsed.automation.timeout_hours, cfg.automation.timeout_hours);
    assert_eq!(parsed.daemon.port, cfg.daemon.port);
}

#[test]
fn config_partial_toml() {
    let partial = r#"
[workflow]
auto_start_children = true

[automation]
timeout_hours = 12
"#;
    let cfg: Config = toml::from_str(partial).expect("parse partial");
    assert!(cfg.workflow.auto_start_children);
    assert!(cfg.workflow.auto_complete_parent);
    assert_eq!(cfg.automation.timeout_hours, 12);
    assert_eq!(cfg.automation.stale_pending_days, 7);
}

#[test]
fn zero_thresholds_are_rejected() {
    let cfg: Config = toml::from_str("[automation]\ntimeout_hours = 0\n").unwrap();
    assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));

    let cfg: Config = toml::from_str("[workflow]\nbatch_concurrency = 0\n").unwrap();
    assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
}

#[test]
fn unknown_log_format_is_rejected() {
    let cfg: Config = toml::from_str("[general]\nlog_format = \"xml\"\n").unwrap();
    assert!(cfg.validate().is_err());
}

#[test]
fn load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[store]\npath = \"/tmp/tf-test.db\"\n[daemon]\nport = 1234").unwrap();

    let cfg = Config::load_from(file.path()).expect("load");
    assert_eq!(cfg.daemon.port, 1234);
    assert_eq!(cfg.store_path(), std::path::PathBuf::from("/tmp/tf-test.db"));
}

#[test]
fn load_from_missing_file_is_io_error() {
    let err = Config::load_from("/definitely/not/here.toml").unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}
