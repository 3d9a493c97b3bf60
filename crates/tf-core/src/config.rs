use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration loaded from `~/.taskflow/config.toml`.
///
/// Every section is optional; missing keys take their documented defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub automation: AutomationConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
}

impl Config {
    /// Load config from `~/.taskflow/config.toml`, falling back to defaults
    /// when the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(path)
        } else {
            let cfg = Config::default();
            cfg.validate()?;
            Ok(cfg)
        }
    }

    /// Load from a specific path.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let cfg: Config = toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        self.validate()?;
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Semantic validation for settings that are not expressible via types.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.general.validate()?;
        self.workflow.validate()?;
        self.health.validate()?;
        self.automation.validate()?;
        Ok(())
    }

    /// Resolve `store.path`, expanding a leading `~/`.
    pub fn store_path(&self) -> PathBuf {
        expand_home(&self.store.path)
    }

    pub fn default_path() -> PathBuf {
        home_dir().join(".taskflow").join("config.toml")
    }
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => home_dir().join(rest),
        None => PathBuf::from(path),
    }
}

fn require_positive(field: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Validation(format!("{field} must be greater than 0")));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
    #[error("validation: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_project_name")]
    pub project_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// `human` or `json`.
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            project_name: default_project_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl GeneralConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        match self.log_format.as_str() {
            "human" | "json" => Ok(()),
            other => Err(ConfigError::Validation(format!(
                "general.log_format must be 'human' or 'json', got '{other}'"
            ))),
        }
    }

    pub fn json_logs(&self) -> bool {
        self.log_format == "json"
    }
}

fn default_project_name() -> String {
    "taskflow".into()
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "human".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> String {
    "~/.taskflow/tasks.db".into()
}

/// Engine behaviour flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Let a completing sub-task trigger completion of its parent.
    #[serde(default = "default_true")]
    pub auto_complete_parent: bool,
    /// Let the auto-flow job start PENDING children of IN_PROGRESS main tasks.
    #[serde(default)]
    pub auto_start_children: bool,
    /// Upper bound on concurrent transitions inside one batch.
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            auto_complete_parent: true,
            auto_start_children: false,
            batch_concurrency: default_batch_concurrency(),
        }
    }
}

impl WorkflowConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        require_positive("workflow.batch_concurrency", self.batch_concurrency as u64)
    }
}

fn default_true() -> bool {
    true
}
fn default_batch_concurrency() -> usize {
    8
}

/// Thresholds used by the workflow health check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_timeout_hours")]
    pub in_progress_timeout_hours: u64,
    #[serde(default = "default_subtask_grace_hours")]
    pub main_without_subtasks_grace_hours: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            in_progress_timeout_hours: default_timeout_hours(),
            main_without_subtasks_grace_hours: default_subtask_grace_hours(),
        }
    }
}

impl HealthConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        require_positive("health.in_progress_timeout_hours", self.in_progress_timeout_hours)
    }
}

fn default_timeout_hours() -> u64 {
    72
}
fn default_subtask_grace_hours() -> u64 {
    24
}

/// Sweep horizons and daemon loop intervals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationConfig {
    #[serde(default = "default_timeout_hours")]
    pub timeout_hours: u64,
    #[serde(default = "default_stale_pending_days")]
    pub stale_pending_days: u64,
    #[serde(default = "default_due_soon_hours")]
    pub due_soon_hours: u64,
    #[serde(default = "default_auto_flow_interval_secs")]
    pub auto_flow_interval_secs: u64,
    #[serde(default = "default_schedule_interval_secs")]
    pub schedule_interval_secs: u64,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            timeout_hours: default_timeout_hours(),
            stale_pending_days: default_stale_pending_days(),
            due_soon_hours: default_due_soon_hours(),
            auto_flow_interval_secs: default_auto_flow_interval_secs(),
            schedule_interval_secs: default_schedule_interval_secs(),
        }
    }
}

impl AutomationConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        require_positive("automation.timeout_hours", self.timeout_hours)?;
        require_positive("automation.stale_pending_days", self.stale_pending_days)?;
        require_positive("automation.due_soon_hours", self.due_soon_hours)?;
        require_positive("automation.auto_flow_interval_secs", self.auto_flow_interval_secs)?;
        require_positive("automation.schedule_interval_secs", self.schedule_interval_secs)
    }
}

fn default_stale_pending_days() -> u64 {
    7
}
fn default_due_soon_hours() -> u64 {
    24
}
fn default_auto_flow_interval_secs() -> u64 {
    300
}
fn default_schedule_interval_secs() -> u64 {
    3600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_daemon_port")]
    pub port: u16,
    #[serde(default = "default_daemon_host")]
    pub host: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            port: default_daemon_port(),
            host: default_daemon_host(),
        }
    }
}

fn default_daemon_port() -> u16 {
    9720
}
fn default_daemon_host() -> String {
    "127.0.0.1".into()
}
