use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use tf_bridge::http_api::{api_routes, with_middleware, ApiState};
use tf_core::cache::SqliteStore;
use tf_core::config::Config;
use tf_core::events::{EventBus, EventKind};
use tf_core::store::TaskStore;
use tf_engine::WorkflowEngine;
use tracing::{debug, error, info, warn};

use crate::api::{automation_routes, AutomationState};
use crate::auto_flow::AutoFlowRunner;
use crate::patrol::PatrolRunner;
use crate::shutdown::ShutdownSignal;
use crate::sweep::{AutomationError, SweepOptions};

/// Loop intervals of the two automation jobs.
#[derive(Debug, Clone)]
pub struct DaemonIntervals {
    pub auto_flow_secs: u64,
    pub schedule_secs: u64,
}

impl DaemonIntervals {
    pub fn from_config(config: &Config) -> Self {
        Self {
            auto_flow_secs: config.automation.auto_flow_interval_secs,
            schedule_secs: config.automation.schedule_interval_secs,
        }
    }
}

/// The taskflow background daemon.
///
/// Runs auto-flow and schedule on fixed intervals and serves the HTTP API
/// until the [`ShutdownSignal`] fires.
pub struct Daemon {
    config: Config,
    engine: Arc<WorkflowEngine>,
    event_bus: EventBus,
    auto_flow: Arc<AutoFlowRunner>,
    patrol: Arc<PatrolRunner>,
    intervals: DaemonIntervals,
    shutdown: ShutdownSignal,
}

impl Daemon {
    /// Build a daemon over an already opened store.
    pub fn with_store(config: Config, store: Arc<dyn TaskStore>) -> Self {
        let event_bus = EventBus::new();
        let engine = Arc::new(
            WorkflowEngine::with_defaults(
                store,
                config.workflow.clone(),
                Arc::new(event_bus.clone()),
            )
            .with_health(config.health.clone()),
        );
        let auto_flow = Arc::new(AutoFlowRunner::new(engine.clone()));
        let patrol = Arc::new(PatrolRunner::new(engine.clone(), &config.automation));
        let intervals = DaemonIntervals::from_config(&config);
        Self {
            config,
            engine,
            event_bus,
            auto_flow,
            patrol,
            intervals,
            shutdown: ShutdownSignal::new(),
        }
    }

    /// Open (or create) the SQLite store named in the config.
    pub async fn new(config: Config) -> Result<Self> {
        let path = config.store_path();
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        let store = SqliteStore::new(&path)
            .await
            .with_context(|| format!("failed to open task store at {}", path.display()))?;
        Ok(Self::with_store(config, Arc::new(store)))
    }

    pub fn set_intervals(&mut self, intervals: DaemonIntervals) {
        self.intervals = intervals;
    }

    pub fn shutdown_handle(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &Arc<WorkflowEngine> {
        &self.engine
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn auto_flow(&self) -> &Arc<AutoFlowRunner> {
        &self.auto_flow
    }

    pub fn patrol(&self) -> &Arc<PatrolRunner> {
        &self.patrol
    }

    /// Task API plus the automation routes, behind the shared middleware.
    pub fn router(&self) -> Router {
        let api = api_routes(Arc::new(ApiState::new(self.engine.clone())));
        let automation = automation_routes(Arc::new(AutomationState {
            auto_flow: self.auto_flow.clone(),
            patrol: self.patrol.clone(),
            defaults: self.config.automation.clone(),
        }));
        with_middleware(api.merge(automation))
    }

    /// Bind to the configured address and run until shutdown.
    pub async fn run(&self) -> Result<()> {
        let bind_addr = format!("{}:{}", self.config.daemon.host, self.config.daemon.port);
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("failed to bind {bind_addr}"))?;
        self.run_with_listener(listener).await
    }

    /// Run with a pre-bound listener (port 0 in tests).
    pub async fn run_with_listener(&self, listener: tokio::net::TcpListener) -> Result<()> {
        let bind_addr = listener.local_addr()?;
        let router = self.router();
        let server_shutdown = self.shutdown.clone();
        let api_handle = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move { server_shutdown.wait().await })
                .await;
            if let Err(e) = served {
                error!(error = %e, "API server error");
            }
        });
        info!(%bind_addr, "API server listening");

        let logger = self.spawn_event_logger();

        info!(
            auto_flow_secs = self.intervals.auto_flow_secs,
            schedule_secs = self.intervals.schedule_secs,
            "daemon starting automation loops"
        );
        Self::run_loops(
            self.auto_flow.clone(),
            self.patrol.clone(),
            SweepOptions::from_config(&self.config.automation),
            self.intervals.clone(),
            self.shutdown.clone(),
        )
        .await;

        if let Err(e) = api_handle.await {
            warn!(error = %e, "API server task ended abnormally");
        }
        logger.abort();
        info!("daemon stopped");
        Ok(())
    }

    /// Log every workflow event; delivery to other channels happens outside
    /// this process.
    fn spawn_event_logger(&self) -> tokio::task::JoinHandle<()> {
        let rx = self.event_bus.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = rx.recv_async().await {
                match event.kind {
                    EventKind::HealthIssue | EventKind::StaleReminder | EventKind::DueSoonReminder => {
                        info!(kind = ?event.kind, task_id = %event.task_id, context = %event.context.to_value(), "workflow notice");
                    }
                    _ => {
                        debug!(kind = ?event.kind, task_id = %event.task_id, from = ?event.from_status, to = ?event.to_status, "workflow event");
                    }
                }
            }
        })
    }

    async fn run_loops(
        auto_flow: Arc<AutoFlowRunner>,
        patrol: Arc<PatrolRunner>,
        opts: SweepOptions,
        intervals: DaemonIntervals,
        shutdown: ShutdownSignal,
    ) {
        let mut auto_flow_interval =
            tokio::time::interval(Duration::from_secs(intervals.auto_flow_secs.max(1)));
        let mut schedule_interval =
            tokio::time::interval(Duration::from_secs(intervals.schedule_secs.max(1)));
        auto_flow_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        schedule_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        // Consume the immediate first tick so both jobs don't fire at t=0.
        auto_flow_interval.tick().await;
        schedule_interval.tick().await;

        loop {
            tokio::select! {
                _ = auto_flow_interval.tick() => {
                    match auto_flow.run(opts).await {
                        Ok(_) | Err(AutomationError::AlreadyRunning(_)) => {}
                        Err(e) => error!(error = %e, "auto-flow failed"),
                    }
                }
                _ = schedule_interval.tick() => {
                    match patrol.run(opts).await {
                        Ok(_) | Err(AutomationError::AlreadyRunning(_)) => {}
                        Err(e) => error!(error = %e, "schedule failed"),
                    }
                }
                _ = shutdown.wait() => {
                    info!("shutdown signal received, stopping automation loops");
                    break;
                }
            }
        }
    }
}
