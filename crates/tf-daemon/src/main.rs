//! taskflow daemon: runs the automation loops and serves the HTTP API.

use anyhow::{Context, Result};
use tf_core::config::Config;
use tf_daemon::daemon::Daemon;
use tf_telemetry::logging::{self, LogFormat};
use tracing::info;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::var_os("TASKFLOW_CONFIG") {
        Some(path) => Config::load_from(path).context("failed to load config")?,
        None => Config::load().context("failed to load config")?,
    };

    logging::init(
        "tf-daemon",
        &config.general.log_level,
        LogFormat::from_config(&config.general.log_format),
    );
    info!(
        version = env!("CARGO_PKG_VERSION"),
        project = %config.general.project_name,
        "taskflow daemon starting"
    );

    let daemon = Daemon::new(config).await?;
    let shutdown = daemon.shutdown_handle();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        info!("ctrl-c received, initiating shutdown");
        shutdown.trigger();
    });

    if let Err(e) = daemon.run().await {
        tracing::error!(error = %e, "daemon execution failed");
        return Err(e);
    }
    Ok(())
}
