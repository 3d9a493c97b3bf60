mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tf_core::config::Config;
use tf_core::types::TaskStatus;
use tf_telemetry::logging::{self, LogFormat};
use uuid::Uuid;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// taskflow CLI -- run workflow automation and inspect tasks.
#[derive(Debug, Parser)]
#[command(name = "tf", version, about)]
struct Cli {
    /// Config file (defaults to ~/.taskflow/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Task database, overriding `store.path` from the config.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Block timed-out tasks, complete finished parents, start sub-tasks.
    AutoFlow {
        /// Inactivity limit for IN_PROGRESS tasks.
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        timeout_hours: Option<u64>,
        /// Report what would change without writing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Timeout detection, health checks and reminders.
    Schedule {
        /// Inactivity limit for IN_PROGRESS tasks.
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        timeout_hours: Option<u64>,
        /// Report what would change without writing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// List the statuses a task can move to right now.
    Transitions { id: Uuid },

    /// Check a transition without applying it.
    Validate { id: Uuid, status: TaskStatus },

    /// Move a task to a new status.
    Transition {
        id: Uuid,
        status: TaskStatus,
        /// Transition context as a JSON object, e.g. '{"reason":"waiting"}'.
        #[arg(long)]
        context: Option<String>,
    },

    /// Show workflow health for a task.
    Health { id: Uuid },

    /// Set task progress (0-100).
    Progress {
        id: Uuid,
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        value: u8,
    },
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::load().context("failed to load config")?,
    };
    if let Some(db) = &cli.db {
        config.store.path = db.display().to_string();
    }
    Ok(config)
}

async fn run(cli: Cli, config: Config) -> Result<String> {
    match cli.command {
        Commands::AutoFlow {
            timeout_hours,
            dry_run,
        } => {
            let daemon = commands::open(config).await?;
            commands::automation::auto_flow(&daemon, timeout_hours, dry_run).await
        }
        Commands::Schedule {
            timeout_hours,
            dry_run,
        } => {
            let daemon = commands::open(config).await?;
            commands::automation::schedule(&daemon, timeout_hours, dry_run).await
        }
        Commands::Transitions { id } => {
            let daemon = commands::open(config).await?;
            commands::task::transitions(daemon.engine(), id).await
        }
        Commands::Validate { id, status } => {
            let daemon = commands::open(config).await?;
            commands::task::validate(daemon.engine(), id, status).await
        }
        Commands::Transition {
            id,
            status,
            context,
        } => {
            let context = commands::task::parse_context(context.as_deref())?;
            let daemon = commands::open(config).await?;
            commands::task::transition(daemon.engine(), id, status, context).await
        }
        Commands::Health { id } => {
            let daemon = commands::open(config).await?;
            commands::task::health(daemon.engine(), id).await
        }
        Commands::Progress { id, value } => {
            let daemon = commands::open(config).await?;
            commands::task::progress(daemon.engine(), id, value).await
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    logging::init(
        "tf",
        &config.general.log_level,
        LogFormat::from_config(&config.general.log_format),
    );

    match run(cli, config).await {
        Ok(output) => {
            print!("{output}");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "command failed");
            Err(e)
        }
    }
}
