use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "dynmount")]
#[command(about = "Dynamic mounts and self-healing for local and network storage")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to the configuration document
    #[arg(long, env = "DYNMOUNT_CONFIG", global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the watcher daemon until interrupted (requires root)
    Daemon,

    /// Show the live state published by the daemon
    Status {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Check live state against the configuration without changing anything
    Check {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,

        /// Only report problems that break something
        #[arg(short, long)]
        light: bool,
    },

    /// Check, fix what can be fixed, and check again (requires root)
    Fix,

    /// List configured mounts, remote mounts, shares and netshares
    List,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    let config = dynmount_core::resolve_config_path(cli.config.as_deref());
    debug!("Using configuration {}", config.display());

    let clean = match cli.command {
        Commands::Daemon => commands::daemon::execute(&config).await?,
        Commands::Status { json } => commands::status::execute(&config, json)?,
        Commands::Check { json, light } => commands::check::execute(&config, json, light).await?,
        Commands::Fix => commands::fix::execute(&config).await?,
        Commands::List => commands::list::execute(&config)?,
    };

    Ok(if clean {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
