//! buildnet CLI - Local build-cluster provisioning from the terminal
//!
//! This CLI lets an operator:
//! - Bring up a coordinator and a batch of SSH workers in one command
//! - Manage the coordinator container and its volume
//! - Provision, list and remove workers
//! - Generate and back up the worker SSH key pair

#![deny(unsafe_code)]

use clap::{Parser, Subcommand};
use std::ffi::OsString;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod context;
mod error;
mod output;

use commands::{coordinator, keys, setup, status, volume, worker};
use context::Context;
pub use error::{CliError, CliResult};

/// buildnet CLI application
#[derive(Parser)]
#[command(name = "buildnet")]
#[command(about = "buildnet - Local build cluster provisioning", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "BUILDNET_CONFIG")]
    config: Option<PathBuf>,

    /// Output format (table, json, yaml)
    #[arg(short, long, default_value = "table")]
    output: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Bring up the coordinator, its extensions and a batch of workers
    Setup(setup::SetupArgs),

    /// Manage the coordinator container
    #[command(alias = "master")]
    Coordinator {
        #[command(subcommand)]
        command: coordinator::CoordinatorCommands,
    },

    /// Manage worker containers
    #[command(alias = "agent")]
    Worker {
        #[command(subcommand)]
        command: worker::WorkerCommands,
    },

    /// Manage the worker SSH key pair
    Keys {
        #[command(subcommand)]
        command: keys::KeyCommands,
    },

    /// Back up or restore the coordinator volume
    Volume {
        #[command(subcommand)]
        command: volume::VolumeCommands,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: commands::config::ConfigCommands,
    },

    /// Create local directories, the shared network and the volume
    Init,

    /// Show local state
    Status,
}

/// Run using the current process arguments.
pub async fn run() -> CliResult<()> {
    run_with_args(std::env::args_os()).await
}

/// Run using the provided argument iterator.
pub async fn run_with_args<I, T>(args: I) -> CliResult<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    let filter = if cli.verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .try_init();

    let loaded = config::load(cli.config.as_deref())?;
    tracing::debug!(
        path = %loaded.path.display(),
        from_file = loaded.from_file,
        "Loaded configuration"
    );
    let ctx = Context::new(loaded.config, loaded.path, cli.output);

    match cli.command {
        Commands::Setup(args) => setup::execute(args, ctx).await,
        Commands::Coordinator { command } => coordinator::execute(command, ctx).await,
        Commands::Worker { command } => worker::execute(command, ctx).await,
        Commands::Keys { command } => keys::execute(command, ctx).await,
        Commands::Volume { command } => volume::execute(command, ctx).await,
        Commands::Config { command } => commands::config::execute(command, ctx).await,
        Commands::Init => status::init(ctx).await,
        Commands::Status => status::status(ctx).await,
    }
}
