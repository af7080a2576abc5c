//! Worker commands

use super::{report_batch, ContainerRow};
use crate::context::Context;
use crate::error::{CliError, CliResult};
use crate::output::{self, print_error, print_success, print_warning};
use buildnet_orchestrator::RemovalOutcome;
use buildnet_types::ClusterOverrides;
use clap::Subcommand;
use serde::Serialize;
use std::path::PathBuf;
use tabled::Tabled;

/// Worker subcommands
#[derive(Subcommand)]
pub enum WorkerCommands {
    /// Provision a batch of workers and register them with the coordinator
    Deploy {
        /// Number of workers (default: workers.count)
        #[arg(short = 'n', long)]
        count: Option<u32>,

        /// CPU limit per worker
        #[arg(long)]
        cpus: Option<String>,

        /// Memory limit per worker (e.g. 4g)
        #[arg(long)]
        memory: Option<String>,

        /// External SSH port of the first worker
        #[arg(long)]
        base_port: Option<u16>,
    },

    /// List worker containers
    List,

    /// Print the logs of one worker
    Logs {
        /// Worker index, starting at 1
        index: u32,
    },

    /// Stop and remove workers
    Remove {
        /// Worker index, starting at 1
        #[arg(required_unless_present = "all")]
        index: Option<u32>,

        /// Force-remove every worker container
        #[arg(long, conflicts_with = "index")]
        all: bool,

        /// Skip confirmation
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Build the worker image
    BuildImage {
        /// Dockerfile to build from
        #[arg(short, long, default_value = "docker/worker.Dockerfile")]
        dockerfile: PathBuf,

        /// Image tag (default: workers.image)
        #[arg(short, long)]
        tag: Option<String>,
    },
}

#[derive(Debug, Serialize, Tabled)]
struct RemovalRow {
    name: String,
    id: String,
    removed: bool,
    message: String,
}

impl From<RemovalOutcome> for RemovalRow {
    fn from(r: RemovalOutcome) -> Self {
        Self {
            name: r.name,
            id: super::short_id(&r.id),
            removed: r.removed,
            message: r.message,
        }
    }
}

/// Execute a worker command
pub async fn execute(command: WorkerCommands, ctx: Context) -> CliResult<()> {
    match command {
        WorkerCommands::Deploy {
            count,
            cpus,
            memory,
            base_port,
        } => {
            let ctx = ctx.with_overrides(&ClusterOverrides {
                worker_count: count,
                cpus,
                memory,
                base_ssh_port: base_port,
                ..Default::default()
            });
            let count = ctx.config.workers.count;
            ctx.config.validate_batch(count)?;
            ctx.require_runtime().await?;
            ctx.ensure_shared_resources().await?;
            ctx.ensure_keys().await?;

            let report = ctx.provisioner()?.provision(count).await?;
            report_batch(&report, ctx.output)
        }

        WorkerCommands::List => {
            let rows: Vec<ContainerRow> = ctx
                .provisioner()?
                .list_workers()
                .await?
                .into_iter()
                .map(ContainerRow::from)
                .collect();
            output::print_output(rows, ctx.output)
        }

        WorkerCommands::Logs { index } => {
            let logs = ctx.provisioner()?.worker_logs(index).await?;
            print!("{}", logs);
            Ok(())
        }

        WorkerCommands::Remove { index, all, yes } => {
            let provisioner = ctx.provisioner()?;
            if all {
                if !output::confirm("Force-remove every worker container?", yes) {
                    print_error("Aborted");
                    return Ok(());
                }
                let outcomes = provisioner.remove_all_workers().await?;
                let failed = outcomes.iter().filter(|o| !o.removed).count();
                let rows: Vec<RemovalRow> = outcomes.into_iter().map(RemovalRow::from).collect();
                output::print_output(rows, ctx.output)?;
                if failed > 0 {
                    print_warning(&format!("{} workers could not be removed", failed));
                }
                return Ok(());
            }

            let index = index.ok_or_else(|| {
                CliError::InvalidInput("a worker index or --all is required".into())
            })?;
            if index == 0 {
                return Err(buildnet_types::ConfigError::InvalidIndex(index).into());
            }
            if !output::confirm(format!("Remove worker {}?", index), yes) {
                print_error("Aborted");
                return Ok(());
            }
            let name = provisioner.remove_worker(index).await?;
            print_success(&format!("Removed {}", name));
            Ok(())
        }

        WorkerCommands::BuildImage { dockerfile, tag } => {
            if !dockerfile.is_file() {
                return Err(CliError::InvalidInput(format!(
                    "no Dockerfile at {}",
                    dockerfile.display()
                )));
            }
            let tag = tag.unwrap_or_else(|| ctx.config.workers.image.clone());
            ctx.require_runtime().await?;
            ctx.runtime()
                .build_image(&dockerfile, &tag)
                .await
                .into_result("image build")?;
            print_success(&format!("Built image {}", tag));
            Ok(())
        }
    }
}
