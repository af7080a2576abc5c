//! Coordinator commands

use crate::context::Context;
use crate::error::CliResult;
use crate::output::{self, print_error, print_info, print_success, print_warning, spinner};
use buildnet_control::ControlPlane;
use buildnet_orchestrator::{CoordinatorError, DeployOutcome};
use buildnet_types::ClusterOverrides;
use clap::Subcommand;
use serde::Serialize;
use std::time::Duration;
use tabled::Tabled;

/// Attempts at reading the first-run password after a deploy
const PASSWORD_ATTEMPTS: u32 = 30;

/// Coordinator subcommands
#[derive(Subcommand)]
pub enum CoordinatorCommands {
    /// Deploy the coordinator container and wait for it to answer
    Deploy {
        /// Host port of the web interface
        #[arg(long)]
        port: Option<u16>,

        /// Host port of the agent transport
        #[arg(long)]
        agent_port: Option<u16>,

        /// Return as soon as the container is up
        #[arg(long)]
        no_wait: bool,
    },

    /// Start the stopped coordinator
    Start,

    /// Stop the coordinator
    Stop,

    /// Stop then start the coordinator
    Restart,

    /// Show container state and control-plane readiness
    Status,

    /// Print container logs
    Logs,

    /// Print the generated first-run admin password
    Password,

    /// Remove the coordinator container (the volume is kept)
    Remove {
        /// Skip confirmation
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

#[derive(Debug, Serialize, Tabled)]
struct CoordinatorRow {
    name: String,
    status: String,
    url: String,
    ready: bool,
}

/// Execute a coordinator command
pub async fn execute(command: CoordinatorCommands, ctx: Context) -> CliResult<()> {
    match command {
        CoordinatorCommands::Deploy {
            port,
            agent_port,
            no_wait,
        } => {
            let ctx = ctx.with_overrides(&ClusterOverrides {
                coordinator_port: port,
                agent_port,
                ..Default::default()
            });
            deploy(&ctx, no_wait).await
        }

        CoordinatorCommands::Start => {
            let coordinator = ctx.coordinator();
            coordinator.start().await?;
            print_success(&format!("Started {}", coordinator.container_name()));
            Ok(())
        }

        CoordinatorCommands::Stop => {
            let coordinator = ctx.coordinator();
            coordinator.stop().await?;
            print_success(&format!("Stopped {}", coordinator.container_name()));
            Ok(())
        }

        CoordinatorCommands::Restart => {
            let coordinator = ctx.coordinator();
            coordinator.restart().await?;
            print_success(&format!("Restarted {}", coordinator.container_name()));
            Ok(())
        }

        CoordinatorCommands::Status => {
            let coordinator = ctx.coordinator();
            let status = coordinator.status().await?;
            let ready = match status {
                Some(_) => ctx.control_plane()?.is_ready().await,
                None => false,
            };
            let row = CoordinatorRow {
                name: coordinator.container_name().to_string(),
                status: status.unwrap_or_else(|| "absent".into()),
                url: coordinator.url(),
                ready,
            };
            output::print_output(vec![row], ctx.output)
        }

        CoordinatorCommands::Logs => {
            let logs = ctx.coordinator().logs().await?;
            print!("{}", logs);
            Ok(())
        }

        CoordinatorCommands::Password => {
            match ctx
                .coordinator()
                .initial_admin_password(1, Duration::ZERO)
                .await?
            {
                Some(password) => println!("{}", password),
                None => print_warning("No first-run password present"),
            }
            Ok(())
        }

        CoordinatorCommands::Remove { yes } => {
            let coordinator = ctx.coordinator();
            let prompt = format!(
                "Remove {}? The {} volume is kept.",
                coordinator.container_name(),
                ctx.config.volume.name
            );
            if !output::confirm(prompt, yes) {
                print_error("Aborted");
                return Ok(());
            }
            coordinator.remove().await?;
            print_success(&format!("Removed {}", coordinator.container_name()));
            Ok(())
        }
    }
}

async fn deploy(ctx: &Context, no_wait: bool) -> CliResult<()> {
    ctx.config.validate()?;
    ctx.require_runtime().await?;
    ctx.ensure_shared_resources().await?;

    let coordinator = ctx.coordinator();
    match coordinator.deploy().await? {
        DeployOutcome::AlreadyRunning => {
            print_info(&format!("{} is already running", coordinator.container_name()))
        }
        DeployOutcome::Started => print_success(&format!(
            "Started existing container {}",
            coordinator.container_name()
        )),
        DeployOutcome::Created(id) => print_success(&format!(
            "Deployed {} ({})",
            coordinator.container_name(),
            super::short_id(id.trim())
        )),
    }

    if no_wait {
        return Ok(());
    }

    let plane = ctx.control_plane()?;
    let deadline = ctx.config.timings.readiness_timeout();
    let pb = spinner("Waiting for the coordinator to answer...");
    if !coordinator.wait_for_ready(&plane, deadline).await {
        pb.finish_and_clear();
        return Err(CoordinatorError::ReadinessTimeout(deadline).into());
    }
    pb.finish_with_message("Coordinator is ready");

    let password = coordinator
        .initial_admin_password(PASSWORD_ATTEMPTS, Duration::from_secs(1))
        .await?;
    if let Some(password) = password {
        print_info(&format!("Initial admin password: {}", password));
    }
    print_info(&format!("Access the coordinator at {}", coordinator.url()));
    Ok(())
}
