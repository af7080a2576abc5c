//! Set up the whole cluster in one run

use super::{batch_outcome, report_batch};
use crate::config;
use crate::context::Context;
use crate::error::CliResult;
use crate::output::{self, print_info, print_success, spinner, OutputFormat};
use buildnet_orchestrator::Pipeline;
use buildnet_types::ClusterOverrides;
use clap::Args;
use std::sync::Arc;

/// Options of `buildnet setup`
#[derive(Debug, Args)]
pub struct SetupArgs {
    /// Number of workers
    #[arg(short = 'n', long)]
    workers: Option<u32>,

    /// CPU limit per worker
    #[arg(long)]
    cpus: Option<String>,

    /// Memory limit per worker (e.g. 4g)
    #[arg(long)]
    memory: Option<String>,

    /// Host port of the web interface
    #[arg(long)]
    port: Option<u16>,

    /// Host port of the agent transport
    #[arg(long)]
    agent_port: Option<u16>,

    /// Admin account created on first run
    #[arg(long, env = "BUILDNET_ADMIN_USER")]
    admin_user: Option<String>,

    /// Password of the admin account
    #[arg(long, env = "BUILDNET_ADMIN_PASSWORD", hide_env_values = true)]
    admin_password: Option<String>,

    /// Write the effective configuration back to the config file
    #[arg(long)]
    save: bool,
}

impl SetupArgs {
    fn overrides(&self) -> ClusterOverrides {
        ClusterOverrides {
            coordinator_port: self.port,
            agent_port: self.agent_port,
            worker_count: self.workers,
            cpus: self.cpus.clone(),
            memory: self.memory.clone(),
            admin_username: self.admin_user.clone(),
            admin_password: self.admin_password.clone(),
            ..Default::default()
        }
    }
}

/// Execute `buildnet setup`
pub async fn execute(args: SetupArgs, ctx: Context) -> CliResult<()> {
    let ctx = ctx.with_overrides(&args.overrides());
    ctx.config.validate()?;

    config::init_directories(&ctx.config.directories)?;
    if args.save {
        config::save(&ctx.config, &ctx.config_path)?;
        print_info(&format!("Saved configuration to {}", ctx.config_path.display()));
    }
    ctx.ensure_keys().await?;

    let pipeline = Pipeline::new(
        ctx.config.clone(),
        ctx.runtime(),
        Arc::new(ctx.key_store()),
        Arc::new(ctx.control_plane()?),
    );

    let pb = spinner(format!(
        "Bringing up coordinator and {} workers...",
        ctx.config.workers.count
    ));
    let result = pipeline.run().await;
    pb.finish_and_clear();
    let report = result?;

    if ctx.output != OutputFormat::Table {
        output::print_single(&report, ctx.output)?;
        return batch_outcome(&report.workers);
    }

    print_success(&format!("Coordinator ready at {}", report.url));
    print_info(&format!("Admin user: {}", report.admin_username));
    print_info(&format!("Admin password: {}", report.admin_password));
    if report.extensions.restarted {
        print_info(&format!(
            "Installed extensions: {}",
            report.extensions.installed.join(", ")
        ));
    }
    report_batch(&report.workers, ctx.output)
}
