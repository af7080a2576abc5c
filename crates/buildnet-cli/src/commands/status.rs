//! Local state overview and preparation

use crate::config;
use crate::context::Context;
use crate::error::CliResult;
use crate::output::{self, print_info, print_success, OutputFormat};
use buildnet_runtime::TrustMaterial;
use colored::*;
use serde::Serialize;
use tabled::Tabled;

#[derive(Debug, Serialize, Tabled)]
struct DirectoryRow {
    name: String,
    path: String,
    exists: bool,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    config_file: String,
    directories: Vec<DirectoryRow>,
    key_pair: bool,
    coordinator: Option<String>,
    workers: usize,
}

/// Print directories, key pair, coordinator and worker overview
pub async fn status(ctx: Context) -> CliResult<()> {
    let directories: Vec<DirectoryRow> = ctx
        .config
        .directories
        .all()
        .into_iter()
        .map(|(name, path)| DirectoryRow {
            name: name.to_string(),
            path: path.display().to_string(),
            exists: path.is_dir(),
        })
        .collect();

    let runtime_up = ctx.runtime().info().await.success;
    let (coordinator, workers) = if runtime_up {
        let workers = ctx.provisioner()?.list_workers().await?.len();
        (ctx.coordinator().status().await?, workers)
    } else {
        (None, 0)
    };

    let report = StatusReport {
        config_file: ctx.config_path.display().to_string(),
        directories,
        key_pair: ctx.key_store().exists(),
        coordinator,
        workers,
    };

    if ctx.output != OutputFormat::Table {
        return output::print_single(&report, ctx.output);
    }

    println!("{}", "Directories".bold());
    output::print_output(report.directories, ctx.output)?;
    println!("Config file: {}", report.config_file);
    println!("Key pair:    {}", marker(report.key_pair));
    if runtime_up {
        println!(
            "Coordinator: {}",
            report.coordinator.as_deref().unwrap_or("absent")
        );
        println!("Workers:     {}", report.workers);
    } else {
        println!("Runtime:     {}", "unavailable".red());
    }
    Ok(())
}

/// Create local directories, the shared network and the coordinator volume
pub async fn init(ctx: Context) -> CliResult<()> {
    config::init_directories(&ctx.config.directories)?;
    print_success(&format!(
        "Directories ready under {}",
        ctx.config.directories.base.display()
    ));

    ctx.require_runtime().await?;
    ctx.ensure_shared_resources().await?;
    print_success(&format!("Network {} ready", ctx.config.network.name));
    print_success(&format!("Volume {} ready", ctx.config.volume.name));
    if !ctx.key_store().exists() {
        print_info("Run `buildnet keys generate` to create the worker key pair");
    }
    Ok(())
}

fn marker(ok: bool) -> ColoredString {
    if ok {
        "✓".green()
    } else {
        "✗".red()
    }
}
