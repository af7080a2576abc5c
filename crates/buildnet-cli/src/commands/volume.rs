//! Coordinator volume backup and restore

use crate::context::Context;
use crate::error::{CliError, CliResult};
use crate::output::{self, print_error, print_success, print_warning};
use clap::Subcommand;
use std::path::PathBuf;

/// Volume subcommands
#[derive(Subcommand)]
pub enum VolumeCommands {
    /// Archive the coordinator volume
    Backup {
        /// Archive path (default: <volumes>/jenkins-backup.tar.gz)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Extract an archive into the coordinator volume
    Restore {
        /// Archive path (default: <volumes>/jenkins-backup.tar.gz)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Skip confirmation
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

/// Execute a volume command
pub async fn execute(command: VolumeCommands, ctx: Context) -> CliResult<()> {
    let volume = ctx.config.volume.name.clone();
    let runtime = ctx.runtime();
    match command {
        VolumeCommands::Backup { file } => {
            let archive = file.unwrap_or_else(|| ctx.config.directories.volume_backup());
            if let Some(parent) = archive.parent() {
                std::fs::create_dir_all(parent)?;
            }
            runtime
                .backup_volume(&volume, &archive)
                .await
                .into_result("volume backup")?;
            print_success(&format!("Volume {} backed up to {}", volume, archive.display()));
            Ok(())
        }

        VolumeCommands::Restore { file, yes } => {
            let archive = file.unwrap_or_else(|| ctx.config.directories.volume_backup());
            if !archive.is_file() {
                return Err(CliError::InvalidInput(format!(
                    "no backup archive at {}",
                    archive.display()
                )));
            }
            let prompt = format!(
                "Restore {} from {}? Existing files will be overwritten.",
                volume,
                archive.display()
            );
            if !output::confirm(prompt, yes) {
                print_error("Aborted");
                return Ok(());
            }
            runtime
                .restore_volume(&volume, &archive)
                .await
                .into_result("volume restore")?;
            print_success(&format!("Volume {} restored from {}", volume, archive.display()));
            if matches!(ctx.coordinator().is_running().await, Ok(true)) {
                print_warning("Restart the coordinator to load the restored data");
            }
            Ok(())
        }
    }
}
