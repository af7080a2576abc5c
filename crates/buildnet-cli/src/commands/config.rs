//! Configuration commands

use crate::config;
use crate::context::Context;
use crate::error::{CliError, CliResult};
use crate::output::{self, print_error, print_success, OutputFormat};
use clap::Subcommand;

/// Config subcommands
#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write the effective configuration and create local directories
    Init {
        /// Overwrite an existing config file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,

    /// Print the config file location
    Path,
}

/// Execute a config command
pub async fn execute(command: ConfigCommands, ctx: Context) -> CliResult<()> {
    match command {
        ConfigCommands::Init { force } => {
            if ctx.config_path.exists() && !force {
                print_error(&format!(
                    "{} already exists (use --force to overwrite)",
                    ctx.config_path.display()
                ));
                return Ok(());
            }
            config::save(&ctx.config, &ctx.config_path)?;
            config::init_directories(&ctx.config.directories)?;
            print_success(&format!("Wrote {}", ctx.config_path.display()));
            Ok(())
        }

        ConfigCommands::Show => match ctx.output {
            OutputFormat::Table => {
                let rendered = toml::to_string_pretty(&ctx.config)
                    .map_err(|e| CliError::Config(e.to_string()))?;
                print!("{}", rendered);
                Ok(())
            }
            format => output::print_single(&ctx.config, format),
        },

        ConfigCommands::Path => {
            println!("{}", ctx.config_path.display());
            Ok(())
        }
    }
}
