//! SSH key pair commands

use crate::context::Context;
use crate::error::CliResult;
use crate::output::{self, print_error, print_success};
use buildnet_runtime::TrustMaterial;
use clap::Subcommand;

/// Key subcommands
#[derive(Subcommand)]
pub enum KeyCommands {
    /// Generate the worker SSH key pair
    Generate {
        /// Overwrite an existing pair without asking
        #[arg(short, long)]
        force: bool,
    },

    /// Print the public key
    Show,

    /// Copy the pair into a timestamped backup
    Backup,
}

/// Execute a key command
pub async fn execute(command: KeyCommands, ctx: Context) -> CliResult<()> {
    let store = ctx.key_store();
    match command {
        KeyCommands::Generate { force } => {
            let overwrite = store.exists()
                && (force
                    || output::confirm(
                        "A key pair already exists. Overwrite it? Registered workers will lose access.",
                        false,
                    ));
            if store.exists() && !overwrite {
                print_error("Aborted");
                return Ok(());
            }
            store.generate(overwrite).await?;
            print_success(&format!(
                "Generated key pair {}",
                store.private_key_path().display()
            ));
            Ok(())
        }

        KeyCommands::Show => {
            println!("{}", store.public_key_content().await?.trim());
            Ok(())
        }

        KeyCommands::Backup => {
            let (private_copy, public_copy) = store.backup().await?;
            print_success(&format!("Backed up {}", private_copy.display()));
            print_success(&format!("Backed up {}", public_copy.display()));
            Ok(())
        }
    }
}
