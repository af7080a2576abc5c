//! buildnet - Local build-cluster provisioning CLI

use colored::*;

#[tokio::main]
async fn main() {
    if let Err(e) = buildnet_cli::run().await {
        eprintln!("{} {}", "✗".red(), e);
        std::process::exit(1);
    }
}
