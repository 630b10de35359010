//! netwarden - network control plane
//!
//! Firewall rules, route failover, connection sharing and drop-log alerting
//! for Linux (iptables / iproute2) and Windows (NetSecurity / netsh) hosts.

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use netwarden::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Execute command
    match cli.command {
        Commands::Rule { action } => netwarden::commands::rule::run(action, &cli.config).await,
        Commands::Group { action } => netwarden::commands::group::run(action, &cli.config).await,
        Commands::Route { action } => netwarden::commands::route::run(action, &cli.config).await,
        Commands::Nat { action } => netwarden::commands::nat::run(action, &cli.config).await,
        Commands::Alerts { limit } => {
            netwarden::commands::alerts::run_alerts(limit, &cli.config).await
        }
        Commands::Blocked { limit } => {
            netwarden::commands::alerts::run_blocked(limit, &cli.config).await
        }
        Commands::Config { action } => netwarden::commands::config::run(action, &cli.config).await,
        Commands::Daemon => netwarden::commands::daemon::run(&cli.config).await,
        Commands::Version => {
            println!("netwarden {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
