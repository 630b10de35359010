//! Daemon command: run the background loops until SIGINT/SIGTERM.

use anyhow::Result;
use std::path::Path;
use tracing::info;

use super::open_context;
use crate::daemon::Supervisor;
use crate::driver::check_root;
use crate::lock::LockGuard;
use crate::signal::{ShutdownGuard, ShutdownToken};

pub async fn run(config_path: &Path) -> Result<()> {
    check_root()?;

    // One daemon per host
    let _lock = LockGuard::acquire()?;

    let ctx = open_context(config_path)?;
    info!("netwarden daemon starting on {}", ctx.platform);

    let token = ShutdownToken::new();
    let _signals = ShutdownGuard::new(token.clone());

    let supervisor = Supervisor::start(&ctx, token.clone())?;
    token.cancelled().await;

    info!("Shutdown requested, stopping background tasks");
    supervisor.shutdown().await;
    Ok(())
}
