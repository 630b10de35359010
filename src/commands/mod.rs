//! CLI command implementations.

pub mod alerts;
pub mod config;
pub mod daemon;
pub mod group;
pub mod nat;
pub mod route;
pub mod rule;

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use crate::cmd_abstraction::RecordingExecutor;
use crate::config::Config;
use crate::context::ControlContext;
use crate::store::MemoryStore;

/// Load the configuration and wire the production context.
pub(crate) fn open_context(config_path: &Path) -> Result<ControlContext> {
    let config = Config::load_or_default(config_path)?;
    ControlContext::open(config)
}

/// Context that records host commands instead of running them and keeps
/// records in memory.
pub(crate) fn dry_run_context(config: Config) -> (ControlContext, Arc<RecordingExecutor>) {
    let executor = Arc::new(RecordingExecutor::new());
    let ctx = ControlContext::new(config, Arc::new(MemoryStore::new()), executor.clone());
    (ctx, executor)
}

/// Print a recorded command plan.
pub(crate) fn print_plan(executor: &RecordingExecutor) {
    let calls = executor.calls();
    if calls.is_empty() {
        println!("  (no host commands)");
    }
    for (i, inv) in calls.iter().enumerate() {
        println!("  {}. {}", i + 1, inv);
    }
}

/// Render an optional value for table output.
pub(crate) fn or_dash(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => "-",
    }
}
