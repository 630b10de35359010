//! Config command implementation.

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::cli::ConfigAction;
use crate::config::Config;

/// Run the config command
pub async fn run(action: ConfigAction, config_path: &Path) -> Result<()> {
    match action {
        ConfigAction::Init { force } => init(force, config_path),
        ConfigAction::Show => show(config_path),
    }
}

fn init(force: bool, config_path: &Path) -> Result<()> {
    if config_path.exists() && !force {
        bail!("{:?} already exists (use --force to overwrite)", config_path);
    }
    if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }
    std::fs::write(config_path, Config::generate_default_yaml())
        .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
    println!("[OK] Default configuration written to {:?}", config_path);
    Ok(())
}

fn show(config_path: &Path) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    let on_off = |b: bool| if b { "enabled" } else { "disabled" };

    println!("Config file: {:?}{}", config_path, if config_path.exists() { "" } else { " (defaults)" });
    println!("Platform:    {} (resolved: {})", config.platform, config.platform.resolve());
    println!("Store:       {:?}", config.store_path);
    println!();
    println!(
        "Watchdog:    {}, every {}s, probe timeout {}s",
        on_off(config.watchdog.enabled),
        config.watchdog.interval_secs,
        config.watchdog.probe_timeout_secs
    );
    println!("Monitor:     {}", on_off(config.monitor.enabled));
    println!("  log:       {}", config.monitor.log_path.display());
    println!(
        "  blocked:   > {} in {}s",
        config.monitor.blocked_threshold, config.monitor.blocked_window_secs
    );
    println!(
        "  deny:      > {} in {}s, checked every {}s",
        config.monitor.deny_threshold,
        config.monitor.deny_window_secs,
        config.monitor.aggregate_interval_secs
    );
    println!();
    println!("Gotify:      {}", on_off(config.alerts.gotify.enabled));
    println!("Webhook:     {}", on_off(config.alerts.webhook.enabled));
    Ok(())
}
