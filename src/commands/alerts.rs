//! Alert and blocked-packet history.

use anyhow::Result;
use std::path::Path;

use super::open_context;

/// Show the most recent alerts, newest first.
pub async fn run_alerts(limit: usize, config_path: &Path) -> Result<()> {
    let ctx = open_context(config_path)?;
    let alerts = ctx.records.recent_alerts(limit).await?;

    if alerts.is_empty() {
        println!("No alerts recorded");
        return Ok(());
    }
    for alert in alerts {
        println!(
            "{} [{}] {}",
            alert.timestamp.format("%Y-%m-%d %H:%M:%S"),
            alert.level,
            alert.message
        );
    }
    Ok(())
}

/// Show the most recent blocked-packet log lines, newest first.
pub async fn run_blocked(limit: usize, config_path: &Path) -> Result<()> {
    let ctx = open_context(config_path)?;
    let blocked = ctx.records.recent_blocked(limit).await?;

    if blocked.is_empty() {
        println!("No blocked packets recorded");
        return Ok(());
    }
    for record in blocked {
        println!("{} {}", record.timestamp.format("%Y-%m-%d %H:%M:%S"), record.raw_log_line);
    }
    Ok(())
}
