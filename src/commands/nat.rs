//! NAT (connection sharing) command implementation.

use anyhow::Result;
use std::path::Path;

use super::open_context;
use crate::cli::NatAction;
use crate::driver::check_root;
use crate::model::NatConfig;

/// Run the nat command
pub async fn run(action: NatAction, config_path: &Path) -> Result<()> {
    let ctx = open_context(config_path)?;

    match action {
        NatAction::Show => {
            let nat = ctx.nat().get().await?;
            println!("Connection sharing: {}", if nat.enabled { "enabled" } else { "disabled" });
            if nat.enabled {
                println!("  WAN: {}", nat.wan);
                println!("  LAN: {}", nat.lan);
            }
        }
        NatAction::Set { enable, wan, lan } => {
            check_root()?;
            let config = NatConfig { enabled: enable, wan, lan };
            ctx.nat().apply(config.clone()).await?;
            if config.enabled {
                println!("[OK] Sharing {} to {}", config.wan, config.lan);
            } else {
                println!("[OK] Connection sharing disabled");
            }
        }
    }
    Ok(())
}
