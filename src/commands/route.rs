//! Route command implementation.

use anyhow::Result;
use std::path::Path;

use super::{dry_run_context, open_context, or_dash, print_plan};
use crate::cli::{RouteAction, RouteArgs};
use crate::config::Config;
use crate::driver::check_root;
use crate::model::RouteEntry;

/// Run the route command
pub async fn run(action: RouteAction, config_path: &Path) -> Result<()> {
    match action {
        RouteAction::Add { route, dry_run } => add(to_route(route), dry_run, config_path).await,
        RouteAction::Update { id, route } => {
            check_root()?;
            let ctx = open_context(config_path)?;
            ctx.routes().update(&id, to_route(route)).await?;
            println!("[OK] Route {} updated", id);
            Ok(())
        }
        RouteAction::Delete { id } => {
            check_root()?;
            let ctx = open_context(config_path)?;
            ctx.routes().delete(&id).await?;
            println!("[OK] Route {} withdrawn", id);
            Ok(())
        }
        RouteAction::List { json } => list(json, config_path).await,
    }
}

pub fn to_route(args: RouteArgs) -> RouteEntry {
    RouteEntry {
        destination: args.destination,
        mask: args.mask,
        gateway: args.gateway,
        metric: args.metric,
        interface_name: args.interface,
        mode: args.mode,
        failover: args.failover,
        enabled: !args.disabled,
    }
}

async fn add(route: RouteEntry, dry_run: bool, config_path: &Path) -> Result<()> {
    if dry_run {
        let (ctx, executor) = dry_run_context(Config::load_or_default(config_path)?);
        ctx.routes().add(route).await?;
        println!("[DRY-RUN] Would install on {}:", ctx.platform);
        print_plan(&executor);
        return Ok(());
    }

    check_root()?;
    let ctx = open_context(config_path)?;
    let summary = format!("{}/{} via {}", route.destination, route.mask, route.gateway);
    let id = ctx.routes().add(route).await?;
    println!("[OK] Route {} installed", summary);
    println!("     id: {}", id);
    Ok(())
}

async fn list(json: bool, config_path: &Path) -> Result<()> {
    let ctx = open_context(config_path)?;
    let routes = ctx.routes().list().await?;

    if json {
        let map: std::collections::BTreeMap<_, _> = routes.into_iter().collect();
        println!("{}", serde_json::to_string_pretty(&map)?);
        return Ok(());
    }

    println!();
    println!("Routes ({} entries):", routes.len());
    println!();
    if routes.is_empty() {
        println!("  (empty)");
    }
    for (id, r) in &routes {
        println!(
            "  {}  {}/{} via {} metric {} dev {}{}{}",
            id,
            r.destination,
            r.mask,
            r.gateway,
            r.metric,
            or_dash(r.interface_name.as_deref()),
            if r.failover { " [failover]" } else { "" },
            if r.enabled { "" } else { " [disabled]" }
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Platform, RouteMode};

    fn args() -> RouteArgs {
        RouteArgs {
            destination: "10.20.0.0".to_string(),
            mask: "255.255.0.0".to_string(),
            gateway: "192.168.1.254".to_string(),
            metric: 5,
            interface: Some("eth1".to_string()),
            mode: RouteMode::Static,
            failover: true,
            disabled: false,
        }
    }

    #[tokio::test]
    async fn test_dry_run_route_plan() {
        let mut config = Config::default();
        config.platform = Platform::Linux;
        let (ctx, executor) = dry_run_context(config);

        ctx.routes().add(to_route(args())).await.unwrap();
        let calls = executor.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].to_string(),
            "ip route add 10.20.0.0/16 via 192.168.1.254 metric 5 dev eth1"
        );
    }
}
