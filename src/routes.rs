//! Static route management (`ip route` / `netsh interface ipv4`).
//!
//! Routes are validated, compiled to one host command and persisted in the
//! `routes` collection. The failover watchdog shares [`RouteManager::withdraw`]
//! with the API surface and neither side takes a lock: a watchdog tick may
//! withdraw a route that an `update` is replacing at the same moment.

use std::sync::Arc;
use tracing::{info, warn};

use crate::cmd_abstraction::{run_checked, CommandExecutor, Invocation};
use crate::error::{ControlError, ControlResult};
use crate::model::{Platform, RouteEntry, RouteMode};
use crate::store::Records;
use crate::validation::{mask_to_prefix, validate_dotted_quad, validate_interface_name};

pub const MIN_METRIC: u32 = 1;
pub const MAX_METRIC: u32 = 9999;

/// Check every field before anything touches the host.
pub fn validate_route(route: &RouteEntry) -> ControlResult<()> {
    let to_validation = |e: anyhow::Error| ControlError::validation(e.to_string());

    validate_dotted_quad("destination", &route.destination).map_err(to_validation)?;
    validate_dotted_quad("subnet mask", &route.mask).map_err(to_validation)?;
    validate_dotted_quad("gateway", &route.gateway).map_err(to_validation)?;

    if !(MIN_METRIC..=MAX_METRIC).contains(&route.metric) {
        return Err(ControlError::validation(format!(
            "Invalid metric {}: expected {}-{}",
            route.metric, MIN_METRIC, MAX_METRIC
        )));
    }

    if let Some(iface) = interface_of(route) {
        validate_interface_name(iface).map_err(to_validation)?;
    }
    Ok(())
}

fn interface_of(route: &RouteEntry) -> Option<&str> {
    route
        .interface_name
        .as_deref()
        .filter(|name| !name.trim().is_empty())
}

/// Compile the host command that installs `route`.
pub fn compile_route_add(route: &RouteEntry, platform: Platform) -> ControlResult<Invocation> {
    if route.mode == RouteMode::Dhcp {
        return Err(ControlError::Unimplemented(
            "DHCP-mode routes are not implemented".to_string(),
        ));
    }
    validate_route(route)?;

    let invocation = match platform.resolve() {
        Platform::Windows => {
            let mut args = vec![
                "interface".to_string(),
                "ipv4".to_string(),
                "add".to_string(),
                "route".to_string(),
                route.destination.clone(),
                route.mask.clone(),
            ];
            if let Some(iface) = interface_of(route) {
                args.push(iface.to_string());
            }
            args.push(route.gateway.clone());
            args.push(format!("metric={}", route.metric));
            args.push("store=persistent".to_string());
            Invocation::new("netsh", args)
        }
        _ => {
            let mut args = vec![
                "route".to_string(),
                "add".to_string(),
                cidr_of(route)?,
                "via".to_string(),
                route.gateway.clone(),
                "metric".to_string(),
                route.metric.to_string(),
            ];
            if let Some(iface) = interface_of(route) {
                args.push("dev".to_string());
                args.push(iface.to_string());
            }
            Invocation::new("ip", args)
        }
    };
    Ok(invocation)
}

/// Compile the host command that withdraws `route`. No metric on delete.
pub fn compile_route_delete(route: &RouteEntry, platform: Platform) -> ControlResult<Invocation> {
    let to_validation = |e: anyhow::Error| ControlError::validation(e.to_string());
    validate_dotted_quad("destination", &route.destination).map_err(to_validation)?;

    let invocation = match platform.resolve() {
        Platform::Windows => {
            validate_dotted_quad("subnet mask", &route.mask).map_err(to_validation)?;
            let mut args = vec![
                "interface".to_string(),
                "ipv4".to_string(),
                "delete".to_string(),
                "route".to_string(),
                route.destination.clone(),
                route.mask.clone(),
            ];
            if let Some(iface) = interface_of(route) {
                args.push(iface.to_string());
            }
            Invocation::new("netsh", args)
        }
        _ => {
            validate_dotted_quad("gateway", &route.gateway).map_err(to_validation)?;
            let mut args = vec![
                "route".to_string(),
                "del".to_string(),
                cidr_of(route)?,
                "via".to_string(),
                route.gateway.clone(),
            ];
            if let Some(iface) = interface_of(route) {
                args.push("dev".to_string());
                args.push(iface.to_string());
            }
            Invocation::new("ip", args)
        }
    };
    Ok(invocation)
}

fn cidr_of(route: &RouteEntry) -> ControlResult<String> {
    let prefix =
        mask_to_prefix(&route.mask).map_err(|e| ControlError::validation(e.to_string()))?;
    Ok(format!("{}/{}", route.destination, prefix))
}

/// Readable explanation for common `netsh` route failures.
///
/// The raw text always stays in the error; this is only logged next to it.
pub fn netsh_hint(stderr: &str) -> Option<&'static str> {
    let lower = stderr.to_lowercase();
    if lower.contains("already in use") || lower.contains("duplicate") {
        Some("address or route conflict: an identical route already exists")
    } else if lower.contains("dhcp") && lower.contains("fail") {
        Some("the DHCP server could not be reached")
    } else {
        None
    }
}

#[derive(Clone)]
pub struct RouteManager {
    executor: Arc<dyn CommandExecutor>,
    platform: Platform,
    records: Records,
}

impl RouteManager {
    pub fn new(executor: Arc<dyn CommandExecutor>, platform: Platform, records: Records) -> Self {
        Self {
            executor,
            platform: platform.resolve(),
            records,
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Install a route on the host and persist it; returns the record id.
    pub async fn add(&self, route: RouteEntry) -> ControlResult<String> {
        self.install(&route).await?;
        let id = self.records.insert_route(&route).await?;
        info!(
            "Route {}/{} via {} added (id {})",
            route.destination, route.mask, route.gateway, id
        );
        Ok(id)
    }

    /// Replace a stored route: withdraw the old host route, install the new
    /// one, persist. If the install fails after the withdrawal succeeded the
    /// stored record still describes the old route and the error is a
    /// [`ControlError::PartialUpdate`].
    pub async fn update(&self, id: &str, route: RouteEntry) -> ControlResult<()> {
        let old = self.load(id).await?;

        // reject a bad replacement before the old route is withdrawn
        compile_route_add(&route, self.platform)?;

        self.remove_host(&old).await?;
        self.install(&route)
            .await
            .map_err(|e| ControlError::PartialUpdate {
                handle: id.to_string(),
                source: Box::new(e),
            })?;

        self.records.save_route(id, &route).await?;
        info!("Route {} updated", id);
        Ok(())
    }

    /// Withdraw the host route, then delete the record. A host failure
    /// keeps the record.
    pub async fn delete(&self, id: &str) -> ControlResult<()> {
        let route = self.load(id).await?;
        self.remove_host(&route).await?;
        self.forget(id, &route).await
    }

    /// Failover withdrawal. The record is dropped even when the host delete
    /// fails (the kernel usually removed the route with its dead gateway);
    /// the host diagnostic is logged. Only a store failure is an error.
    pub async fn withdraw(&self, id: &str, route: &RouteEntry) -> ControlResult<()> {
        if let Err(e) = self.remove_host(route).await {
            warn!(
                "Host delete of route {}/{} via {} failed, dropping record anyway: {}",
                route.destination, route.mask, route.gateway, e
            );
        }
        self.forget(id, route).await
    }

    async fn forget(&self, id: &str, route: &RouteEntry) -> ControlResult<()> {
        self.records.delete_route(id).await?;
        info!(
            "Route {}/{} via {} withdrawn (id {})",
            route.destination, route.mask, route.gateway, id
        );
        Ok(())
    }

    pub async fn list(&self) -> ControlResult<Vec<(String, RouteEntry)>> {
        Ok(self.records.routes().await?)
    }

    /// Routes the watchdog should probe.
    pub async fn failover_candidates(&self) -> ControlResult<Vec<(String, RouteEntry)>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|(_, r)| r.failover && r.enabled)
            .collect())
    }

    async fn load(&self, id: &str) -> ControlResult<RouteEntry> {
        self.records
            .route(id)
            .await?
            .ok_or_else(|| ControlError::NotFound(format!("route '{}'", id)))
    }

    async fn install(&self, route: &RouteEntry) -> ControlResult<()> {
        let invocation = compile_route_add(route, self.platform)?;
        self.run(&invocation).await
    }

    async fn remove_host(&self, route: &RouteEntry) -> ControlResult<()> {
        let invocation = compile_route_delete(route, self.platform)?;
        self.run(&invocation).await
    }

    async fn run(&self, invocation: &Invocation) -> ControlResult<()> {
        match run_checked(self.executor.as_ref(), invocation).await {
            Ok(_) => Ok(()),
            Err(e) => {
                if self.platform == Platform::Windows {
                    if let Some(hint) = e.diagnostic().and_then(netsh_hint) {
                        warn!("netsh: {}", hint);
                    }
                }
                Err(e)
            }
        }
    }
}
