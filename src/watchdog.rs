//! Failover watchdog: probes gateways of failover routes and withdraws the
//! routes whose gateway stops answering.
//!
//! A single failed probe is enough to withdraw a route; there is no retry
//! or debounce.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::cmd_abstraction::{CommandExecutor, Invocation};
use crate::model::Platform;
use crate::routes::RouteManager;
use crate::signal::ShutdownToken;

/// Reachability probe for a gateway address.
#[async_trait]
pub trait GatewayProber: Send + Sync {
    async fn is_reachable(&self, gateway: &str) -> bool;
}

/// One ICMP echo via the system `ping`.
pub struct PingProber {
    executor: Arc<dyn CommandExecutor>,
    platform: Platform,
    timeout_secs: u64,
}

impl PingProber {
    pub fn new(executor: Arc<dyn CommandExecutor>, platform: Platform, timeout_secs: u64) -> Self {
        Self {
            executor,
            platform: platform.resolve(),
            timeout_secs,
        }
    }

    pub fn invocation(&self, gateway: &str) -> Invocation {
        match self.platform {
            // Windows ping takes milliseconds
            Platform::Windows => Invocation::new(
                "ping",
                [
                    "-n".to_string(),
                    "1".to_string(),
                    "-w".to_string(),
                    (self.timeout_secs * 1000).to_string(),
                    gateway.to_string(),
                ],
            ),
            _ => Invocation::new(
                "ping",
                [
                    "-c".to_string(),
                    "1".to_string(),
                    "-W".to_string(),
                    self.timeout_secs.to_string(),
                    gateway.to_string(),
                ],
            ),
        }
    }
}

#[async_trait]
impl GatewayProber for PingProber {
    async fn is_reachable(&self, gateway: &str) -> bool {
        let inv = self.invocation(gateway);
        match self.executor.execute(&inv.program, &inv.args).await {
            Ok(output) => output.success,
            Err(e) => {
                // a missing ping binary counts as unreachable
                warn!("Probe of {} could not run: {}", gateway, e);
                false
            }
        }
    }
}

pub struct FailoverWatchdog {
    routes: RouteManager,
    prober: Arc<dyn GatewayProber>,
    interval: Duration,
}

impl FailoverWatchdog {
    pub fn new(routes: RouteManager, prober: Arc<dyn GatewayProber>, interval: Duration) -> Self {
        Self {
            routes,
            prober,
            interval,
        }
    }

    /// Probe every failover route once; returns the ids withdrawn.
    ///
    /// A dead gateway's record is always dropped; only a store failure keeps
    /// it for the next tick.
    pub async fn tick(&self) -> Vec<String> {
        let candidates = match self.routes.failover_candidates().await {
            Ok(c) => c,
            Err(e) => {
                error!("Failover watchdog could not list routes: {}", e);
                return Vec::new();
            }
        };

        let mut withdrawn = Vec::new();
        for (id, route) in candidates {
            if route.gateway.is_empty() {
                continue;
            }
            if self.prober.is_reachable(&route.gateway).await {
                debug!("Gateway {} reachable", route.gateway);
                continue;
            }

            match self.routes.withdraw(&id, &route).await {
                Ok(()) => {
                    info!(
                        "[failover] Gateway {} unreachable, route {} withdrawn",
                        route.gateway, id
                    );
                    withdrawn.push(id);
                }
                Err(e) => error!("[failover] Withdrawing route {} failed: {}", id, e),
            }
        }
        withdrawn
    }

    /// Tick every interval until the token is cancelled.
    pub async fn run(self, shutdown: ShutdownToken) {
        info!("Failover watchdog started (interval {:?})", self.interval);
        loop {
            self.tick().await;
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        info!("Failover watchdog stopped");
    }
}
