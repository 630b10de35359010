//! Explicit wiring of the control plane.
//!
//! A [`ControlContext`] owns the collaborators every component needs (record
//! store, command executor, resolved platform, configuration) and hands
//! them to each service at construction time.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::alerts::{AlertManager, AlertRaiser, AlertSink, NullSink};
use crate::cmd_abstraction::{CommandExecutor, RealCommandExecutor};
use crate::config::Config;
use crate::driver::{create_driver, FirewallDriver};
use crate::model::Platform;
use crate::monitor::{DenyAggregator, DropLogMonitor};
use crate::nat::NatConfigurator;
use crate::routes::RouteManager;
use crate::rules::RuleService;
use crate::store::{JsonFileStore, RecordStore, Records};
use crate::watchdog::{FailoverWatchdog, PingProber};

#[derive(Clone)]
pub struct ControlContext {
    pub config: Config,
    pub platform: Platform,
    pub records: Records,
    pub executor: Arc<dyn CommandExecutor>,
    driver: Arc<dyn FirewallDriver>,
}

impl ControlContext {
    /// Build a context from explicit collaborators. The platform is resolved
    /// here, once.
    pub fn new(config: Config, store: Arc<dyn RecordStore>, executor: Arc<dyn CommandExecutor>) -> Self {
        let platform = config.platform.resolve();
        let driver: Arc<dyn FirewallDriver> = Arc::from(create_driver(platform, executor.clone()));
        Self {
            config,
            platform,
            records: Records::new(store),
            executor,
            driver,
        }
    }

    /// Production wiring: JSON file store and real process execution.
    pub fn open(config: Config) -> Result<Self> {
        let store = JsonFileStore::open(&config.store_path)
            .with_context(|| format!("Failed to open record store {:?}", config.store_path))?;
        Ok(Self::new(config, Arc::new(store), Arc::new(RealCommandExecutor::new())))
    }

    pub fn driver(&self) -> Arc<dyn FirewallDriver> {
        self.driver.clone()
    }

    pub fn rules(&self) -> RuleService {
        RuleService::new(self.driver.clone(), self.records.clone())
    }

    pub fn routes(&self) -> RouteManager {
        RouteManager::new(self.executor.clone(), self.platform, self.records.clone())
    }

    pub fn nat(&self) -> NatConfigurator {
        NatConfigurator::new(self.executor.clone(), self.platform, self.records.clone())
    }

    pub fn watchdog(&self) -> FailoverWatchdog {
        let cfg = &self.config.watchdog;
        let prober = PingProber::new(self.executor.clone(), self.platform, cfg.probe_timeout_secs);
        FailoverWatchdog::new(self.routes(), Arc::new(prober), cfg.interval())
    }

    /// Alert raiser forwarding to the configured destinations.
    pub fn alert_raiser(&self) -> Result<AlertRaiser> {
        let manager = AlertManager::new(self.config.alerts.clone())?;
        let sink: Arc<dyn AlertSink> = if manager.has_destinations() {
            Arc::new(manager)
        } else {
            Arc::new(NullSink)
        };
        Ok(AlertRaiser::new(self.records.clone(), sink))
    }

    pub fn drop_monitor(&self, raiser: AlertRaiser) -> DropLogMonitor {
        let cfg = &self.config.monitor;
        DropLogMonitor::new(
            self.records.clone(),
            raiser,
            cfg.blocked_threshold,
            cfg.blocked_window_secs,
            Duration::from_millis(cfg.tail_backoff_ms),
        )
    }

    pub fn deny_aggregator(&self, raiser: AlertRaiser) -> DenyAggregator {
        let cfg = &self.config.monitor;
        DenyAggregator::new(
            self.records.clone(),
            raiser,
            cfg.deny_threshold,
            cfg.deny_window_secs,
            Duration::from_secs(cfg.aggregate_interval_secs),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd_abstraction::RecordingExecutor;
    use crate::store::MemoryStore;

    #[test]
    fn test_platform_resolved_once() {
        let mut config = Config::default();
        config.platform = Platform::Windows;
        let ctx = ControlContext::new(config, Arc::new(MemoryStore::new()), Arc::new(RecordingExecutor::new()));
        assert_eq!(ctx.platform, Platform::Windows);
        assert_eq!(ctx.driver().platform(), Platform::Windows);
        assert_eq!(ctx.routes().platform(), Platform::Windows);
    }

    #[test]
    fn test_auto_platform_never_leaks() {
        let ctx = ControlContext::new(
            Config::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(RecordingExecutor::new()),
        );
        assert_ne!(ctx.platform, Platform::Auto);
    }

    #[test]
    fn test_open_creates_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.store_path = dir.path().join("store.json");
        assert!(ControlContext::open(config).is_ok());
    }
}
