use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, error, info};

use super::window_start;
use crate::alerts::{AlertRaiser, AlertTypes};
use crate::signal::ShutdownToken;
use crate::store::Records;

/// Periodic count of INFO events mentioning DENY or DROP.
pub struct DenyAggregator {
    records: Records,
    raiser: AlertRaiser,
    threshold: usize,
    window_secs: u64,
    interval: Duration,
}

impl DenyAggregator {
    pub fn new(
        records: Records,
        raiser: AlertRaiser,
        threshold: usize,
        window_secs: u64,
        interval: Duration,
    ) -> Self {
        Self {
            records,
            raiser,
            threshold,
            window_secs,
            interval,
        }
    }

    /// One aggregation pass; returns the count when an alert was raised.
    pub async fn evaluate(&self, now: DateTime<Utc>) -> Result<Option<usize>> {
        let count = self
            .records
            .count_deny_events_since(window_start(now, self.window_secs))
            .await
            .context("Failed to count deny events")?;
        debug!("{} deny events in the last {}s", count, self.window_secs);

        if count > self.threshold {
            self.raiser
                .raise(AlertTypes::deny_surge(count, self.window_secs))
                .await?;
            return Ok(Some(count));
        }
        Ok(None)
    }

    pub async fn run(self, shutdown: ShutdownToken) {
        info!("Deny-event aggregator started (every {:?})", self.interval);
        loop {
            if let Err(e) = self.evaluate(Utc::now()).await {
                error!("Deny-event aggregator: {:#}", e);
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        info!("Deny-event aggregator stopped");
    }
}
