//! Alert delivery (Gotify, webhook).
//!
//! Alerts are always written to the `alerts` collection first; delivery to
//! external destinations is best effort and never fails the caller.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::config::AlertsConfig;
use crate::model::{AlertLevel, AlertRecord};
use crate::store::Records;

/// Timeout for alert HTTP requests
const TIMEOUT_SECS: u64 = 30;

fn gotify_priority(level: AlertLevel) -> u8 {
    match level {
        AlertLevel::Info => 2,
        AlertLevel::Warning => 5,
        AlertLevel::Error => 8,
        AlertLevel::Alert => 10,
    }
}

/// Destination for alerts once they are stored.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, alert: &AlertRecord);
}

/// Sink that drops everything; used when no destination is configured.
pub struct NullSink;

#[async_trait]
impl AlertSink for NullSink {
    async fn send(&self, _alert: &AlertRecord) {}
}

/// Alert manager
pub struct AlertManager {
    config: AlertsConfig,
    client: Client,
}

impl AlertManager {
    pub fn new(config: AlertsConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client for alerts")?;

        Ok(Self { config, client })
    }

    pub fn has_destinations(&self) -> bool {
        self.config.gotify.enabled || self.config.webhook.enabled
    }

    async fn send_gotify(&self, alert: &AlertRecord) -> Result<()> {
        let url = format!("{}/message", self.config.gotify.url.trim_end_matches('/'));

        #[derive(Serialize)]
        struct GotifyMessage<'a> {
            title: String,
            message: &'a str,
            priority: u8,
        }

        let payload = GotifyMessage {
            title: format!("netwarden {}", alert.level),
            message: &alert.message,
            priority: gotify_priority(alert.level),
        };

        // SecureString is zeroed on drop
        let token = self.config.gotify.get_token();

        let response = self
            .client
            .post(&url)
            .header("X-Gotify-Key", token.as_str())
            .json(&payload)
            .send()
            .await
            .context("Failed to send Gotify alert")?;

        if !response.status().is_success() {
            let status = response.status();
            // response body may echo the token
            error!("Gotify alert failed with status: {}", status);
            anyhow::bail!("Gotify returned {}", status);
        }

        debug!("Gotify alert sent successfully");
        Ok(())
    }

    async fn send_webhook(&self, alert: &AlertRecord) -> Result<()> {
        let payload = WebhookPayload::from(alert);

        let mut request = self.client.post(&self.config.webhook.url).json(&payload);

        // headers were validated during config deserialization
        for (key, value) in &self.config.webhook.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request.send().await.context("Failed to send webhook")?;

        if !response.status().is_success() {
            let status = response.status();
            warn!("Webhook returned non-success status: {}", status);
            anyhow::bail!("Webhook returned {}", status);
        }

        debug!("Webhook alert sent successfully");
        Ok(())
    }
}

#[async_trait]
impl AlertSink for AlertManager {
    /// Send an alert to all configured destinations
    async fn send(&self, alert: &AlertRecord) {
        let mut success_count = 0;
        let mut destinations = Vec::new();

        if self.config.gotify.enabled {
            destinations.push("Gotify");
            match self.send_gotify(alert).await {
                Ok(()) => success_count += 1,
                Err(e) => warn!("Gotify delivery failed: {:#}", e),
            }
        }

        if self.config.webhook.enabled {
            destinations.push("Webhook");
            match self.send_webhook(alert).await {
                Ok(()) => success_count += 1,
                Err(e) => warn!("Webhook delivery failed: {:#}", e),
            }
        }

        if !destinations.is_empty() {
            debug!(
                "Alert sent to {}/{} destinations: {}",
                success_count,
                destinations.len(),
                destinations.join(", ")
            );
        }
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    level: &'static str,
    message: &'a str,
    timestamp: String,
    source: &'static str,
}

impl<'a> From<&'a AlertRecord> for WebhookPayload<'a> {
    fn from(alert: &'a AlertRecord) -> Self {
        Self {
            level: alert.level.as_str(),
            message: &alert.message,
            timestamp: alert.timestamp.to_rfc3339(),
            source: "netwarden",
        }
    }
}

/// Stores an alert then forwards it to the sink on a spawned task, so a
/// slow destination never holds up the caller.
#[derive(Clone)]
pub struct AlertRaiser {
    records: Records,
    sink: std::sync::Arc<dyn AlertSink>,
}

impl AlertRaiser {
    pub fn new(records: Records, sink: std::sync::Arc<dyn AlertSink>) -> Self {
        Self { records, sink }
    }

    /// Returns the delivery task's handle.
    pub async fn raise(&self, alert: AlertRecord) -> Result<JoinHandle<()>> {
        self.records
            .append_alert(&alert)
            .await
            .context("Failed to store alert")?;
        warn!("[{}] {}", alert.level, alert.message);

        let sink = self.sink.clone();
        Ok(tokio::spawn(async move { sink.send(&alert).await }))
    }
}

/// Alert texts raised by the monitor loops
pub struct AlertTypes;

impl AlertTypes {
    pub fn blocked_burst(count: usize, window_secs: u64) -> AlertRecord {
        AlertRecord {
            timestamp: chrono::Utc::now(),
            level: AlertLevel::Alert,
            message: format!(
                "Possible attack: {} blocked packets in the last {} minutes",
                count,
                window_secs / 60
            ),
        }
    }

    pub fn deny_surge(count: usize, window_secs: u64) -> AlertRecord {
        AlertRecord {
            timestamp: chrono::Utc::now(),
            level: AlertLevel::Alert,
            message: format!(
                "Too many DENY/DROP events in the last {} minutes: {}",
                window_secs / 60,
                count
            ),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::CapturingSink;
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    #[test]
    fn test_gotify_priority() {
        assert_eq!(gotify_priority(AlertLevel::Info), 2);
        assert_eq!(gotify_priority(AlertLevel::Warning), 5);
        assert_eq!(gotify_priority(AlertLevel::Error), 8);
        assert_eq!(gotify_priority(AlertLevel::Alert), 10);
    }

    #[test]
    fn test_alert_types() {
        let burst = AlertTypes::blocked_burst(51, 300);
        assert_eq!(burst.level, AlertLevel::Alert);
        assert!(burst.message.contains("51"));
        assert!(burst.message.contains("5 minutes"));

        let surge = AlertTypes::deny_surge(101, 600);
        assert!(surge.message.contains("101"));
        assert!(surge.message.contains("10 minutes"));
    }

    #[test]
    fn test_webhook_payload() {
        let alert = AlertTypes::blocked_burst(60, 300);
        let json = serde_json::to_value(WebhookPayload::from(&alert)).unwrap();
        assert_eq!(json["level"], "ALERT");
        assert_eq!(json["source"], "netwarden");
        assert!(json["message"].as_str().unwrap().contains("60"));
    }

    #[test]
    fn test_manager_without_destinations() {
        let manager = AlertManager::new(AlertsConfig::default()).unwrap();
        assert!(!manager.has_destinations());
    }

    #[tokio::test]
    async fn test_raise_stores_then_forwards() {
        let records = Records::new(Arc::new(MemoryStore::new()));
        let sink = Arc::new(CapturingSink::default());
        let raiser = AlertRaiser::new(records.clone(), sink.clone());

        let delivery = raiser.raise(AlertTypes::deny_surge(150, 600)).await.unwrap();
        delivery.await.unwrap();

        assert_eq!(records.recent_alerts(10).await.unwrap().len(), 1);
        assert_eq!(sink.sent.lock().unwrap().len(), 1);
    }
}
