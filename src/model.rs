//! Records managed by the control plane.

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{ControlError, ControlResult};
use crate::validation::{validate_ip_or_cidr, validate_port_spec};

/// Host platform a rule or route is compiled for.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Detect once at startup
    #[default]
    Auto,
    /// iptables / iproute2
    Linux,
    /// PowerShell NetSecurity / netsh
    Windows,
}

impl Platform {
    /// Resolve `Auto` against the platform this binary was built for.
    pub fn resolve(self) -> Platform {
        match self {
            Platform::Auto if cfg!(windows) => Platform::Windows,
            Platform::Auto => Platform::Linux,
            other => other,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::Auto => "auto",
            Platform::Linux => "linux",
            Platform::Windows => "windows",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Platform::Auto),
            "linux" => Ok(Platform::Linux),
            "windows" => Ok(Platform::Windows),
            _ => Err(format!("Invalid platform: {}. Valid values: auto, linux, windows", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    #[default]
    In,
    Out,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    #[default]
    Allow,
    Deny,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Allow => "ALLOW",
            Action::Deny => "DENY",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
    Any,
}

/// Abstract, platform-independent firewall rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FirewallRule {
    /// OS-level rule identifier; unique across rules
    pub rule_name: String,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub action: Action,
    #[serde(default)]
    pub protocol: Protocol,
    /// Single port ("443") or range ("8000-8080")
    #[serde(default)]
    pub port: Option<String>,
    /// First element is authoritative where only one source can be applied
    #[serde(default)]
    pub source_ips: Vec<String>,
    #[serde(default)]
    pub schedule_start: Option<String>,
    #[serde(default)]
    pub schedule_end: Option<String>,
    /// Monday = 0; out-of-range values are dropped at compile time
    #[serde(default)]
    pub days_of_week: BTreeSet<u8>,
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Weak back-reference to a rule group
    #[serde(default)]
    pub group_id: Option<String>,
}

fn default_profile() -> String {
    "any".to_string()
}

fn default_true() -> bool {
    true
}

impl FirewallRule {
    pub fn new(rule_name: impl Into<String>, direction: Direction, action: Action) -> Self {
        Self {
            rule_name: rule_name.into(),
            direction,
            action,
            protocol: Protocol::Tcp,
            port: None,
            source_ips: Vec::new(),
            schedule_start: None,
            schedule_end: None,
            days_of_week: BTreeSet::new(),
            profile: default_profile(),
            description: String::new(),
            enabled: true,
            group_id: None,
        }
    }

    /// Both schedule bounds, or `None` if either is missing.
    pub fn schedule(&self) -> Option<(&str, &str)> {
        match (self.schedule_start.as_deref(), self.schedule_end.as_deref()) {
            (Some(start), Some(end)) if !start.is_empty() && !end.is_empty() => Some((start, end)),
            _ => None,
        }
    }

    /// Administrative validation, run before any host mutation.
    pub fn validate(&self) -> ControlResult<()> {
        let name = self.rule_name.trim();
        if name.is_empty() {
            return Err(ControlError::validation("rule_name must not be empty"));
        }
        if name.contains(['\'', '"', '\n', '\r']) {
            return Err(ControlError::validation(format!(
                "rule_name '{}' contains quote or newline characters",
                self.rule_name
            )));
        }

        let has_start = self.schedule_start.as_deref().is_some_and(|s| !s.is_empty());
        let has_end = self.schedule_end.as_deref().is_some_and(|s| !s.is_empty());
        if has_start != has_end {
            return Err(ControlError::validation(
                "schedule_start and schedule_end must be set together",
            ));
        }

        if let Some(port) = &self.port {
            validate_port_spec(port).map_err(|e| ControlError::validation(e.to_string()))?;
        }

        for ip in &self.source_ips {
            validate_ip_or_cidr(ip).map_err(|e| ControlError::validation(e.to_string()))?;
        }

        Ok(())
    }
}

/// How a route's next hop is obtained.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RouteMode {
    #[default]
    Static,
    Dhcp,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouteEntry {
    pub destination: String,
    pub mask: String,
    pub gateway: String,
    #[serde(default = "default_metric")]
    pub metric: u32,
    #[serde(default)]
    pub interface_name: Option<String>,
    #[serde(default)]
    pub mode: RouteMode,
    #[serde(default)]
    pub failover: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_metric() -> u32 {
    1
}

/// Connection sharing singleton.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NatConfig {
    pub enabled: bool,
    #[serde(default)]
    pub wan: String,
    #[serde(default)]
    pub lan: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockedPacketRecord {
    pub timestamp: DateTime<Utc>,
    pub raw_log_line: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertLevel {
    #[default]
    Info,
    Warning,
    Error,
    Alert,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Info => "INFO",
            AlertLevel::Warning => "WARNING",
            AlertLevel::Error => "ERROR",
            AlertLevel::Alert => "ALERT",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AlertRecord {
    pub timestamp: DateTime<Utc>,
    pub level: AlertLevel,
    pub message: String,
}

/// Generic audit/event record (the aggregator's input).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventRecord {
    pub timestamp: DateTime<Utc>,
    pub level: AlertLevel,
    pub message: String,
    #[serde(default)]
    pub source_ip: Option<String>,
}

impl EventRecord {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level: AlertLevel::Info,
            message: message.into(),
            source_ip: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleGroup {
    pub group_name: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
}
