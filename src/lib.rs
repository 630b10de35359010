//! # netwarden - Network Control Plane
//!
//! Administers a host's network policy through the platform's own tools:
//! firewall rules, static routes with gateway failover, connection sharing,
//! and alerting on dropped-packet bursts.
//!
//! ## Features
//!
//! - **Rule Compiler** - One abstract rule model compiled to iptables or PowerShell NetSecurity
//! - **Time Windows** - Schedules and weekday sets via the iptables `time` match
//! - **Route Failover** - Gateways are pinged and dead routes withdrawn
//! - **Connection Sharing** - Windows ICS with a service-level fallback
//! - **Drop-Log Alerting** - Burst detection on the kernel log and on the audit trail
//! - **Alerting** - Gotify and webhook notifications
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        netwarden                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap)                                                 │
//! │    └── Commands: rule, group, route, nat, daemon...         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Config (serde_yaml)          Store (JSON, fs2 lock)        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Compiler                                                   │
//! │    ├── iptables (LOG before DROP, time match)               │
//! │    └── NetSecurity (New/Disable/Remove-NetFirewallRule)     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Drivers (FirewallDriver trait)                             │
//! │    ├── LinuxDriver                                          │
//! │    └── WindowsDriver                                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Routes (ip route / netsh)    NAT (ICS, SharedAccess)       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Daemon                                                     │
//! │    ├── Failover watchdog (ping)                             │
//! │    ├── Drop-log tailer                                      │
//! │    └── Deny-event aggregator                                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Alerts (gotify, webhook)                                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use netwarden::config::Config;
//! use netwarden::context::ControlContext;
//! use netwarden::driver::check_root;
//! use netwarden::model::{Action, Direction, FirewallRule};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     check_root()?;
//!
//!     let config = Config::load("/etc/netwarden/config.yaml")?;
//!     let ctx = ControlContext::open(config)?;
//!
//!     let mut rule = FirewallRule::new("block-smb", Direction::In, Action::Deny);
//!     rule.port = Some("445".to_string());
//!     ctx.rules().create(rule).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`alerts`] - Alert records and destinations (Gotify, Webhook)
//! - [`cli`] - Command-line interface definitions
//! - [`cmd_abstraction`] - External command execution seam
//! - [`commands`] - CLI command implementations
//! - [`compiler`] - Abstract rule to host command plans
//! - [`config`] - Configuration parsing and validation
//! - [`context`] - Explicit wiring of services
//! - [`daemon`] - Background task supervisor
//! - [`driver`] - Firewall driver abstraction (Linux, Windows)
//! - [`error`] - Error taxonomy
//! - [`lock`] - File locking for single-daemon execution
//! - [`model`] - Managed records
//! - [`monitor`] - Drop-log tailer and deny-event aggregator
//! - [`nat`] - Connection sharing configurator
//! - [`routes`] - Static route manager
//! - [`rules`] - Rule and group administration
//! - [`signal`] - Graceful shutdown handling
//! - [`store`] - Record store (memory and JSON file)
//! - [`validation`] - Input validation helpers
//! - [`watchdog`] - Gateway failover watchdog

pub mod alerts;
pub mod cli;
pub mod cmd_abstraction;
pub mod commands;
pub mod compiler;
pub mod config;
pub mod context;
pub mod daemon;
pub mod driver;
pub mod error;
pub mod lock;
pub mod model;
pub mod monitor;
pub mod nat;
pub mod routes;
pub mod rules;
pub mod signal;
pub mod store;
pub mod validation;
pub mod watchdog;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use context::ControlContext;
pub use error::{ControlError, ControlResult, StoreError};
