//! CLI argument parsing with clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_PATH;
use crate::model::{Action, Direction, Platform, Protocol, RouteMode};

#[derive(Parser)]
#[command(name = "netwarden")]
#[command(author, version, about = "Firewall, route failover, NAT and drop-log alerting control plane")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    pub config: PathBuf,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug output)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage firewall rules
    Rule {
        #[command(subcommand)]
        action: RuleAction,
    },

    /// Manage rule groups
    Group {
        #[command(subcommand)]
        action: GroupAction,
    },

    /// Manage static routes
    Route {
        #[command(subcommand)]
        action: RouteAction,
    },

    /// Manage connection sharing (Windows ICS)
    Nat {
        #[command(subcommand)]
        action: NatAction,
    },

    /// Show recent alerts
    Alerts {
        /// Number of alerts to show
        #[arg(long, short, default_value = "20")]
        limit: usize,
    },

    /// Show recently blocked packets
    Blocked {
        /// Number of log lines to show
        #[arg(long, short, default_value = "20")]
        limit: usize,
    },

    /// Configuration file helpers
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run the failover watchdog and log monitors until interrupted
    Daemon,

    /// Show version
    Version,
}

/// Rule fields shared by add, update and compile.
#[derive(Args, Debug, Clone)]
pub struct RuleArgs {
    /// Unique rule name (OS-level handle)
    pub name: String,

    #[arg(long, value_enum, default_value = "in")]
    pub direction: Direction,

    #[arg(long, value_enum, default_value = "allow")]
    pub action: Action,

    #[arg(long, value_enum, default_value = "tcp")]
    pub protocol: Protocol,

    /// Port or range (e.g. 443, 8000-8080)
    #[arg(long)]
    pub port: Option<String>,

    /// Source IP or CIDR (repeatable; iptables uses the first)
    #[arg(long = "source")]
    pub sources: Vec<String>,

    /// Schedule start time (HH:MM)
    #[arg(long)]
    pub start: Option<String>,

    /// Schedule end time (HH:MM)
    #[arg(long)]
    pub end: Option<String>,

    /// Days of week, Monday=0 (e.g. 0,1,2,3,4)
    #[arg(long, value_delimiter = ',')]
    pub days: Vec<u8>,

    /// Windows Firewall profile (any, domain, private, public)
    #[arg(long, default_value = "any")]
    pub profile: String,

    #[arg(long, default_value = "")]
    pub description: String,

    /// Create the rule disabled
    #[arg(long)]
    pub disabled: bool,

    /// Rule group id
    #[arg(long)]
    pub group: Option<String>,
}

#[derive(Subcommand)]
pub enum RuleAction {
    /// Create and apply a rule
    Add {
        #[command(flatten)]
        rule: RuleArgs,

        /// Print the host commands instead of running them
        #[arg(long)]
        dry_run: bool,
    },
    /// Replace an existing rule (remove, then apply the new definition)
    Update {
        /// Name of the rule to replace
        existing: String,

        #[command(flatten)]
        rule: RuleArgs,
    },
    /// Remove a rule from the host, then from the store
    Delete {
        name: String,
    },
    /// List stored rules
    List {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Print the command plan for a rule without running it
    Compile {
        #[command(flatten)]
        rule: RuleArgs,

        /// Target platform (defaults to the configured one)
        #[arg(long)]
        platform: Option<Platform>,
    },
}

#[derive(Subcommand)]
pub enum GroupAction {
    /// Create a rule group
    Create {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Delete a group (member rules are kept)
    Delete { id: String },
    /// List groups
    List,
    /// List the rules of a group
    Rules { id: String },
    /// Enable every rule in a group
    Enable { id: String },
    /// Disable every rule in a group
    Disable { id: String },
}

#[derive(Args, Debug, Clone)]
pub struct RouteArgs {
    /// Destination network (dotted quad)
    pub destination: String,

    /// Subnet mask (dotted quad)
    pub mask: String,

    /// Next hop (dotted quad)
    pub gateway: String,

    #[arg(long, default_value = "1")]
    pub metric: u32,

    /// Bind the route to an interface
    #[arg(long)]
    pub interface: Option<String>,

    #[arg(long, value_enum, default_value = "static")]
    pub mode: RouteMode,

    /// Withdraw the route when the gateway stops answering
    #[arg(long)]
    pub failover: bool,

    /// Store the route disabled (not probed by the watchdog)
    #[arg(long)]
    pub disabled: bool,
}

#[derive(Subcommand)]
pub enum RouteAction {
    /// Install and store a route
    Add {
        #[command(flatten)]
        route: RouteArgs,

        /// Print the host command instead of running it
        #[arg(long)]
        dry_run: bool,
    },
    /// Replace a stored route
    Update {
        id: String,
        #[command(flatten)]
        route: RouteArgs,
    },
    /// Withdraw a route from the host, then from the store
    Delete { id: String },
    /// List stored routes
    List {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum NatAction {
    /// Show the stored sharing configuration
    Show,
    /// Store and apply a sharing configuration
    Set {
        /// Share WAN to LAN (omit to disable sharing)
        #[arg(long)]
        enable: bool,
        /// Interface with internet access
        #[arg(long, default_value = "")]
        wan: String,
        /// Interface receiving the shared connection
        #[arg(long, default_value = "")]
        lan: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
}
