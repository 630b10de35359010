//! Rule compiler: abstract [`FirewallRule`] to ordered host command plans.
//!
//! Compilation is pure. A plan is executed front to back by a driver and the
//! order inside a plan is part of its meaning (LOG before DROP on Linux,
//! create before disable on Windows).

mod iptables;
mod netsecurity;

pub use iptables::{build_time_params, compile_iptables, DAY_CODES};
pub use netsecurity::{compile_netsecurity, compile_netsecurity_remove, ps_quote};

use crate::cmd_abstraction::Invocation;
use crate::error::{ControlError, ControlResult};
use crate::model::{FirewallRule, Platform};

/// Prefix attached to LOG rules; the log tailer keys on [`DROP_MARKER`].
pub const LOG_PREFIX: &str = "FWDROP: ";

/// Token identifying a blocked-packet line in the kernel log.
pub const DROP_MARKER: &str = "FWDROP:";

/// Compile a rule into the exact command sequence for `platform`.
///
/// `Platform::Auto` is resolved against the build target first.
pub fn compile_rule(rule: &FirewallRule, platform: Platform) -> Vec<Invocation> {
    match platform.resolve() {
        Platform::Windows => compile_netsecurity(rule),
        _ => compile_iptables(rule),
    }
}

/// Compile removal of a rule by its handle.
///
/// Linux removal by comment match is not implemented and reports
/// [`ControlError::NotSupported`] instead of silently doing nothing.
pub fn compile_remove(rule_name: &str, platform: Platform) -> ControlResult<Vec<Invocation>> {
    match platform.resolve() {
        Platform::Windows => Ok(vec![compile_netsecurity_remove(rule_name)]),
        _ => Err(ControlError::NotSupported(format!(
            "removing iptables rule '{}' by name is not implemented",
            rule_name
        ))),
    }
}
