//! Firewall drivers (iptables, Windows Firewall).
//!
//! The driver is chosen once at startup by [`create_driver`]; everything
//! above it talks to `dyn FirewallDriver`.

mod linux;
mod windows;

use async_trait::async_trait;
use std::sync::Arc;

pub use linux::LinuxDriver;
pub use windows::WindowsDriver;

use crate::cmd_abstraction::CommandExecutor;
use crate::error::{ControlError, ControlResult};
use crate::model::{FirewallRule, Platform};

/// Capability set every host backend provides.
#[async_trait]
pub trait FirewallDriver: Send + Sync {
    fn platform(&self) -> Platform;

    /// Compile and apply a rule; commands run strictly in plan order and the
    /// first failure aborts the rest.
    async fn apply(&self, rule: &FirewallRule) -> ControlResult<()>;

    /// Remove host state for a rule by its handle.
    async fn remove(&self, rule_name: &str) -> ControlResult<()>;

    /// Remove `old`, then apply `new`. Not transactional: if the removal
    /// succeeded and the apply failed, the error is a
    /// [`ControlError::PartialUpdate`] and the host no longer enforces `old`.
    async fn replace(&self, old: &FirewallRule, new: &FirewallRule) -> ControlResult<()> {
        self.remove(&old.rule_name).await?;
        self.apply(new)
            .await
            .map_err(|e| ControlError::PartialUpdate {
                handle: old.rule_name.clone(),
                source: Box::new(e),
            })
    }
}

/// Create the driver for a platform (`Auto` resolves to the build target).
pub fn create_driver(
    platform: Platform,
    executor: Arc<dyn CommandExecutor>,
) -> Box<dyn FirewallDriver> {
    match platform.resolve() {
        Platform::Windows => Box::new(WindowsDriver::new(executor)),
        _ => Box::new(LinuxDriver::new(executor)),
    }
}

/// Check if running as root (effective UID == 0).
///
/// Host mutations need CAP_NET_ADMIN; UID 0 covers the sudo/systemd case.
#[cfg(unix)]
pub fn check_root() -> anyhow::Result<()> {
    // SAFETY: geteuid() has no preconditions, never fails and does not
    // modify any state.
    let euid = unsafe { libc::geteuid() };

    if euid != 0 {
        anyhow::bail!(
            "This operation requires root privileges. Please run with sudo.\n\
             Alternatively, ensure the process has CAP_NET_ADMIN and CAP_NET_RAW capabilities."
        )
    }
    Ok(())
}

/// Elevation on Windows is enforced by the NetSecurity cmdlets themselves.
#[cfg(not(unix))]
pub fn check_root() -> anyhow::Result<()> {
    Ok(())
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// In-memory driver recording applied rules.
    pub struct MockDriver {
        pub applied: Mutex<Vec<FirewallRule>>,
        pub removed: Mutex<Vec<String>>,
        pub fail_apply: Mutex<Option<String>>,
        pub fail_remove: Mutex<Option<String>>,
    }

    impl MockDriver {
        pub fn new() -> Self {
            Self {
                applied: Mutex::new(Vec::new()),
                removed: Mutex::new(Vec::new()),
                fail_apply: Mutex::new(None),
                fail_remove: Mutex::new(None),
            }
        }

        pub fn fail_next_apply(&self, stderr: &str) {
            *self.fail_apply.lock().unwrap() = Some(stderr.to_string());
        }

        pub fn fail_next_remove(&self, stderr: &str) {
            *self.fail_remove.lock().unwrap() = Some(stderr.to_string());
        }

        pub fn applied_names(&self) -> Vec<String> {
            self.applied
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.rule_name.clone())
                .collect()
        }
    }

    #[async_trait]
    impl FirewallDriver for MockDriver {
        fn platform(&self) -> Platform {
            Platform::Windows
        }

        async fn apply(&self, rule: &FirewallRule) -> ControlResult<()> {
            if let Some(stderr) = self.fail_apply.lock().unwrap().take() {
                return Err(ControlError::CommandExecution {
                    program: "mock".to_string(),
                    stderr,
                    code: Some(1),
                });
            }
            self.applied.lock().unwrap().push(rule.clone());
            Ok(())
        }

        async fn remove(&self, rule_name: &str) -> ControlResult<()> {
            if let Some(stderr) = self.fail_remove.lock().unwrap().take() {
                return Err(ControlError::CommandExecution {
                    program: "mock".to_string(),
                    stderr,
                    code: Some(1),
                });
            }
            self.removed.lock().unwrap().push(rule_name.to_string());
            self.applied
                .lock()
                .unwrap()
                .retain(|r| r.rule_name != rule_name);
            Ok(())
        }
    }
}
