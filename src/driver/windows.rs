//! Windows Firewall driver (PowerShell NetSecurity cmdlets).

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use super::FirewallDriver;
use crate::cmd_abstraction::{run_sequence, CommandExecutor};
use crate::compiler::{compile_netsecurity, compile_netsecurity_remove};
use crate::error::ControlResult;
use crate::model::{FirewallRule, Platform};

pub struct WindowsDriver {
    executor: Arc<dyn CommandExecutor>,
}

impl WindowsDriver {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl FirewallDriver for WindowsDriver {
    fn platform(&self) -> Platform {
        Platform::Windows
    }

    async fn apply(&self, rule: &FirewallRule) -> ControlResult<()> {
        let plan = compile_netsecurity(rule);
        run_sequence(self.executor.as_ref(), &plan).await?;
        info!(
            "Created Windows Firewall rule '{}'{}",
            rule.rule_name,
            if rule.enabled { "" } else { " (disabled)" }
        );
        Ok(())
    }

    async fn remove(&self, rule_name: &str) -> ControlResult<()> {
        let plan = [compile_netsecurity_remove(rule_name)];
        run_sequence(self.executor.as_ref(), &plan).await?;
        info!("Removed Windows Firewall rule '{}'", rule_name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd_abstraction::{CommandOutput, RecordingExecutor};
    use crate::model::{Action, Direction};

    #[tokio::test]
    async fn test_disabled_rule_runs_create_then_disable() {
        let exec = Arc::new(RecordingExecutor::new());
        let driver = WindowsDriver::new(exec.clone());
        let mut rule = FirewallRule::new("staged", Direction::Out, Action::Deny);
        rule.enabled = false;

        driver.apply(&rule).await.unwrap();

        let calls = exec.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].args[2].starts_with("New-NetFirewallRule -Name 'staged'"));
        assert_eq!(calls[1].args[2], "Disable-NetFirewallRule -Name 'staged'");
    }

    #[tokio::test]
    async fn test_create_failure_skips_disable() {
        let exec = Arc::new(RecordingExecutor::with_responses([CommandOutput::failed(
            1,
            "New-NetFirewallRule : Cannot create a file when that file already exists.",
        )]));
        let driver = WindowsDriver::new(exec.clone());
        let mut rule = FirewallRule::new("dup", Direction::In, Action::Allow);
        rule.enabled = false;

        let err = driver.apply(&rule).await.unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert_eq!(exec.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_failure_surfaced() {
        let exec = Arc::new(RecordingExecutor::with_responses([CommandOutput::failed(
            1,
            "No MSFT_NetFirewallRule objects found with property 'Name' equal to 'gone'.",
        )]));
        let driver = WindowsDriver::new(exec);
        assert!(driver.remove("gone").await.is_err());
    }
}
