//! iptables driver.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::FirewallDriver;
use crate::cmd_abstraction::{run_sequence, CommandExecutor};
use crate::compiler::{compile_iptables, compile_remove};
use crate::error::{ControlError, ControlResult};
use crate::model::{Action, FirewallRule, Platform};
use crate::validation::validate_ip_or_cidr;

/// iptables driver: appends LOG/DROP or ACCEPT rules tagged with the rule
/// name as an iptables comment.
pub struct LinuxDriver {
    executor: Arc<dyn CommandExecutor>,
}

impl LinuxDriver {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl FirewallDriver for LinuxDriver {
    fn platform(&self) -> Platform {
        Platform::Linux
    }

    async fn apply(&self, rule: &FirewallRule) -> ControlResult<()> {
        // `iptables` is IPv4 only; the first source is the one applied
        if let Some(source) = rule.source_ips.first() {
            let is_v6 = validate_ip_or_cidr(source).is_ok_and(|net| net.addr().is_ipv6());
            if is_v6 {
                return Err(ControlError::validation(format!(
                    "Rule '{}': IPv6 source {} cannot be applied with iptables",
                    rule.rule_name, source
                )));
            }
        }

        let plan = compile_iptables(rule);
        debug!("iptables plan for '{}': {} command(s)", rule.rule_name, plan.len());
        if !rule.enabled {
            // iptables has no per-rule disable switch
            warn!("Rule '{}' is stored disabled but iptables applies it active", rule.rule_name);
        }

        run_sequence(self.executor.as_ref(), &plan).await?;

        info!(
            "Applied iptables rule '{}' ({})",
            rule.rule_name,
            match rule.action {
                Action::Allow => "ACCEPT",
                Action::Deny => "LOG+DROP",
            }
        );
        Ok(())
    }

    async fn remove(&self, rule_name: &str) -> ControlResult<()> {
        let plan = compile_remove(rule_name, Platform::Linux)?;
        run_sequence(self.executor.as_ref(), &plan).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd_abstraction::{CommandOutput, MockCommandExecutor};
    use crate::error::ControlError;
    use crate::model::Direction;
    use mockall::Sequence;

    fn deny_rule() -> FirewallRule {
        let mut rule = FirewallRule::new("drop-smb", Direction::In, Action::Deny);
        rule.port = Some("445".to_string());
        rule
    }

    #[tokio::test]
    async fn test_apply_issues_log_then_drop() {
        let mut mock = MockCommandExecutor::new();
        let mut seq = Sequence::new();
        mock.expect_execute()
            .withf(|cmd, args| {
                cmd == "iptables"
                    && args.ends_with(&["-j".to_string(), "LOG".to_string(), "--log-prefix".to_string(), "FWDROP: ".to_string()])
                    && args.contains(&"drop-smb".to_string())
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(CommandOutput::ok()));
        mock.expect_execute()
            .withf(|cmd, args| {
                cmd == "iptables"
                    && args.ends_with(&["-j".to_string(), "DROP".to_string()])
                    && args.contains(&"drop-smb".to_string())
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(CommandOutput::ok()));

        let driver = LinuxDriver::new(Arc::new(mock));
        driver.apply(&deny_rule()).await.unwrap();
    }

    #[tokio::test]
    async fn test_log_failure_aborts_drop() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .times(1)
            .returning(|_, _| Ok(CommandOutput::failed(2, "iptables v1.8.9: Couldn't load match `time'")));

        let driver = LinuxDriver::new(Arc::new(mock));
        let err = driver.apply(&deny_rule()).await.unwrap_err();
        assert_eq!(
            err.diagnostic(),
            Some("iptables v1.8.9: Couldn't load match `time'")
        );
    }

    #[tokio::test]
    async fn test_ipv6_source_rejected_before_any_command() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute().times(0);
        let driver = LinuxDriver::new(Arc::new(mock));

        let mut rule = deny_rule();
        rule.source_ips = vec!["2001:db8::/32".to_string()];
        let err = driver.apply(&rule).await.unwrap_err();
        assert!(matches!(err, ControlError::Validation(_)));
    }

    #[tokio::test]
    async fn test_remove_not_supported() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute().times(0);
        let driver = LinuxDriver::new(Arc::new(mock));
        let err = driver.remove("drop-smb").await.unwrap_err();
        assert!(matches!(err, ControlError::NotSupported(_)));
    }
}
