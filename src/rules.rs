//! Firewall rule administration: validated create/update/delete on top of a
//! [`FirewallDriver`], plus rule groups.
//!
//! Host state is always changed first and the record second, so a stored
//! rule never describes something the host refused.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use crate::driver::FirewallDriver;
use crate::error::{ControlError, ControlResult};
use crate::model::{EventRecord, FirewallRule, RuleGroup};
use crate::store::Records;

pub struct RuleService {
    driver: Arc<dyn FirewallDriver>,
    records: Records,
}

impl RuleService {
    pub fn new(driver: Arc<dyn FirewallDriver>, records: Records) -> Self {
        Self { driver, records }
    }

    pub async fn create(&self, rule: FirewallRule) -> ControlResult<()> {
        rule.validate()?;
        if self.records.rule(&rule.rule_name).await?.is_some() {
            return Err(ControlError::validation(format!(
                "Rule '{}' already exists",
                rule.rule_name
            )));
        }
        if let Some(group_id) = &rule.group_id {
            if self.records.group(group_id).await?.is_none() {
                warn!("Rule '{}' references unknown group {}", rule.rule_name, group_id);
            }
        }

        self.driver.apply(&rule).await?;
        self.records.save_rule(&rule).await?;
        self.audit(format!("Rule created: {} {}", rule.rule_name, rule.action.as_str()))
            .await;
        Ok(())
    }

    /// Replace the rule stored under `name` with `rule`.
    ///
    /// On [`ControlError::PartialUpdate`] the stored record is left as it was
    /// and the host no longer enforces it.
    pub async fn update(&self, name: &str, rule: FirewallRule) -> ControlResult<()> {
        rule.validate()?;
        let old = self.load(name).await?;
        if rule.rule_name != name && self.records.rule(&rule.rule_name).await?.is_some() {
            return Err(ControlError::validation(format!(
                "Rule '{}' already exists",
                rule.rule_name
            )));
        }

        if let Err(e) = self.driver.replace(&old, &rule).await {
            if e.is_partial_update() {
                warn!("Rule '{}' removed from host but replacement failed", name);
            }
            return Err(e);
        }

        if rule.rule_name != name {
            self.records.delete_rule(name).await?;
        }
        self.records.save_rule(&rule).await?;
        self.audit(format!("Rule updated: {} {}", rule.rule_name, rule.action.as_str()))
            .await;
        Ok(())
    }

    /// Remove the host rule, then the record.
    pub async fn delete(&self, name: &str) -> ControlResult<()> {
        let rule = self.load(name).await?;
        self.driver.remove(name).await?;
        self.records.delete_rule(name).await?;
        self.audit(format!("Rule deleted: {} {}", name, rule.action.as_str()))
            .await;
        Ok(())
    }

    pub async fn get(&self, name: &str) -> ControlResult<FirewallRule> {
        self.load(name).await
    }

    pub async fn list(&self) -> ControlResult<Vec<FirewallRule>> {
        Ok(self.records.rules().await?)
    }

    // --- groups ---

    pub async fn create_group(&self, name: &str, description: &str) -> ControlResult<String> {
        if name.trim().is_empty() {
            return Err(ControlError::validation("Group name must not be empty"));
        }
        let group = RuleGroup {
            group_name: name.to_string(),
            description: description.to_string(),
            created_at: Utc::now(),
        };
        let id = self.records.insert_group(&group).await?;
        info!("Rule group '{}' created (id {})", name, id);
        Ok(id)
    }

    /// Delete a group record. Member rules keep their `group_id`.
    pub async fn delete_group(&self, id: &str) -> ControlResult<()> {
        if !self.records.delete_group(id).await? {
            return Err(ControlError::NotFound(format!("group '{}'", id)));
        }
        Ok(())
    }

    pub async fn list_groups(&self) -> ControlResult<Vec<(String, RuleGroup)>> {
        Ok(self.records.groups().await?)
    }

    pub async fn list_group_rules(&self, id: &str) -> ControlResult<Vec<FirewallRule>> {
        self.load_group(id).await?;
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|r| r.group_id.as_deref() == Some(id))
            .collect())
    }

    /// Enable or disable every rule in a group.
    ///
    /// Each rule's host state is removed, the flag persisted, then the rule
    /// re-applied with its new state. Returns the number of rules changed.
    pub async fn set_group_enabled(&self, id: &str, enable: bool) -> ControlResult<usize> {
        let group = self.load_group(id).await?;
        let members = self.list_group_rules(id).await?;

        for rule in &members {
            self.driver.remove(&rule.rule_name).await?;

            let mut updated = rule.clone();
            updated.enabled = enable;
            self.records.save_rule(&updated).await?;

            self.driver
                .apply(&updated)
                .await
                .map_err(|e| ControlError::PartialUpdate {
                    handle: rule.rule_name.clone(),
                    source: Box::new(e),
                })?;
        }

        self.audit(format!(
            "Group {}: {} rule(s) {}",
            group.group_name,
            members.len(),
            if enable { "enabled" } else { "disabled" }
        ))
        .await;
        Ok(members.len())
    }

    async fn load(&self, name: &str) -> ControlResult<FirewallRule> {
        self.records
            .rule(name)
            .await?
            .ok_or_else(|| ControlError::NotFound(format!("rule '{}'", name)))
    }

    async fn load_group(&self, id: &str) -> ControlResult<RuleGroup> {
        self.records
            .group(id)
            .await?
            .ok_or_else(|| ControlError::NotFound(format!("group '{}'", id)))
    }

    /// The audit trail is what the deny aggregator counts; losing an entry
    /// must not undo a mutation that already reached the host.
    async fn audit(&self, message: String) {
        info!("{}", message);
        if let Err(e) = self.records.append_event(&EventRecord::info(message)).await {
            warn!("Failed to record audit event: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::mock::MockDriver;
    use crate::model::{Action, AlertLevel, Direction};
    use crate::store::MemoryStore;

    fn service() -> (RuleService, Arc<MockDriver>, Records) {
        let driver = Arc::new(MockDriver::new());
        let records = Records::new(Arc::new(MemoryStore::new()));
        (RuleService::new(driver.clone(), records.clone()), driver, records)
    }

    fn deny(name: &str) -> FirewallRule {
        let mut rule = FirewallRule::new(name, Direction::In, Action::Deny);
        rule.port = Some("445".to_string());
        rule
    }

    #[tokio::test]
    async fn test_create_applies_persists_and_audits() {
        let (svc, driver, records) = service();
        svc.create(deny("smb")).await.unwrap();

        assert_eq!(driver.applied_names(), vec!["smb"]);
        assert_eq!(svc.list().await.unwrap().len(), 1);
        let events = records.count_deny_events_since(Utc::now() - chrono::Duration::seconds(5)).await.unwrap();
        assert_eq!(events, 1);
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_and_invalid() {
        let (svc, driver, _) = service();
        svc.create(deny("smb")).await.unwrap();

        let err = svc.create(deny("smb")).await.unwrap_err();
        assert!(matches!(err, ControlError::Validation(_)));

        let mut half = deny("half");
        half.schedule_start = Some("08:00".to_string());
        assert!(matches!(svc.create(half).await, Err(ControlError::Validation(_))));

        let mut bad_port = deny("bad-port");
        bad_port.port = Some("70000".to_string());
        assert!(svc.create(bad_port).await.is_err());

        assert_eq!(driver.applied_names().len(), 1);
    }

    #[tokio::test]
    async fn test_apply_failure_not_persisted() {
        let (svc, driver, _) = service();
        driver.fail_next_apply("Access is denied.");
        assert!(svc.create(deny("smb")).await.is_err());
        assert!(svc.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_partial_keeps_old_record() {
        let (svc, driver, _) = service();
        svc.create(deny("smb")).await.unwrap();
        driver.fail_next_apply("New-NetFirewallRule : Access is denied.");

        let mut new = deny("smb");
        new.port = Some("139".to_string());
        let err = svc.update("smb", new).await.unwrap_err();

        assert!(err.is_partial_update());
        assert_eq!(svc.get("smb").await.unwrap().port.as_deref(), Some("445"));
        assert!(driver.applied_names().is_empty());
    }

    #[tokio::test]
    async fn test_update_rename() {
        let (svc, driver, _) = service();
        svc.create(deny("smb")).await.unwrap();

        svc.update("smb", deny("smb-v2")).await.unwrap();
        assert!(matches!(svc.get("smb").await, Err(ControlError::NotFound(_))));
        assert!(svc.get("smb-v2").await.is_ok());
        assert_eq!(driver.applied_names(), vec!["smb-v2"]);
    }

    #[tokio::test]
    async fn test_delete_host_first() {
        let (svc, driver, _) = service();
        svc.create(deny("smb")).await.unwrap();

        driver.fail_next_remove("No MSFT_NetFirewallRule objects found");
        assert!(svc.delete("smb").await.is_err());
        assert!(svc.get("smb").await.is_ok());

        svc.delete("smb").await.unwrap();
        assert!(svc.list().await.unwrap().is_empty());
        assert_eq!(driver.removed.lock().unwrap().as_slice(), ["smb"]);
    }

    #[tokio::test]
    async fn test_group_enable_disable() {
        let (svc, driver, records) = service();
        let gid = svc.create_group("office", "office hours").await.unwrap();

        for name in ["a", "b"] {
            let mut rule = deny(name);
            rule.group_id = Some(gid.clone());
            svc.create(rule).await.unwrap();
        }
        svc.create(deny("other")).await.unwrap();

        assert_eq!(svc.list_group_rules(&gid).await.unwrap().len(), 2);
        assert_eq!(svc.set_group_enabled(&gid, false).await.unwrap(), 2);

        for rule in svc.list_group_rules(&gid).await.unwrap() {
            assert!(!rule.enabled);
        }
        assert!(svc.get("other").await.unwrap().enabled);
        assert_eq!(driver.removed.lock().unwrap().len(), 2);

        let stored = records.rule("a").await.unwrap().unwrap();
        assert_eq!(stored.group_id.as_deref(), Some(gid.as_str()));
    }

    #[tokio::test]
    async fn test_delete_group_keeps_rules() {
        let (svc, _, _) = service();
        let gid = svc.create_group("lab", "").await.unwrap();
        let mut rule = deny("lab-ssh");
        rule.group_id = Some(gid.clone());
        svc.create(rule).await.unwrap();

        svc.delete_group(&gid).await.unwrap();
        assert_eq!(svc.get("lab-ssh").await.unwrap().group_id, Some(gid.clone()));
        assert!(matches!(svc.list_group_rules(&gid).await, Err(ControlError::NotFound(_))));
        assert!(matches!(svc.delete_group(&gid).await, Err(ControlError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_audit_events_are_info() {
        let (svc, _, records) = service();
        svc.create(FirewallRule::new("web", Direction::In, Action::Allow)).await.unwrap();
        let raw = records
            .raw()
            .list(crate::store::Collection::Events)
            .await
            .unwrap();
        assert_eq!(raw.len(), 1);
        let event: EventRecord = serde_json::from_value(raw[0].1.clone()).unwrap();
        assert_eq!(event.level, AlertLevel::Info);
        assert!(event.message.contains("ALLOW"));
    }
}
