//! Rule command implementation.

use anyhow::Result;
use std::path::Path;

use super::{dry_run_context, open_context, or_dash, print_plan};
use crate::cli::{RuleAction, RuleArgs};
use crate::compiler::compile_rule;
use crate::config::Config;
use crate::driver::check_root;
use crate::model::FirewallRule;

/// Run the rule command
pub async fn run(action: RuleAction, config_path: &Path) -> Result<()> {
    match action {
        RuleAction::Add { rule, dry_run } => add(rule, dry_run, config_path).await,
        RuleAction::Update { existing, rule } => update(&existing, rule, config_path).await,
        RuleAction::Delete { name } => delete(&name, config_path).await,
        RuleAction::List { json } => list(json, config_path).await,
        RuleAction::Compile { rule, platform } => {
            let config = Config::load_or_default(config_path)?;
            let platform = platform.unwrap_or(config.platform).resolve();
            let rule = to_rule(rule);
            rule.validate()?;
            println!("Command plan for '{}' on {}:", rule.rule_name, platform);
            for (i, inv) in compile_rule(&rule, platform).iter().enumerate() {
                println!("  {}. {}", i + 1, inv);
            }
            Ok(())
        }
    }
}

/// Build a rule record from command-line arguments.
pub fn to_rule(args: RuleArgs) -> FirewallRule {
    let mut rule = FirewallRule::new(args.name, args.direction, args.action);
    rule.protocol = args.protocol;
    rule.port = args.port;
    rule.source_ips = args.sources;
    rule.schedule_start = args.start;
    rule.schedule_end = args.end;
    rule.days_of_week = args.days.into_iter().collect();
    rule.profile = args.profile;
    rule.description = args.description;
    rule.enabled = !args.disabled;
    rule.group_id = args.group;
    rule
}

async fn add(args: RuleArgs, dry_run: bool, config_path: &Path) -> Result<()> {
    let rule = to_rule(args);

    if dry_run {
        let (ctx, executor) = dry_run_context(Config::load_or_default(config_path)?);
        ctx.rules().create(rule.clone()).await?;
        println!("[DRY-RUN] Would apply '{}' on {}:", rule.rule_name, ctx.platform);
        print_plan(&executor);
        return Ok(());
    }

    check_root()?;
    let ctx = open_context(config_path)?;
    ctx.rules().create(rule.clone()).await?;
    println!("[OK] Rule '{}' applied ({})", rule.rule_name, rule.action.as_str());
    Ok(())
}

async fn update(existing: &str, args: RuleArgs, config_path: &Path) -> Result<()> {
    check_root()?;
    let ctx = open_context(config_path)?;
    let rule = to_rule(args);

    match ctx.rules().update(existing, rule.clone()).await {
        Ok(()) => {
            println!("[OK] Rule '{}' replaced by '{}'", existing, rule.rule_name);
            Ok(())
        }
        Err(e) if e.is_partial_update() => {
            eprintln!("[WARN] '{}' was removed from the host but its replacement failed.", existing);
            eprintln!("       The host no longer enforces it; the stored record is unchanged.");
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

async fn delete(name: &str, config_path: &Path) -> Result<()> {
    check_root()?;
    let ctx = open_context(config_path)?;
    ctx.rules().delete(name).await?;
    println!("[OK] Rule '{}' deleted", name);
    Ok(())
}

async fn list(json: bool, config_path: &Path) -> Result<()> {
    let ctx = open_context(config_path)?;
    let rules = ctx.rules().list().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rules)?);
        return Ok(());
    }

    println!();
    println!("Firewall rules ({} entries):", rules.len());
    println!();
    if rules.is_empty() {
        println!("  (empty)");
        return Ok(());
    }

    println!(
        "  {:<24} {:<4} {:<6} {:<5} {:<12} {:<18} {:<8}",
        "NAME", "DIR", "ACTION", "PROTO", "PORT", "SOURCE", "STATE"
    );
    for rule in &rules {
        println!(
            "  {:<24} {:<4} {:<6} {:<5} {:<12} {:<18} {:<8}",
            rule.rule_name,
            format!("{:?}", rule.direction).to_uppercase(),
            rule.action.as_str(),
            format!("{:?}", rule.protocol).to_lowercase(),
            or_dash(rule.port.as_deref()),
            or_dash(rule.source_ips.first().map(String::as_str)),
            if rule.enabled { "enabled" } else { "disabled" }
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, Direction, Protocol};

    fn args(name: &str) -> RuleArgs {
        RuleArgs {
            name: name.to_string(),
            direction: Direction::Out,
            action: Action::Deny,
            protocol: Protocol::Udp,
            port: Some("53".to_string()),
            sources: vec!["10.0.0.1".to_string()],
            start: None,
            end: None,
            days: vec![4, 0, 4],
            profile: "any".to_string(),
            description: "dns egress".to_string(),
            disabled: true,
            group: None,
        }
    }

    #[test]
    fn test_to_rule_maps_flags() {
        let rule = to_rule(args("dns"));
        assert_eq!(rule.rule_name, "dns");
        assert_eq!(rule.direction, Direction::Out);
        assert!(!rule.enabled);
        assert_eq!(rule.days_of_week.iter().copied().collect::<Vec<_>>(), vec![0, 4]);
    }

    #[tokio::test]
    async fn test_dry_run_records_plan_without_store() {
        let mut config = Config::default();
        config.platform = crate::model::Platform::Windows;
        let (ctx, executor) = dry_run_context(config);

        ctx.rules().create(to_rule(args("dns"))).await.unwrap();
        // create then disable
        assert_eq!(executor.calls().len(), 2);
    }
}
