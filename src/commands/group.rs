//! Rule group command implementation.

use anyhow::Result;
use std::path::Path;

use super::{open_context, or_dash};
use crate::cli::GroupAction;
use crate::driver::check_root;

/// Run the group command
pub async fn run(action: GroupAction, config_path: &Path) -> Result<()> {
    let ctx = open_context(config_path)?;
    let rules = ctx.rules();

    match action {
        GroupAction::Create { name, description } => {
            let id = rules.create_group(&name, &description).await?;
            println!("[OK] Group '{}' created", name);
            println!("     id: {}", id);
        }
        GroupAction::Delete { id } => {
            rules.delete_group(&id).await?;
            println!("[OK] Group {} deleted (member rules kept)", id);
        }
        GroupAction::List => {
            let groups = rules.list_groups().await?;
            println!();
            println!("Rule groups ({} entries):", groups.len());
            println!();
            if groups.is_empty() {
                println!("  (empty)");
            }
            for (id, group) in groups {
                println!("  {}  {:<20} {}", id, group.group_name, or_dash(Some(group.description.as_str())));
            }
        }
        GroupAction::Rules { id } => {
            let members = rules.list_group_rules(&id).await?;
            println!("Rules in group {} ({}):", id, members.len());
            for rule in members {
                println!(
                    "  {:<24} {:<6} {}",
                    rule.rule_name,
                    rule.action.as_str(),
                    if rule.enabled { "enabled" } else { "disabled" }
                );
            }
        }
        GroupAction::Enable { id } => {
            check_root()?;
            let n = rules.set_group_enabled(&id, true).await?;
            println!("[OK] {} rule(s) enabled", n);
        }
        GroupAction::Disable { id } => {
            check_root()?;
            let n = rules.set_group_enabled(&id, false).await?;
            println!("[OK] {} rule(s) disabled", n);
        }
    }
    Ok(())
}
