//! Windows Firewall (PowerShell NetSecurity module) rule compilation.

use crate::cmd_abstraction::Invocation;
use crate::model::{Action, Direction, FirewallRule, Protocol};

const POWERSHELL: &str = "powershell";

/// Quote a value as a PowerShell single-quoted literal.
pub fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn powershell(script: String) -> Invocation {
    Invocation::new(POWERSHELL, ["-NoProfile".to_string(), "-Command".to_string(), script])
}

/// Compile a rule into `New-NetFirewallRule`, followed by
/// `Disable-NetFirewallRule` when the rule is stored disabled.
///
/// The disable step is part of the same plan: a disabled rule is never left
/// enabled by a plan that ran to completion.
pub fn compile_netsecurity(rule: &FirewallRule) -> Vec<Invocation> {
    let name = ps_quote(&rule.rule_name);
    let direction = match rule.direction {
        Direction::In => "Inbound",
        Direction::Out => "Outbound",
    };
    let action = match rule.action {
        Action::Allow => "Allow",
        Action::Deny => "Block",
    };

    let mut cmd = format!(
        "New-NetFirewallRule -Name {name} -DisplayName {name} -Direction {direction} -Action {action}"
    );

    match rule.protocol {
        Protocol::Tcp => cmd.push_str(" -Protocol TCP"),
        Protocol::Udp => cmd.push_str(" -Protocol UDP"),
        Protocol::Any => cmd.push_str(" -Protocol Any"),
    }

    // Port filters are rejected by the cmdlet unless the protocol is TCP/UDP.
    if let (Some(port), false) = (&rule.port, rule.protocol == Protocol::Any) {
        let port: String = port.chars().filter(|c| !c.is_whitespace()).collect();
        match rule.direction {
            Direction::In => cmd.push_str(&format!(" -LocalPort {port}")),
            Direction::Out => cmd.push_str(&format!(" -RemotePort {port}")),
        }
    }

    if !rule.source_ips.is_empty() {
        cmd.push_str(&format!(" -RemoteAddress {}", rule.source_ips.join(",")));
    }

    if !rule.profile.eq_ignore_ascii_case("any") && !rule.profile.is_empty() {
        cmd.push_str(&format!(" -Profile {}", capitalize(&rule.profile)));
    }

    if !rule.description.is_empty() {
        cmd.push_str(&format!(" -Description {}", ps_quote(&rule.description)));
    }

    let mut plan = vec![powershell(cmd)];
    if !rule.enabled {
        plan.push(powershell(format!("Disable-NetFirewallRule -Name {name}")));
    }
    plan
}

pub fn compile_netsecurity_remove(rule_name: &str) -> Invocation {
    powershell(format!("Remove-NetFirewallRule -Name {}", ps_quote(rule_name)))
}

fn capitalize(s: &str) -> String {
    let lower = s.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(inv: &Invocation) -> &str {
        assert_eq!(inv.program, "powershell");
        assert_eq!(inv.args[1], "-Command");
        &inv.args[2]
    }

    #[test]
    fn test_inbound_block_with_port_and_sources() {
        let mut rule = FirewallRule::new("rdp-block", Direction::In, Action::Deny);
        rule.port = Some("3389".to_string());
        rule.source_ips = vec!["10.0.0.5".to_string(), "10.0.0.6".to_string()];
        rule.profile = "private".to_string();
        rule.description = "no rdp".to_string();

        let plan = compile_netsecurity(&rule);
        assert_eq!(plan.len(), 1);
        assert_eq!(
            script(&plan[0]),
            "New-NetFirewallRule -Name 'rdp-block' -DisplayName 'rdp-block' \
             -Direction Inbound -Action Block -Protocol TCP -LocalPort 3389 \
             -RemoteAddress 10.0.0.5,10.0.0.6 -Profile Private -Description 'no rdp'"
        );
    }

    #[test]
    fn test_outbound_uses_remote_port() {
        let mut rule = FirewallRule::new("smtp", Direction::Out, Action::Allow);
        rule.port = Some(" 25 ".to_string());
        let s = compile_netsecurity(&rule)[0].args[2].clone();
        assert!(s.contains("-Direction Outbound -Action Allow"));
        assert!(s.contains(" -RemotePort 25"));
        assert!(!s.contains("-LocalPort"));
        assert!(!s.contains("-Profile"));
        assert!(!s.contains("-RemoteAddress"));
    }

    #[test]
    fn test_any_protocol_omits_ports() {
        let mut rule = FirewallRule::new("any", Direction::In, Action::Allow);
        rule.protocol = Protocol::Any;
        rule.port = Some("80".to_string());
        let s = compile_netsecurity(&rule)[0].args[2].clone();
        assert!(s.contains("-Protocol Any"));
        assert!(!s.contains("Port"));
    }

    #[test]
    fn test_disabled_rule_appends_disable_step() {
        let mut rule = FirewallRule::new("later", Direction::In, Action::Allow);
        rule.enabled = false;
        let plan = compile_netsecurity(&rule);
        assert_eq!(plan.len(), 2);
        assert!(script(&plan[0]).starts_with("New-NetFirewallRule"));
        assert_eq!(script(&plan[1]), "Disable-NetFirewallRule -Name 'later'");
    }

    #[test]
    fn test_quotes_are_escaped() {
        let mut rule = FirewallRule::new("r", Direction::In, Action::Allow);
        rule.description = "it's fine".to_string();
        let s = compile_netsecurity(&rule)[0].args[2].clone();
        assert!(s.ends_with("-Description 'it''s fine'"));
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("PUBLIC"), "Public");
        assert_eq!(capitalize("domain"), "Domain");
        assert_eq!(capitalize(""), "");
    }
}
