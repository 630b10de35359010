//! iptables rule compilation.

use crate::cmd_abstraction::Invocation;
use crate::model::{Action, Direction, FirewallRule, Protocol};

use super::LOG_PREFIX;

const IPTABLES: &str = "iptables";
const CHAIN_INGRESS: &str = "INPUT";
const CHAIN_EGRESS: &str = "OUTPUT";
const ANY_SOURCE: &str = "0.0.0.0/0";

/// iptables `time` match day codes, Monday first.
pub const DAY_CODES: [&str; 7] = ["Mo", "Tu", "We", "Th", "Fr", "Sa", "Su"];

/// Time-window match arguments.
///
/// Empty unless both schedule bounds are present. Day indices outside 0..=6
/// are dropped; if none survive, `--days` is omitted.
pub fn build_time_params(rule: &FirewallRule) -> Vec<String> {
    let Some((start, end)) = rule.schedule() else {
        return Vec::new();
    };

    let mut params: Vec<String> = ["-m", "time", "--timestart", start, "--timestop", end]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let days: Vec<&str> = rule
        .days_of_week
        .iter()
        .filter_map(|&d| DAY_CODES.get(usize::from(d)).copied())
        .collect();
    if !days.is_empty() {
        params.push("--days".to_string());
        params.push(days.join(","));
    }

    params
}

/// Compile a rule into iptables invocations.
///
/// DENY rules yield two commands over identical match criteria: LOG first,
/// then DROP. Evaluation is first-match, so the LOG rule must already be in
/// the chain when the DROP rule lands.
pub fn compile_iptables(rule: &FirewallRule) -> Vec<Invocation> {
    let chain = match rule.direction {
        Direction::In => CHAIN_INGRESS,
        Direction::Out => CHAIN_EGRESS,
    };

    let criteria = match_criteria(rule, chain);

    let targets: Vec<Vec<String>> = match rule.action {
        Action::Allow => vec![vec!["-j".into(), "ACCEPT".into()]],
        Action::Deny => vec![
            vec!["-j".into(), "LOG".into(), "--log-prefix".into(), LOG_PREFIX.into()],
            vec!["-j".into(), "DROP".into()],
        ],
    };

    targets
        .into_iter()
        .map(|target| {
            let mut args = vec!["-A".to_string(), chain.to_string()];
            args.extend(criteria.iter().cloned());
            args.extend(target);
            Invocation::new(IPTABLES, args)
        })
        .collect()
}

/// Everything between the chain and the jump target, shared by LOG and DROP.
fn match_criteria(rule: &FirewallRule, chain: &str) -> Vec<String> {
    let proto = match rule.protocol {
        Protocol::Tcp => "tcp",
        Protocol::Udp => "udp",
        Protocol::Any => "all",
    };
    let source = rule
        .source_ips
        .first()
        .map(String::as_str)
        .unwrap_or(ANY_SOURCE);

    let mut args = vec![
        "-p".to_string(),
        proto.to_string(),
        "-s".to_string(),
        source.to_string(),
    ];

    // Port matches need a transport protocol; iptables rejects them on "all".
    if let (Some(port), false) = (&rule.port, rule.protocol == Protocol::Any) {
        let flag = if chain == CHAIN_INGRESS { "--dport" } else { "--sport" };
        args.push(flag.to_string());
        args.push(port.trim().replace('-', ":"));
    }

    args.extend(build_time_params(rule));

    args.push("-m".to_string());
    args.push("comment".to_string());
    args.push("--comment".to_string());
    args.push(rule.rule_name.clone());

    args
}
