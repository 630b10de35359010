//! Centralized validation functions for netwarden.
//!
//! This module provides unified validation for:
//! - IP addresses and CIDR ranges (rule sources)
//! - Strict dotted-quad IPv4 syntax (route fields)
//! - Subnet mask to prefix length conversion
//! - Port specifications and interface names

use anyhow::{bail, Result};
use ipnet::IpNet;
use std::net::IpAddr;

/// Validate an IP address or CIDR string and return the parsed IpNet.
///
/// If the input is a plain IP address (without /prefix), it will be converted
/// to a /32 (IPv4) or /128 (IPv6) network.
///
/// # Examples
/// ```
/// use netwarden::validation::validate_ip_or_cidr;
/// assert!(validate_ip_or_cidr("192.168.1.1").is_ok());
/// assert!(validate_ip_or_cidr("192.168.0.0/24").is_ok());
/// assert!(validate_ip_or_cidr("invalid").is_err());
/// ```
pub fn validate_ip_or_cidr(ip_str: &str) -> Result<IpNet> {
    if ip_str.contains('/') {
        ip_str
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid CIDR: {}", ip_str))
    } else {
        let ip: IpAddr = ip_str
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid IP address: {}", ip_str))?;
        Ok(IpNet::from(ip))
    }
}

/// Strict dotted-quad check: exactly four decimal octets of 1-3 ASCII digits,
/// each at most 255. Leading zeros are tolerated ("010" is octet 10).
///
/// # Examples
/// ```
/// use netwarden::validation::is_dotted_quad;
/// assert!(is_dotted_quad("192.168.1.1"));
/// assert!(!is_dotted_quad("192.168.1"));
/// assert!(!is_dotted_quad("256.0.0.1"));
/// ```
pub fn is_dotted_quad(s: &str) -> bool {
    let octets: Vec<&str> = s.split('.').collect();
    octets.len() == 4 && octets.iter().all(|o| parse_octet(o).is_some())
}

fn parse_octet(octet: &str) -> Option<u8> {
    if octet.is_empty() || octet.len() > 3 || !octet.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    octet.parse::<u16>().ok().and_then(|v| u8::try_from(v).ok())
}

/// Validate a dotted-quad field, naming it in the error.
pub fn validate_dotted_quad(field: &str, value: &str) -> Result<()> {
    if !is_dotted_quad(value) {
        bail!("Invalid {} '{}': expected dotted-quad IPv4 address", field, value);
    }
    Ok(())
}

/// Convert a subnet mask to a prefix length by counting set bits per octet.
///
/// Mask bits are not checked for contiguity: "255.0.255.0" yields 16.
///
/// # Examples
/// ```
/// use netwarden::validation::mask_to_prefix;
/// assert_eq!(mask_to_prefix("255.255.255.0").unwrap(), 24);
/// assert_eq!(mask_to_prefix("255.255.255.128").unwrap(), 25);
/// ```
pub fn mask_to_prefix(mask: &str) -> Result<u8> {
    validate_dotted_quad("subnet mask", mask)?;
    let prefix = mask
        .split('.')
        .filter_map(parse_octet)
        .map(|octet| octet.count_ones() as u8)
        .sum();
    Ok(prefix)
}

/// Validate a port specification: a single port ("443") or an inclusive
/// range ("8000-8080"), each bound in 1..=65535.
pub fn validate_port_spec(spec: &str) -> Result<()> {
    let spec = spec.trim();
    if spec.is_empty() {
        bail!("Port must not be empty");
    }

    let parse = |p: &str| -> Result<u16> {
        match p.trim().parse::<u16>() {
            Ok(0) | Err(_) => bail!("Invalid port '{}': expected 1-65535", p.trim()),
            Ok(n) => Ok(n),
        }
    };

    match spec.split_once('-') {
        Some((low, high)) => {
            let (low, high) = (parse(low)?, parse(high)?);
            if low > high {
                bail!("Invalid port range '{}': start is greater than end", spec);
            }
        }
        None => {
            parse(spec)?;
        }
    }
    Ok(())
}

/// Interface names end up inside quoted shell/PowerShell arguments.
pub fn validate_interface_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        bail!("Interface name must not be empty");
    }
    if name.chars().any(|c| matches!(c, '\'' | '"' | '`' | '$' | ';' | '\n' | '\r')) {
        bail!("Invalid interface name '{}': contains shell metacharacters", name);
    }
    Ok(())
}
