//! Resolver address validation
//!
//! DNS-01 nameservers are given as `ip` or `ip:port`; bare IPs use port 53.

use std::net::{IpAddr, SocketAddr};

use super::{ErrorCategory, ValidationError, ValidationResult};

/// Port assumed when a nameserver address omits one
pub const DEFAULT_DNS_PORT: u16 = 53;

/// Parse a nameserver address, defaulting the port to 53
pub fn parse_nameserver(address: &str) -> Option<SocketAddr> {
    let address = address.trim();
    if let Ok(addr) = address.parse::<SocketAddr>() {
        return Some(addr);
    }
    // Bracketed IPv6 without a port, e.g. "[2001:db8::1]"
    let unbracketed = address
        .strip_prefix('[')
        .and_then(|a| a.strip_suffix(']'))
        .unwrap_or(address);
    unbracketed
        .parse::<IpAddr>()
        .ok()
        .map(|ip| SocketAddr::new(ip, DEFAULT_DNS_PORT))
}

/// Validate DNS-01 nameserver addresses
pub fn validate_nameservers(nameservers: &[String]) -> ValidationResult {
    let mut result = ValidationResult::new();

    for address in nameservers {
        if parse_nameserver(address).is_none() {
            result.add_error(ValidationError::new(
                ErrorCategory::Network,
                format!("DNS-01 nameserver '{}' is not an IP address or ip:port", address),
            ));
        }
    }

    result
}
