//! Target parsing for scan requests
//!
//! A request is a block of text with one target per line. Each line is either
//! a prefixed range (`10.0.0.0/24`, host bits allowed and masked off) or a
//! bare address. Ranges expand to every address they cover, network and
//! broadcast included, in ascending order; lines are expanded in input order.

use crate::config::{MalformedLinePolicy, ScanConfig};
use crate::{Result, ScanError};
use ipnetwork::IpNetwork;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Represents a parsed target with its type and addresses
#[derive(Debug, Clone)]
pub struct ParsedTarget {
    pub original: String,
    pub target_type: TargetType,
    pub addresses: Vec<IpAddr>,
    pub cidr_info: Option<CidrInfo>,
}

/// Type of target being scanned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetType {
    SingleIpv4,
    SingleIpv6,
    Ipv4Cidr,
    Ipv6Cidr,
}

/// CIDR network information
#[derive(Debug, Clone)]
pub struct CidrInfo {
    pub network: IpAddr,
    pub prefix_length: u8,
    pub total_addresses: u128,
}

/// Expands request text into the ordered list of addresses to probe
#[derive(Debug, Clone)]
pub struct TargetParser {
    max_targets: u64,
    policy: MalformedLinePolicy,
}

impl Default for TargetParser {
    fn default() -> Self {
        Self::from_config(&ScanConfig::default())
    }
}

impl TargetParser {
    pub fn new(max_targets: u64, policy: MalformedLinePolicy) -> Self {
        Self { max_targets, policy }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(config.max_targets, config.malformed_lines)
    }

    pub fn policy(&self) -> MalformedLinePolicy {
        self.policy
    }

    /// Expand a whole request into its target set.
    ///
    /// Blank lines and `#` comments are ignored. Malformed lines either fail
    /// the request or are skipped, depending on the configured policy. The
    /// address limit applies to the request as a whole.
    pub fn expand(&self, raw_text: &str) -> Result<Vec<IpAddr>> {
        let mut addresses: Vec<IpAddr> = Vec::new();
        let mut parsed_lines = 0usize;

        let lines = raw_text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'));

        for line in lines {
            let remaining = self.max_targets.saturating_sub(addresses.len() as u64);

            match self.parse_bounded(line, remaining) {
                Ok(parsed) => {
                    match &parsed.cidr_info {
                        Some(info) => log::info!(
                            "CIDR {} ({}/{}) expanded to {} addresses",
                            line,
                            info.network,
                            info.prefix_length,
                            info.total_addresses
                        ),
                        None => log::debug!("{} parsed as {:?}", line, parsed.target_type),
                    }
                    parsed_lines += 1;
                    addresses.extend(parsed.addresses);
                }
                Err(ScanError::InvalidTarget(bad)) if self.policy == MalformedLinePolicy::Skip => {
                    log::warn!("Skipping malformed target: {}", bad);
                }
                Err(e) => return Err(e),
            }
        }

        if parsed_lines == 0 && self.policy == MalformedLinePolicy::Reject {
            return Err(ScanError::EmptyRequest);
        }

        Ok(addresses)
    }

    /// Parse a single target line
    pub fn parse_target(&self, target: &str) -> Result<ParsedTarget> {
        self.parse_bounded(target.trim(), self.max_targets)
    }

    fn parse_bounded(&self, target: &str, limit: u64) -> Result<ParsedTarget> {
        if let Some(network) = parse_network(target) {
            return self.expand_network(target, network, limit);
        }

        // Fall back to a bare address
        match IpAddr::from_str(target) {
            Ok(ip) if limit == 0 => Err(ScanError::TooManyTargets {
                target: ip.to_string(),
                count: 1,
                limit: self.max_targets,
            }),
            Ok(ip) => Ok(ParsedTarget {
                original: target.to_string(),
                target_type: match ip {
                    IpAddr::V4(_) => TargetType::SingleIpv4,
                    IpAddr::V6(_) => TargetType::SingleIpv6,
                },
                addresses: vec![ip],
                cidr_info: None,
            }),
            Err(_) => Err(ScanError::InvalidTarget(target.to_string())),
        }
    }

    fn expand_network(&self, original: &str, network: IpNetwork, limit: u64) -> Result<ParsedTarget> {
        let total_addresses = network_size(&network);
        if total_addresses > u128::from(limit) {
            return Err(ScanError::TooManyTargets {
                target: original.to_string(),
                count: total_addresses,
                limit: self.max_targets,
            });
        }

        let (target_type, base, addresses) = match network {
            IpNetwork::V4(net) => {
                let start = u32::from(net.network());
                let end = u32::from(net.broadcast());
                let addresses = (start..=end)
                    .map(|ip| IpAddr::V4(Ipv4Addr::from(ip)))
                    .collect();
                (TargetType::Ipv4Cidr, IpAddr::V4(net.network()), addresses)
            }
            IpNetwork::V6(net) => {
                let host_bits = 128 - u32::from(net.prefix());
                let mask = u128::MAX.checked_shl(host_bits).unwrap_or(0);
                let start = u128::from(net.ip()) & mask;
                let end = start | !mask;
                let addresses = (start..=end)
                    .map(|ip| IpAddr::V6(Ipv6Addr::from(ip)))
                    .collect();
                (TargetType::Ipv6Cidr, IpAddr::V6(Ipv6Addr::from(start)), addresses)
            }
        };

        Ok(ParsedTarget {
            original: original.to_string(),
            target_type,
            addresses,
            cidr_info: Some(CidrInfo {
                network: base,
                prefix_length: network.prefix(),
                total_addresses,
            }),
        })
    }
}

/// Non-strict range parse: `10.0.0.7/30` is accepted and masked to `10.0.0.4/30`.
fn parse_network(target: &str) -> Option<IpNetwork> {
    if !target.contains('/') {
        return None;
    }
    IpNetwork::from_str(target).ok()
}

/// Number of addresses covered by a network, saturating for `::/0`.
fn network_size(network: &IpNetwork) -> u128 {
    let host_bits = match network {
        IpNetwork::V4(net) => 32 - u32::from(net.prefix()),
        IpNetwork::V6(net) => 128 - u32::from(net.prefix()),
    };
    1u128.checked_shl(host_bits).unwrap_or(u128::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v4(a: u8, b: u8, c: u8, d: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(a, b, c, d))
    }

    #[test]
    fn test_ipv4_single_address() {
        let parser = TargetParser::default();
        let result = parser.parse_target("8.8.8.8").unwrap();

        assert_eq!(result.target_type, TargetType::SingleIpv4);
        assert_eq!(result.addresses, vec![v4(8, 8, 8, 8)]);
        assert!(result.cidr_info.is_none());
    }

    #[test]
    fn test_ipv6_single_address() {
        let parser = TargetParser::default();
        let result = parser.parse_target("2001:db8::1").unwrap();

        assert_eq!(result.target_type, TargetType::SingleIpv6);
        assert_eq!(result.addresses.len(), 1);
    }

    #[test]
    fn test_ipv4_cidr_includes_network_and_broadcast() {
        let parser = TargetParser::default();
        let result = parser.parse_target("10.0.0.0/30").unwrap();

        assert_eq!(result.target_type, TargetType::Ipv4Cidr);
        assert_eq!(
            result.addresses,
            vec![v4(10, 0, 0, 0), v4(10, 0, 0, 1), v4(10, 0, 0, 2), v4(10, 0, 0, 3)]
        );
        let info = result.cidr_info.unwrap();
        assert_eq!(info.prefix_length, 30);
        assert_eq!(info.total_addresses, 4);
    }

    #[test]
    fn test_host_bits_are_masked() {
        let parser = TargetParser::default();
        let result = parser.parse_target("192.168.1.77/24").unwrap();

        assert_eq!(result.addresses.len(), 256);
        assert_eq!(result.addresses[0], v4(192, 168, 1, 0));
        assert_eq!(result.addresses[255], v4(192, 168, 1, 255));
        assert_eq!(result.cidr_info.unwrap().network, v4(192, 168, 1, 0));
    }

    #[test]
    fn test_slash_32_is_one_address() {
        let parser = TargetParser::default();
        let result = parser.parse_target("1.2.3.4/32").unwrap();
        assert_eq!(result.addresses, vec![v4(1, 2, 3, 4)]);
    }

    #[test]
    fn test_ipv6_cidr() {
        let parser = TargetParser::default();
        let result = parser.parse_target("2001:db8::5/126").unwrap();

        assert_eq!(result.target_type, TargetType::Ipv6Cidr);
        assert_eq!(result.addresses.len(), 4);
        assert_eq!(result.addresses[0], "2001:db8::4".parse::<IpAddr>().unwrap());
        assert_eq!(result.addresses[3], "2001:db8::7".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_invalid_targets() {
        let parser = TargetParser::default();
        for bad in ["not-an-ip", "10.0.0.1/33", "10.0.0.256", "10.0.0.0/abc", "/24"] {
            match parser.parse_target(bad) {
                Err(ScanError::InvalidTarget(text)) => assert_eq!(text, bad),
                other => panic!("expected InvalidTarget for {bad}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_limit_checked_before_expansion() {
        let parser = TargetParser::new(256, MalformedLinePolicy::Reject);
        assert!(parser.parse_target("10.0.0.0/24").is_ok());
        assert!(matches!(
            parser.parse_target("10.0.0.0/23"),
            Err(ScanError::TooManyTargets { count: 512, limit: 256, .. })
        ));
        assert!(matches!(
            parser.parse_target("::/0"),
            Err(ScanError::TooManyTargets { count: u128::MAX, .. })
        ));
    }

    #[test]
    fn test_expand_multiple_lines_in_order() {
        let parser = TargetParser::default();
        let text = "10.0.0.4/31\n\n  8.8.8.8  \n# comment\n10.0.0.0/31\n";
        let addresses = parser.expand(text).unwrap();

        assert_eq!(
            addresses,
            vec![v4(10, 0, 0, 4), v4(10, 0, 0, 5), v4(8, 8, 8, 8), v4(10, 0, 0, 0), v4(10, 0, 0, 1)]
        );
    }

    #[test]
    fn test_expand_does_not_deduplicate() {
        let parser = TargetParser::default();
        let addresses = parser.expand("8.8.8.8\n8.8.8.8/32").unwrap();
        assert_eq!(addresses, vec![v4(8, 8, 8, 8), v4(8, 8, 8, 8)]);
    }

    #[test]
    fn test_reject_policy_fails_whole_request() {
        let parser = TargetParser::new(65536, MalformedLinePolicy::Reject);
        match parser.expand("10.0.0.0/30\nnot-an-ip\n8.8.8.8") {
            Err(ScanError::InvalidTarget(text)) => assert_eq!(text, "not-an-ip"),
            other => panic!("expected InvalidTarget, got {other:?}"),
        }
    }

    #[test]
    fn test_skip_policy_continues() {
        let parser = TargetParser::new(65536, MalformedLinePolicy::Skip);
        let addresses = parser.expand("not-an-ip\n8.8.8.8\n999.1.1.1/8").unwrap();
        assert_eq!(addresses, vec![v4(8, 8, 8, 8)]);

        assert!(parser.expand("not-an-ip").unwrap().is_empty());
    }

    #[test]
    fn test_empty_request() {
        let reject = TargetParser::new(65536, MalformedLinePolicy::Reject);
        assert!(matches!(reject.expand("  \n# nothing\n"), Err(ScanError::EmptyRequest)));

        let skip = TargetParser::new(65536, MalformedLinePolicy::Skip);
        assert!(skip.expand("").unwrap().is_empty());
    }

    #[test]
    fn test_limit_applies_across_lines() {
        let parser = TargetParser::new(5, MalformedLinePolicy::Skip);
        assert_eq!(parser.expand("10.0.0.0/30\n8.8.8.8").unwrap().len(), 5);
        assert!(matches!(
            parser.expand("10.0.0.0/30\n8.8.8.8\n1.1.1.1"),
            Err(ScanError::TooManyTargets { .. })
        ));
        assert!(matches!(
            parser.expand("10.0.0.0/30\n10.0.1.0/31"),
            Err(ScanError::TooManyTargets { .. })
        ));
    }
}
