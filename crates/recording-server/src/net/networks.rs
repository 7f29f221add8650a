//! IP network prefixes and the trusted network sets built from them.
//!
//! Used for the `trustedproxies` and `stats.allowed_ips` configuration lists.
//! Both IPv4 and IPv6 prefixes can be mixed in a single set; an address only
//! ever matches networks of its own family.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

/// Error parsing a network prefix.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NetworkParseError {
    #[error("Invalid network address: {0}")]
    InvalidAddress(String),

    #[error("Invalid prefix length: {0}")]
    InvalidPrefix(String),

    #[error("Host bits set in network: {0}")]
    HostBitsSet(String),
}

/// An IPv4 or IPv6 network prefix (`address/prefix_len`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpNetwork {
    network: IpAddr,
    prefix_len: u8,
}

impl IpNetwork {
    /// Network covering exactly one host (`/32` or `/128`).
    #[must_use]
    pub fn host(address: IpAddr) -> Self {
        let prefix_len = match address {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        Self {
            network: address,
            prefix_len,
        }
    }

    /// Returns the prefix length.
    #[must_use]
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Returns whether the address falls within this network.
    #[must_use]
    pub fn contains(&self, address: IpAddr) -> bool {
        match (self.network, address) {
            (IpAddr::V4(network), IpAddr::V4(address)) => {
                let mask = v4_mask(self.prefix_len);
                u32::from(network) & mask == u32::from(address) & mask
            }
            (IpAddr::V6(network), IpAddr::V6(address)) => {
                let mask = v6_mask(self.prefix_len);
                u128::from(network) & mask == u128::from(address) & mask
            }
            _ => false,
        }
    }
}

fn v4_mask(prefix_len: u8) -> u32 {
    u32::MAX
        .checked_shl(32 - u32::from(prefix_len))
        .unwrap_or(0)
}

fn v6_mask(prefix_len: u8) -> u128 {
    u128::MAX
        .checked_shl(128 - u32::from(prefix_len))
        .unwrap_or(0)
}

impl FromStr for IpNetwork {
    type Err = NetworkParseError;

    /// Parses `address/prefix_len`, or a bare address as a single host.
    ///
    /// Networks with host bits set (e.g. `10.0.0.1/8`) are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        let Some((address, prefix)) = s.split_once('/') else {
            let address: IpAddr = s
                .parse()
                .map_err(|_| NetworkParseError::InvalidAddress(s.to_string()))?;
            return Ok(Self::host(address));
        };

        let network: IpAddr = address
            .parse()
            .map_err(|_| NetworkParseError::InvalidAddress(s.to_string()))?;

        let max_prefix_len = Self::host(network).prefix_len;
        let prefix_len: u8 = prefix
            .parse()
            .ok()
            .filter(|len| *len <= max_prefix_len)
            .ok_or_else(|| NetworkParseError::InvalidPrefix(s.to_string()))?;

        let candidate = Self {
            network,
            prefix_len,
        };

        let host_bits_clear = match network {
            IpAddr::V4(v4) => u32::from(v4) & !v4_mask(prefix_len) == 0,
            IpAddr::V6(v6) => u128::from(v6) & !v6_mask(prefix_len) == 0,
        };
        if !host_bits_clear {
            return Err(NetworkParseError::HostBitsSet(s.to_string()));
        }

        Ok(candidate)
    }
}

impl fmt::Display for IpNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

/// Immutable set of networks, loaded once from configuration.
///
/// Invalid entries are dropped (and logged) when the set is built; they never
/// end up in the set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustedNetworkSet {
    networks: Vec<IpNetwork>,
}

impl TrustedNetworkSet {
    /// Build a set from already parsed networks.
    #[must_use]
    pub fn new(networks: Vec<IpNetwork>) -> Self {
        Self { networks }
    }

    /// Parse a list of network strings, dropping blank and invalid entries.
    pub fn parse<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let networks = entries
            .into_iter()
            .filter(|entry| !entry.as_ref().trim().is_empty())
            .filter_map(|entry| match entry.as_ref().parse::<IpNetwork>() {
                Ok(network) => Some(network),
                Err(e) => {
                    warn!(
                        target: "recording.net",
                        entry = %entry.as_ref(),
                        error = %e,
                        "Ignoring invalid network"
                    );
                    None
                }
            })
            .collect();

        Self { networks }
    }

    /// Returns whether the address falls within any network in the set.
    #[must_use]
    pub fn contains(&self, address: IpAddr) -> bool {
        self.networks.iter().any(|network| network.contains(address))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IpNetwork> {
        self.networks.iter()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_bare_address_is_single_host() {
        let network: IpNetwork = "192.168.57.42".parse().unwrap();
        assert_eq!(network.prefix_len(), 32);
        assert!(network.contains(ip("192.168.57.42")));
        assert!(!network.contains(ip("192.168.57.43")));

        let network: IpNetwork = "2001:db8::abc".parse().unwrap();
        assert_eq!(network.prefix_len(), 128);
    }

    #[test]
    fn test_parse_rejects_host_bits() {
        assert_eq!(
            "10.0.0.1/8".parse::<IpNetwork>(),
            Err(NetworkParseError::HostBitsSet("10.0.0.1/8".to_string()))
        );
        assert!("2001:db8::1/64".parse::<IpNetwork>().is_err());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("not-a-network".parse::<IpNetwork>().is_err());
        assert!("10.0.0.0/33".parse::<IpNetwork>().is_err());
        assert!("10.0.0.0/abc".parse::<IpNetwork>().is_err());
        assert!("2001:db8::/129".parse::<IpNetwork>().is_err());
    }

    #[test]
    fn test_zero_prefix_matches_whole_family() {
        let network: IpNetwork = "0.0.0.0/0".parse().unwrap();
        assert!(network.contains(ip("8.8.8.8")));
        assert!(!network.contains(ip("::1")));

        let network: IpNetwork = "::/0".parse().unwrap();
        assert!(network.contains(ip("2001:db8::1")));
    }

    #[test]
    fn test_display() {
        let network: IpNetwork = "10.11.12.0/24".parse().unwrap();
        assert_eq!(network.to_string(), "10.11.12.0/24");
    }

    #[test]
    fn test_set_drops_invalid_entries() {
        let set = TrustedNetworkSet::parse(["127.0.0.1", "", "bogus", "10.0.0.1/8", "::1"]);
        assert_eq!(set.len(), 2);
        assert!(set.contains(ip("127.0.0.1")));
        assert!(set.contains(ip("::1")));
        assert!(!set.contains(ip("10.0.0.1")));
    }

    #[test]
    fn test_set_membership() {
        let cases: &[(&str, &[&str], bool)] = &[
            ("192.168.57.42", &[], false),
            ("192.168.57.42", &["192.168.58.0/24"], false),
            ("192.168.57.42", &["192.168.57.0/24"], true),
            ("2001:db8::abc", &[], false),
            ("2001:db8::abc", &["2001:db8::b00/120"], false),
            ("2001:db8::abc", &["2001:db8::a00/120"], true),
            (
                "192.168.57.42",
                &["192.168.58.0/24", "2001:db8::a00/120", "192.168.57.42", "2001:db8::b00/120"],
                true,
            ),
            (
                "192.168.59.42",
                &["192.168.58.0/24", "2001:db8::a00/120", "192.168.57.42", "2001:db8::b00/120"],
                false,
            ),
            (
                "2001:db8::abc",
                &["192.168.58.0/24", "2001:db8::a00/120", "192.168.57.42", "2001:db8::b00/120"],
                true,
            ),
            (
                "2001:db8::cbc",
                &["192.168.58.0/24", "2001:db8::a00/120", "192.168.57.42", "2001:db8::b00/120"],
                false,
            ),
        ];

        for (address, networks, expected) in cases {
            let set = TrustedNetworkSet::parse(networks.iter());
            assert_eq!(
                set.contains(ip(address)),
                *expected,
                "{} in {:?}",
                address,
                networks
            );
        }
    }
}
