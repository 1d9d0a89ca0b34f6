//! Client network allow-list.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use tracing::warn;

use crate::config::ConfigError;

/// An IPv4 or IPv6 network in CIDR form. A bare address is a single-host
/// network (`/32` or `/128`). Host bits are masked off on parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpNetwork {
    V4 { base: Ipv4Addr, prefix: u8 },
    V6 { base: Ipv6Addr, prefix: u8 },
}

fn v4_mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - prefix as u32)
    }
}

fn v6_mask(prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - prefix as u32)
    }
}

impl IpNetwork {
    /// Whether `ip` lies inside this network. IPv4-mapped IPv6 addresses
    /// are compared as IPv4.
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self, ip.to_canonical()) {
            (IpNetwork::V4 { base, prefix }, IpAddr::V4(ip)) => {
                u32::from(ip) & v4_mask(*prefix) == u32::from(*base)
            }
            (IpNetwork::V6 { base, prefix }, IpAddr::V6(ip)) => {
                u128::from(ip) & v6_mask(*prefix) == u128::from(*base)
            }
            _ => false,
        }
    }
}

impl FromStr for IpNetwork {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s, None),
        };

        let addr: IpAddr = addr
            .trim()
            .parse()
            .map_err(|_| format!("invalid IP address: {}", s))?;

        let max = if addr.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix {
            Some(p) => p
                .trim()
                .parse::<u8>()
                .ok()
                .filter(|p| *p <= max)
                .ok_or_else(|| format!("invalid prefix length: {}", s))?,
            None => max,
        };

        Ok(match addr {
            IpAddr::V4(ip) => IpNetwork::V4 {
                base: Ipv4Addr::from(u32::from(ip) & v4_mask(prefix)),
                prefix,
            },
            IpAddr::V6(ip) => IpNetwork::V6 {
                base: Ipv6Addr::from(u128::from(ip) & v6_mask(prefix)),
                prefix,
            },
        })
    }
}

impl fmt::Display for IpNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpNetwork::V4 { base, prefix } => write!(f, "{}/{}", base, prefix),
            IpNetwork::V6 { base, prefix } => write!(f, "{}/{}", base, prefix),
        }
    }
}

/// Networks allowed to reach the gateway. Empty means every address is
/// allowed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    networks: Vec<IpNetwork>,
}

impl AllowList {
    pub fn new(networks: Vec<IpNetwork>) -> Self {
        Self { networks }
    }

    /// Parse a comma-separated list of addresses and CIDR blocks.
    ///
    /// Invalid entries are logged and skipped. A non-empty list in which no
    /// entry parses is an error, so a typo cannot open the gate.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let tokens: Vec<&str> = raw
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect();

        let mut networks = Vec::with_capacity(tokens.len());
        for token in &tokens {
            match token.parse::<IpNetwork>() {
                Ok(network) => networks.push(network),
                Err(reason) => warn!("Skipping allow-list entry: {}", reason),
            }
        }

        if !tokens.is_empty() && networks.is_empty() {
            return Err(ConfigError::InvalidAllowList(raw.to_string()));
        }

        Ok(Self { networks })
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        self.networks.iter().any(|network| network.contains(ip))
    }

    pub fn networks(&self) -> &[IpNetwork] {
        &self.networks
    }
}
