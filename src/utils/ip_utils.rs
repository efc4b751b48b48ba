use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// IP utility functions for address classification

/// Check if a string is a valid IP address (IPv4 or IPv6)
pub fn is_valid_ip(ip: &str) -> bool {
    ip.parse::<IpAddr>().is_ok()
}

/// Check if an IP address is private (RFC 1918 for IPv4, RFC 4193 for IPv6)
pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => ipv4.is_private(),
        // RFC 4193 Unique Local Addresses (fc00::/7)
        IpAddr::V6(ipv6) => ipv6.segments()[0] & 0xfe00 == 0xfc00,
    }
}

/// Errors from parsing a CIDR block
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CidrError {
    #[error("CIDR '{0}' is missing a '/prefix'")]
    MissingPrefix(String),
    #[error("Invalid network address in CIDR '{0}'")]
    InvalidAddress(String),
    #[error("Invalid prefix length in CIDR '{0}'")]
    InvalidPrefix(String),
}

/// An address block such as `192.168.1.0/24` or `fd00::/8`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    network: IpAddr,
    prefix: u8,
}

impl Cidr {
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn network(&self) -> IpAddr {
        self.network
    }

    /// Whether `ip` falls inside this block (families must match)
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                let mask = prefix_mask_u32(self.prefix);
                (u32::from(net) & mask) == (u32::from(*addr) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                let mask = prefix_mask_u128(self.prefix);
                (u128::from(net) & mask) == (u128::from(*addr) & mask)
            }
            _ => false,
        }
    }
}

fn prefix_mask_u32(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

fn prefix_mask_u128(prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(prefix))
    }
}

impl FromStr for Cidr {
    type Err = CidrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| CidrError::MissingPrefix(s.to_string()))?;
        let network: IpAddr = addr
            .parse()
            .map_err(|_| CidrError::InvalidAddress(s.to_string()))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| CidrError::InvalidPrefix(s.to_string()))?;
        let max = if network.is_ipv4() { 32 } else { 128 };
        if prefix > max {
            return Err(CidrError::InvalidPrefix(s.to_string()));
        }
        Ok(Cidr { network, prefix })
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ip_validation() {
        assert!(is_valid_ip("192.168.1.1"));
        assert!(is_valid_ip("2001:db8::1"));
        assert!(!is_valid_ip("256.1.1.1"));
        assert!(!is_valid_ip("gateway"));
    }

    #[test]
    fn test_private_ranges() {
        let private = ["10.1.2.3", "172.16.0.1", "172.31.255.1", "192.168.0.1", "fd12::1"];
        for ip in private {
            assert!(is_private_ip(&ip.parse().unwrap()), "{} should be private", ip);
        }
        let public = ["8.8.8.8", "172.32.0.1", "2001:db8::1"];
        for ip in public {
            assert!(!is_private_ip(&ip.parse().unwrap()), "{} should be public", ip);
        }
    }

    #[test]
    fn test_cidr_contains() {
        let lan: Cidr = "192.168.1.0/24".parse().unwrap();
        assert!(lan.contains(&"192.168.1.77".parse().unwrap()));
        assert!(!lan.contains(&"192.168.2.1".parse().unwrap()));
        assert!(!lan.contains(&"fd00::1".parse().unwrap()));

        let all: Cidr = "0.0.0.0/0".parse().unwrap();
        assert!(all.contains(&"8.8.8.8".parse().unwrap()));

        let v6: Cidr = "fd00::/8".parse().unwrap();
        assert!(v6.contains(&"fd12:3456::1".parse().unwrap()));
    }

    #[test]
    fn test_cidr_parse_errors() {
        assert!(matches!("192.168.1.0".parse::<Cidr>(), Err(CidrError::MissingPrefix(_))));
        assert!(matches!("nope/24".parse::<Cidr>(), Err(CidrError::InvalidAddress(_))));
        assert!(matches!("10.0.0.0/33".parse::<Cidr>(), Err(CidrError::InvalidPrefix(_))));
        assert_eq!("10.0.0.0/8".parse::<Cidr>().unwrap().to_string(), "10.0.0.0/8");
    }
}
