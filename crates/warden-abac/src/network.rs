//! Source address classification.

use std::net::IpAddr;
use std::sync::LazyLock;

use ipnet::IpNet;

use crate::config::ConfigError;

/// Private IPv4 ranges from RFC 1918.
pub const RFC1918_NETWORKS: [&str; 3] = ["10.0.0.0/8", "172.16.0.0/12", "192.168.0.0/16"];

static DEFAULT_NETWORKS: LazyLock<InternalNetworks> = LazyLock::new(InternalNetworks::rfc1918);

/// A set of CIDR ranges treated as internal.
///
/// Loopback addresses and the literal `localhost` are always internal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalNetworks {
    networks: Vec<IpNet>,
}

impl InternalNetworks {
    pub fn parse<S: AsRef<str>>(cidrs: &[S]) -> Result<Self, ConfigError> {
        let networks = cidrs
            .iter()
            .map(|cidr| {
                parse_network(cidr.as_ref()).ok_or_else(|| ConfigError::InvalidNetwork {
                    network: cidr.as_ref().to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { networks })
    }

    pub fn rfc1918() -> Self {
        Self {
            networks: RFC1918_NETWORKS
                .iter()
                .filter_map(|cidr| parse_network(cidr))
                .collect(),
        }
    }

    /// Returns `true` if `ip` is loopback, `localhost`, or inside one of the
    /// configured ranges. Unparsable input is external.
    pub fn contains(&self, ip: &str) -> bool {
        let ip = ip.trim();
        if ip.eq_ignore_ascii_case("localhost") {
            return true;
        }
        match parse_addr(ip) {
            Some(addr) => addr.is_loopback() || self.networks.iter().any(|net| net.contains(&addr)),
            None => false,
        }
    }
}

/// Classifies `ip` against the RFC 1918 ranges.
pub fn is_internal_ip(ip: &str) -> bool {
    DEFAULT_NETWORKS.contains(ip)
}

/// Returns the /24 network of an IPv4 address, e.g. `10.0.1.50` → `10.0.1.0/24`.
///
/// IPv4-mapped IPv6 addresses are treated as IPv4. Anything else is
/// returned unchanged.
pub fn ip_subnet(ip: &str) -> String {
    match parse_addr(ip) {
        Some(IpAddr::V4(addr)) => {
            let [a, b, c, _] = addr.octets();
            format!("{a}.{b}.{c}.0/24")
        }
        _ => ip.to_string(),
    }
}

/// CIDR membership. A bare address is treated as a single-host range.
///
/// Returns `None` when either side does not parse.
pub fn cidr_contains(cidr: &str, ip: &str) -> Option<bool> {
    let network = parse_network(cidr)?;
    let addr = parse_addr(ip)?;
    Some(network.contains(&addr))
}

/// Parses an address, unwrapping IPv4-mapped IPv6 (`::ffff:10.0.0.1`).
fn parse_addr(ip: &str) -> Option<IpAddr> {
    ip.trim().parse::<IpAddr>().ok().map(|addr| addr.to_canonical())
}

fn parse_network(cidr: &str) -> Option<IpNet> {
    let cidr = cidr.trim();
    cidr.parse::<IpNet>()
        .ok()
        .or_else(|| cidr.parse::<IpAddr>().ok().map(IpNet::from))
}
