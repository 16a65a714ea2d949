use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use ipnetwork::{IpNetwork, Ipv4Network, Ipv6Network};

/// Version tag of the Cloudflare IP ranges embedded in [`TrustedIps::cloudflare()`].
pub const CF_IPS_VERSION: &str = "2025-12";

/// See <https://www.cloudflare.com/ips-v4>.
const CF_IPV4_RANGES: [([u8; 4], u8); 15] = [
    ([173, 245, 48, 0], 20),
    ([103, 21, 244, 0], 22),
    ([103, 22, 200, 0], 22),
    ([103, 31, 4, 0], 22),
    ([141, 101, 64, 0], 18),
    ([108, 162, 192, 0], 18),
    ([190, 93, 240, 0], 20),
    ([188, 114, 96, 0], 20),
    ([197, 234, 240, 0], 22),
    ([198, 41, 128, 0], 17),
    ([162, 158, 0, 0], 15),
    ([104, 16, 0, 0], 13),
    ([104, 24, 0, 0], 14),
    ([172, 64, 0, 0], 13),
    ([131, 0, 72, 0], 22),
];

/// See <https://www.cloudflare.com/ips-v6>.
const CF_IPV6_RANGES: [([u16; 8], u8); 7] = [
    ([0x2400, 0xcb00, 0, 0, 0, 0, 0, 0], 32),
    ([0x2606, 0x4700, 0, 0, 0, 0, 0, 0], 32),
    ([0x2803, 0xf800, 0, 0, 0, 0, 0, 0], 32),
    ([0x2405, 0xb500, 0, 0, 0, 0, 0, 0], 32),
    ([0x2405, 0x8100, 0, 0, 0, 0, 0, 0], 32),
    ([0x2a06, 0x98c0, 0, 0, 0, 0, 0, 0], 29),
    ([0x2c0f, 0xf248, 0, 0, 0, 0, 0, 0], 32),
];

/// Trusted IP ranges.
///
/// Ranges are kept partitioned by address family so that a lookup only ever compares against
/// networks of the same family.
///
/// Once shared between workers (usually through a [`Snapshot`](crate::Snapshot)), a set should be
/// replaced as a whole rather than modified.
///
/// # Examples
/// ```
/// use std::net::IpAddr;
///
/// use actix_cloudflare_gate::TrustedIps;
///
/// let ips = TrustedIps::cloudflare().with_ip_range("10.0.1.0/24".parse().unwrap());
///
/// assert!(ips.contains(IpAddr::from([103, 21, 244, 1])));
/// assert!(ips.contains(IpAddr::from([10, 0, 1, 42])));
/// assert!(!ips.contains(IpAddr::from([127, 0, 0, 1])));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustedIps {
    ipv4: Vec<Ipv4Network>,
    ipv6: Vec<Ipv6Network>,
}

impl TrustedIps {
    /// Constructs an empty set that trusts nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Constructs the set of Cloudflare's published IP ranges, as of [`CF_IPS_VERSION`].
    ///
    /// Use [`fetch_trusted_cf_ips`](crate::fetch_trusted_cf_ips) to obtain the current list.
    pub fn cloudflare() -> Self {
        let ipv4 = CF_IPV4_RANGES
            .iter()
            .filter_map(|&(addr, prefix)| Ipv4Network::new(Ipv4Addr::from(addr), prefix).ok())
            .collect();

        let ipv6 = CF_IPV6_RANGES
            .iter()
            .filter_map(|&(addr, prefix)| Ipv6Network::new(Ipv6Addr::from(addr), prefix).ok())
            .collect();

        Self { ipv4, ipv6 }
    }

    /// Add trusted IP range to list.
    pub fn with_ip_range(mut self, cidr: IpNetwork) -> Self {
        self.push(cidr);
        self
    }

    pub(crate) fn push(&mut self, cidr: IpNetwork) {
        match cidr {
            IpNetwork::V4(net) => self.ipv4.push(net),
            IpNetwork::V6(net) => self.ipv6.push(net),
        }
    }

    /// Returns true if `ip` is inside one of the trusted ranges.
    ///
    /// IPv4-mapped IPv6 addresses (e.g., `::ffff:103.21.244.1`), which are reported for IPv4 peers
    /// on dual-stack listeners, are matched against the IPv4 ranges.
    pub fn contains(&self, ip: IpAddr) -> bool {
        match ip.to_canonical() {
            IpAddr::V4(ip) => self.ipv4.iter().any(|net| net.contains(ip)),
            IpAddr::V6(ip) => self.ipv6.iter().any(|net| net.contains(ip)),
        }
    }

    /// Returns true if `ip` parses as an IP address inside one of the trusted ranges.
    ///
    /// Strings that are not IP addresses are never trusted.
    pub fn contains_str(&self, ip: &str) -> bool {
        ip.trim()
            .parse::<IpAddr>()
            .map_or(false, |ip| self.contains(ip))
    }

    /// Returns true if a peer address is known and inside one of the trusted ranges.
    pub fn contains_peer(&self, peer_addr: Option<SocketAddr>) -> bool {
        peer_addr.map_or(false, |addr| self.contains(addr.ip()))
    }

    /// Returns the trusted IPv4 ranges.
    pub fn ipv4_ranges(&self) -> &[Ipv4Network] {
        &self.ipv4
    }

    /// Returns the trusted IPv6 ranges.
    pub fn ipv6_ranges(&self) -> &[Ipv6Network] {
        &self.ipv6
    }

    /// Returns the total number of trusted ranges.
    pub fn len(&self) -> usize {
        self.ipv4.len() + self.ipv6.len()
    }

    /// Returns true if no ranges are trusted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<IpNetwork> for TrustedIps {
    fn from_iter<I: IntoIterator<Item = IpNetwork>>(iter: I) -> Self {
        let mut ips = Self::new();
        ips.extend(iter);
        ips
    }
}

impl Extend<IpNetwork> for TrustedIps {
    fn extend<I: IntoIterator<Item = IpNetwork>>(&mut self, iter: I) {
        for cidr in iter {
            self.push(cidr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(ip: &str) -> IpAddr {
        ip.parse().unwrap()
    }

    #[test]
    fn embedded_list_is_complete() {
        let ips = TrustedIps::cloudflare();
        assert_eq!(ips.ipv4_ranges().len(), CF_IPV4_RANGES.len());
        assert_eq!(ips.ipv6_ranges().len(), CF_IPV6_RANGES.len());
        assert_eq!(ips.len(), 22);
    }

    #[test]
    fn block_boundaries() {
        let ips = TrustedIps::cloudflare();

        // 103.21.244.0/22
        assert!(!ips.contains(ip("103.21.243.255")));
        assert!(ips.contains(ip("103.21.244.0")));
        assert!(ips.contains(ip("103.21.244.1")));
        assert!(ips.contains(ip("103.21.247.255")));
        assert!(!ips.contains(ip("103.21.248.0")));

        // 198.41.128.0/17
        assert!(!ips.contains(ip("198.41.127.255")));
        assert!(ips.contains(ip("198.41.128.0")));
        assert!(ips.contains(ip("198.41.255.255")));
        assert!(!ips.contains(ip("198.42.0.0")));

        // 2a06:98c0::/29
        assert!(!ips.contains(ip("2a06:98bf:ffff:ffff:ffff:ffff:ffff:ffff")));
        assert!(ips.contains(ip("2a06:98c0::")));
        assert!(ips.contains(ip("2a06:98c7:ffff:ffff:ffff:ffff:ffff:ffff")));
        assert!(!ips.contains(ip("2a06:98c8::")));
    }

    #[test]
    fn untrusted_addresses() {
        let ips = TrustedIps::cloudflare();

        assert!(!ips.contains(ip("127.0.0.1")));
        assert!(!ips.contains(ip("10.0.1.1")));
        assert!(!ips.contains(ip("::1")));
        assert!(!ips.contains(ip("0.0.0.0")));
    }

    #[test]
    fn families_do_not_cross_match() {
        let ips = TrustedIps::new().with_ip_range("0.0.0.0/0".parse().unwrap());

        assert!(ips.contains(ip("8.8.8.8")));
        assert!(!ips.contains(ip("2606:4700::1")));
    }

    #[test]
    fn ipv4_mapped_peers() {
        let ips = TrustedIps::cloudflare();

        assert!(ips.contains(ip("::ffff:103.21.244.1")));
        assert!(!ips.contains(ip("::ffff:127.0.0.1")));
    }

    #[test]
    fn empty_set_trusts_nothing() {
        let ips = TrustedIps::new();
        assert!(ips.is_empty());
        assert!(!ips.contains(ip("103.21.244.1")));
    }

    #[test]
    fn additional_ranges() {
        let ips = TrustedIps::cloudflare().with_ip_range("10.0.1.0/24".parse().unwrap());

        assert!(ips.contains(ip("10.0.1.1")));
        assert!(!ips.contains(ip("10.0.2.1")));
    }

    #[test]
    fn from_iterator() {
        let ips = ["103.21.244.0/22", "2400:cb00::/32"]
            .into_iter()
            .map(|cidr| cidr.parse::<IpNetwork>().unwrap())
            .collect::<TrustedIps>();

        assert_eq!(ips.ipv4_ranges().len(), 1);
        assert_eq!(ips.ipv6_ranges().len(), 1);
        assert!(ips.contains(ip("2400:cb00::1")));
    }

    #[test]
    fn malformed_input_fails_closed() {
        let ips = TrustedIps::cloudflare();

        assert!(ips.contains_str("103.21.244.1"));
        assert!(ips.contains_str(" 103.21.244.1 "));
        assert!(!ips.contains_str(""));
        assert!(!ips.contains_str("103.21.244"));
        assert!(!ips.contains_str("103.21.244.1:443"));
        assert!(!ips.contains_str("cloudflare"));
    }

    #[test]
    fn peer_addresses() {
        let ips = TrustedIps::cloudflare();

        assert!(ips.contains_peer(Some("103.21.244.1:27432".parse().unwrap())));
        assert!(!ips.contains_peer(Some("127.0.0.1:27432".parse().unwrap())));
        assert!(!ips.contains_peer(None));
    }
}
