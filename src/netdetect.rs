use anyhow::Result;
use if_addrs::{get_if_addrs, IfAddr};
use ipnet::Ipv4Net;
use std::net::Ipv4Addr;

/// Source of the local `/24` prefix (e.g. `192.168.1`) to sweep.
pub trait SubnetResolver: Send + Sync {
    /// Returns `None` when there is no usable local IPv4 network.
    fn resolve(&self) -> Option<String>;
}

/// Resolves the subnet from the host's network interfaces.
#[derive(Debug, Clone, Copy, Default)]
pub struct InterfaceResolver;

impl SubnetResolver for InterfaceResolver {
    fn resolve(&self) -> Option<String> {
        match first_lan_ipv4() {
            Ok(ip) => ip.map(subnet_prefix),
            Err(e) => {
                tracing::debug!("failed to read network interfaces: {e}");
                None
            }
        }
    }
}

/// A fixed prefix, for callers that already know which network to sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticSubnet(pub String);

impl SubnetResolver for StaticSubnet {
    fn resolve(&self) -> Option<String> {
        prefix_to_cidr(&self.0).map(|_| self.0.trim().to_string())
    }
}

impl StaticSubnet {
    /// Resolve `resolver` once and freeze the answer, so a whole scan and its
    /// report agree on the subnet even if the interface changes mid-scan.
    pub fn snapshot(resolver: &dyn SubnetResolver) -> Option<Self> {
        resolver.resolve().map(StaticSubnet)
    }
}

impl<R: SubnetResolver> SubnetResolver for Option<R> {
    fn resolve(&self) -> Option<String> {
        self.as_ref().and_then(R::resolve)
    }
}

/// The first non-loopback, non-link-local IPv4 address on any interface.
pub fn first_lan_ipv4() -> Result<Option<Ipv4Addr>> {
    for iface in get_if_addrs()? {
        if let IfAddr::V4(v4) = iface.addr {
            let ip = v4.ip;
            if ip.is_loopback() || ip.is_link_local() || ip.is_unspecified() {
                continue;
            }
            return Ok(Some(ip));
        }
    }
    Ok(None)
}

/// Dotted first three octets of `ip`: `192.168.1.42` becomes `192.168.1`.
pub fn subnet_prefix(ip: Ipv4Addr) -> String {
    let o = ip.octets();
    format!("{}.{}.{}", o[0], o[1], o[2])
}

/// Parse a three-octet prefix into its `/24` network. Anything else is `None`.
pub fn prefix_to_cidr(prefix: &str) -> Option<Ipv4Net> {
    let mut octets = [0u8; 4];
    let mut parts = prefix.trim().split('.');
    for slot in octets.iter_mut().take(3) {
        *slot = parts.next()?.parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Ipv4Net::new(Ipv4Addr::from(octets), 24).ok()
}

/// Host addresses `prefix.1 ..= prefix.254`, as strings, in order.
pub fn subnet_hosts(prefix: &str) -> Vec<String> {
    (1..=254u8).map(|host| format!("{prefix}.{host}")).collect()
}
