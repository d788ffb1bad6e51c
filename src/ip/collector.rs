use std::net::IpAddr;

use eyre::{Context, Result};

use super::IpSet;

/// Collects the IP addresses assigned to all network interfaces.
#[derive(Debug, Clone, Copy)]
pub struct Collector;

impl Collector {
    pub fn new() -> Self {
        Self
    }

    pub fn get(&self) -> Result<IpSet> {
        let addrs =
            nix::ifaddrs::getifaddrs().context("failed to enumerate interface addresses")?;

        let mut ips = IpSet::new();

        for ifaddr in addrs {
            let Some(addr) = ifaddr.address else {
                continue;
            };

            if let Some(v4) = addr.as_sockaddr_in() {
                ips.insert(IpAddr::from(v4.ip()).to_string());
            } else if let Some(v6) = addr.as_sockaddr_in6() {
                ips.insert(IpAddr::from(v6.ip()).to_string());
            }
        }

        Ok(ips)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enumerates_interface_addresses() {
        let ips = Collector::new().get().unwrap();

        // every machine running the test suite has at least a loopback
        assert!(!ips.is_empty());

        for ip in &ips {
            ip.parse::<IpAddr>().unwrap();
        }
    }
}
