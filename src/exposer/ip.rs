use std::sync::Arc;

use eyre::{Context, Result};
use ipnet::IpNet;

use crate::cidrs;
use crate::ip::{IpSet, IpSetProvider};

/// Wildcard address used when no bind CIDRs are configured.
const WILDCARD_IP: &str = "0.0.0.0";

/// An [`IpSetProvider`] that filters the underlying provider by a list of
/// bind CIDRs.
///
/// With no CIDRs configured it returns the wildcard address as the only
/// entry, so downstream code treats "bind on all interfaces" as an ordinary
/// one-element IP set.
pub struct FilteringIpSetProvider {
    bind_cidrs: Vec<IpNet>,
    underlying: Arc<dyn IpSetProvider>,
}

impl FilteringIpSetProvider {
    pub fn new(bind_cidrs: &[String], underlying: Arc<dyn IpSetProvider>) -> Result<Self> {
        let bind_cidrs = bind_cidrs
            .iter()
            .map(|s| {
                s.parse()
                    .with_context(|| format!("failed to parse bind CIDR {s:?}"))
            })
            .collect::<Result<Vec<IpNet>>>()?;

        Ok(Self {
            bind_cidrs,
            underlying,
        })
    }
}

impl IpSetProvider for FilteringIpSetProvider {
    fn get(&self) -> Result<IpSet> {
        if self.bind_cidrs.is_empty() {
            return Ok(IpSet::from([WILDCARD_IP.to_string()]));
        }

        let all = self
            .underlying
            .get()
            .context("failed to get host IP addresses")?;

        Ok(cidrs::filter_ip_set(&self.bind_cidrs, &all, |ip, err| {
            debug!("failed to parse IP address {ip:?}: {err}");
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockProvider {
        ips: &'static [&'static str],
    }

    impl IpSetProvider for MockProvider {
        fn get(&self) -> Result<IpSet> {
            Ok(self.ips.iter().map(|ip| ip.to_string()).collect())
        }
    }

    struct PanicProvider;

    impl IpSetProvider for PanicProvider {
        fn get(&self) -> Result<IpSet> {
            panic!("must not be called when no CIDRs are configured");
        }
    }

    fn cidrs(cidrs: &[&str]) -> Vec<String> {
        cidrs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn rejects_malformed_cidrs() {
        assert!(FilteringIpSetProvider::new(&cidrs(&["not-a-cidr"]), Arc::new(PanicProvider)).is_err());
        assert!(
            FilteringIpSetProvider::new(&cidrs(&["192.168.0.0/16", "bad"]), Arc::new(PanicProvider))
                .is_err()
        );
    }

    #[test]
    fn no_cidrs_yield_the_wildcard_set() {
        let provider = FilteringIpSetProvider::new(&[], Arc::new(PanicProvider)).unwrap();

        assert_eq!(provider.get().unwrap(), IpSet::from(["0.0.0.0".to_string()]));
    }

    #[test]
    fn filters_the_underlying_set() {
        let underlying = Arc::new(MockProvider {
            ips: &["192.168.2.42", "172.20.0.42", "10.5.0.1"],
        });

        let provider = FilteringIpSetProvider::new(
            &cidrs(&["192.168.0.0/16", "172.20.0.0/16"]),
            underlying,
        )
        .unwrap();

        let expected: IpSet = ["192.168.2.42", "172.20.0.42"]
            .iter()
            .map(|ip| ip.to_string())
            .collect();

        assert_eq!(provider.get().unwrap(), expected);
    }
}
