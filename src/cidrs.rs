use std::net::{AddrParseError, IpAddr};

use ipnet::IpNet;

use crate::ip::IpSet;

/// Filters an IP set by a list of CIDRs.
///
/// An entry survives when it parses as an address and is contained in at
/// least one CIDR; the canonical form of the parsed address is emitted, not
/// the input string. Unparseable entries are passed to `err_sink` and
/// skipped. An empty CIDR list filters everything out.
pub fn filter_ip_set<F>(cidrs: &[IpNet], ips: &IpSet, mut err_sink: F) -> IpSet
where
    F: FnMut(&str, &AddrParseError),
{
    let mut filtered = IpSet::new();

    for ip in ips {
        let parsed: IpAddr = match ip.parse() {
            Ok(x) => x,
            Err(e) => {
                err_sink(ip, &e);
                continue;
            }
        };

        if cidrs.iter().any(|cidr| cidr.contains(&parsed)) {
            filtered.insert(parsed.to_string());
        }
    }

    filtered
}
