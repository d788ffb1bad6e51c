use std::collections::BTreeSet;

use eyre::Result;

use crate::memoizer::Memoizer;

pub mod collector;
pub mod loadbalancer;
pub mod mapper;
pub mod tracker;

/// Set of host IP addresses in canonical textual form.
pub type IpSet = BTreeSet<String>;

/// Supplies the current set of host IP addresses.
pub trait IpSetProvider: Send + Sync {
    fn get(&self) -> Result<IpSet>;
}

/// Re-reads the set of host IP addresses, bypassing any cache.
pub trait IpSetRefresher: Send + Sync {
    fn refresh(&self) -> Result<IpSet>;
}

impl IpSetProvider for Memoizer<IpSet> {
    fn get(&self) -> Result<IpSet> {
        Memoizer::get(self)
    }
}

impl IpSetRefresher for Memoizer<IpSet> {
    fn refresh(&self) -> Result<IpSet> {
        Memoizer::refresh(self)
    }
}
