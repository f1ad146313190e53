//! The set of addresses discovered for a hostname, and who reported them.

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::sync::Arc;

/// Describes who reported an address.
#[derive(Clone, PartialEq, Eq, Ord, PartialOrd, Debug, Hash)]
pub enum Source {
    /// The address came from a plain system lookup.
    Direct,
    /// The address came from the named authoritative nameserver.
    Nameserver(Arc<str>),
}

impl Source {
    pub fn nameserver(name: impl ToString) -> Self {
        Self::Nameserver(name.to_string().into())
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Direct => f.write_str("direct"),
            Source::Nameserver(name) => f.write_str(name),
        }
    }
}

/// Maps each discovered IP address to the sources which reported it.
///
/// An address appears at most once, and once present always has at least
/// one source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AddressSet {
    addresses: BTreeMap<IpAddr, BTreeSet<Source>>,
}

impl AddressSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `source` reported `ip`. Repeated calls are no-ops.
    pub fn add(&mut self, ip: IpAddr, source: Source) {
        self.addresses.entry(ip).or_default().insert(source);
    }

    /// Returns the unique addresses in the set.
    pub fn ips(&self) -> BTreeSet<IpAddr> {
        self.addresses.keys().copied().collect()
    }

    /// Returns, for every address, the sources which reported it.
    pub fn ip_to_sources(&self) -> BTreeMap<IpAddr, Vec<Source>> {
        self.addresses
            .iter()
            .map(|(ip, sources)| (*ip, sources.iter().cloned().collect()))
            .collect()
    }

    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.addresses.contains_key(ip)
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

impl Extend<(IpAddr, Source)> for AddressSet {
    fn extend<T: IntoIterator<Item = (IpAddr, Source)>>(&mut self, iter: T) {
        for (ip, source) in iter {
            self.add(ip, source);
        }
    }
}

impl FromIterator<(IpAddr, Source)> for AddressSet {
    fn from_iter<T: IntoIterator<Item = (IpAddr, Source)>>(iter: T) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}
