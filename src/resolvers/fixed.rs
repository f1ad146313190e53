//! Implementation of [Resolver] that always returns a fixed set of addresses.

use crate::address_set::{AddressSet, Source};
use crate::host::Hostname;
use crate::resolver::{ResolveError, Resolver};

use async_trait::async_trait;
use std::net::IpAddr;

/// A [`Resolver`] that always returns the same addresses, tagged as
/// [Source::Direct], regardless of hostname.
#[derive(Clone, Debug)]
pub struct FixedResolver {
    addresses: AddressSet,
}

impl FixedResolver {
    pub fn new(addrs: impl IntoIterator<Item = IpAddr>) -> FixedResolver {
        let addresses = addrs
            .into_iter()
            .map(|address| (address, Source::Direct))
            .collect();
        FixedResolver { addresses }
    }
}

#[async_trait]
impl Resolver for FixedResolver {
    async fn resolve(&self, hostname: &Hostname) -> Result<AddressSet, ResolveError> {
        if self.addresses.is_empty() {
            return Err(ResolveError::NoAddresses(hostname.clone()));
        }
        Ok(self.addresses.clone())
    }
}
