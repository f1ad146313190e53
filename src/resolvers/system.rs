//! Implementation of [Resolver] using the system's hostname lookup.

use crate::address_set::{AddressSet, Source};
use crate::host::Hostname;
use crate::resolver::{ResolveError, Resolver};

use async_trait::async_trait;
use tracing::{event, instrument, Level};

/// A [`Resolver`] which performs a plain system lookup.
///
/// Every address is tagged with [Source::Direct].
#[derive(Clone, Debug, Default)]
pub struct SystemResolver {}

impl SystemResolver {
    pub fn new() -> Self {
        Self {}
    }
}

#[async_trait]
impl Resolver for SystemResolver {
    #[instrument(skip(self), name = "SystemResolver::resolve")]
    async fn resolve(&self, hostname: &Hostname) -> Result<AddressSet, ResolveError> {
        // The port is required by the lookup API, but is irrelevant here.
        let addresses: AddressSet = tokio::net::lookup_host((hostname.as_str(), 0))
            .await
            .map_err(|source| ResolveError::SystemLookup {
                hostname: hostname.clone(),
                source,
            })?
            .map(|address| (address.ip(), Source::Direct))
            .collect();
        event!(Level::DEBUG, count = addresses.len(), "System lookup complete");
        if addresses.is_empty() {
            return Err(ResolveError::NoAddresses(hostname.clone()));
        }
        Ok(addresses)
    }
}
