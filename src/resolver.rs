//! The interface for the resolver, which finds the addresses behind a host.

use crate::address_set::AddressSet;
use crate::host::Hostname;
use crate::transport::ExchangeError;

use async_trait::async_trait;
use hickory_resolver::proto::rr::RecordType;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("{hostname} is not a valid DNS name")]
    InvalidName {
        hostname: Hostname,
        #[source]
        source: hickory_resolver::proto::error::ProtoError,
    },

    #[error("NS lookup for {hostname} failed")]
    NameserverLookup {
        hostname: Hostname,
        #[source]
        source: ExchangeError,
    },

    #[error("address lookup for nameserver {nameserver} failed")]
    NameserverAddress {
        nameserver: String,
        #[source]
        source: ExchangeError,
    },

    #[error("nameserver {0} has no IPv4 address")]
    NameserverUnreachable(String),

    #[error("A lookup for {hostname} via nameserver {nameserver} failed")]
    AddressLookup {
        hostname: Hostname,
        nameserver: String,
        #[source]
        source: ExchangeError,
    },

    #[error("expected {expected} record for {name}, found {found}")]
    UnexpectedRecord {
        name: String,
        expected: RecordType,
        found: RecordType,
    },

    #[error("no nameservers found for {0}")]
    NoNameservers(Hostname),

    #[error("no addresses found for {0}")]
    NoAddresses(Hostname),

    #[error("system lookup for {hostname} failed")]
    SystemLookup {
        hostname: Hostname,
        #[source]
        source: std::io::Error,
    },
}

impl ResolveError {
    #[cfg(feature = "probes")]
    // Convert to a static string for USDT probes.
    pub(crate) const fn as_str(&self) -> &'static str {
        match self {
            ResolveError::InvalidName { .. } => "InvalidName",
            ResolveError::NameserverLookup { .. } => "NameserverLookup",
            ResolveError::NameserverAddress { .. } => "NameserverAddress",
            ResolveError::NameserverUnreachable(_) => "NameserverUnreachable",
            ResolveError::AddressLookup { .. } => "AddressLookup",
            ResolveError::UnexpectedRecord { .. } => "UnexpectedRecord",
            ResolveError::NoNameservers(_) => "NoNameservers",
            ResolveError::NoAddresses(_) => "NoAddresses",
            ResolveError::SystemLookup { .. } => "SystemLookup",
        }
    }
}

/// Translates a hostname into the set of addresses it may resolve to.
///
/// The resolver reports every address it can find, along with where it
/// found it, but does not track the health of those addresses.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, hostname: &Hostname) -> Result<AddressSet, ResolveError>;
}

/// Helper type for anything that implements the Resolver interface.
pub type SharedResolver = Arc<dyn Resolver>;
