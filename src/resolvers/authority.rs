//! Implementation of [Resolver] which asks each authoritative nameserver

use crate::address_set::{AddressSet, Source};
use crate::host::Hostname;
use crate::resolver::{ResolveError, Resolver};
use crate::transport::SharedTransport;

use async_trait::async_trait;
use hickory_resolver::proto::rr::{Name, RData, RecordType};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tracing::{event, instrument, Level};

// Which recursive resolver do we ask for the NS records?
pub const DEFAULT_PUBLIC_RESOLVER: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)), 53);

// Which port do authoritative nameservers listen on?
pub const DEFAULT_NAMESERVER_PORT: u16 = 53;

/// Configuration options to tweak authority resolution.
#[derive(Clone, Debug)]
pub struct AuthorityResolverConfig {
    /// The recursive resolver used to find nameservers, and their addresses.
    ///
    /// Default: 8.8.8.8:53
    pub public_resolver: SocketAddr,

    /// The port used when querying a nameserver directly.
    ///
    /// Default: 53
    pub nameserver_port: u16,
}

impl Default for AuthorityResolverConfig {
    fn default() -> Self {
        Self {
            public_resolver: DEFAULT_PUBLIC_RESOLVER,
            nameserver_port: DEFAULT_NAMESERVER_PORT,
        }
    }
}

/// Resolves a hostname by asking every one of its nameservers for A records.
///
/// Each address is tagged with the nameserver(s) that returned it. This
/// follows exactly one level of delegation: the NS records are read from the
/// public resolver, and the A records from the nameservers themselves.
///
/// A failure talking to any single nameserver fails the whole resolution.
pub struct AuthorityResolver {
    transport: SharedTransport,
    config: AuthorityResolverConfig,
}

impl AuthorityResolver {
    pub fn new(transport: SharedTransport, config: AuthorityResolverConfig) -> Self {
        Self { transport, config }
    }

    async fn nameservers(&self, hostname: &Hostname, name: &Name) -> Result<Vec<Name>, ResolveError> {
        let answers = self
            .transport
            .exchange(self.config.public_resolver, name, RecordType::NS)
            .await
            .map_err(|source| ResolveError::NameserverLookup {
                hostname: hostname.clone(),
                source,
            })?;
        // Resolvers may append glue (the nameservers' own A and AAAA records)
        // to an NS answer. Nameserver addresses are looked up separately.
        let answers = answers
            .into_iter()
            .filter(|rdata| !rdata.record_type().is_ip_addr())
            .collect();
        decode(name, RecordType::NS, answers, |rdata| match rdata {
            RData::NS(ns) => Ok(ns.0),
            other => Err(other),
        })
    }

    // Finds the address we should send queries for `nameserver` to.
    async fn nameserver_address(&self, nameserver: &Name) -> Result<SocketAddr, ResolveError> {
        let display = display_name(nameserver);
        let answers = self
            .transport
            .exchange(self.config.public_resolver, nameserver, RecordType::A)
            .await
            .map_err(|source| ResolveError::NameserverAddress {
                nameserver: display.clone(),
                source,
            })?;
        let addresses = decode(nameserver, RecordType::A, answers, |rdata| match rdata {
            RData::A(a) => Ok(a.0),
            other => Err(other),
        })?;
        let Some(address) = addresses.first() else {
            return Err(ResolveError::NameserverUnreachable(display));
        };
        Ok(SocketAddr::new(IpAddr::V4(*address), self.config.nameserver_port))
    }

    #[instrument(level = "debug", skip(self, hostname, name))]
    async fn lookup_via(
        &self,
        hostname: &Hostname,
        name: &Name,
        nameserver: Name,
    ) -> Result<(Source, Vec<Ipv4Addr>), ResolveError> {
        let server = self.nameserver_address(&nameserver).await?;
        let display = display_name(&nameserver);
        let answers = self
            .transport
            .exchange(server, name, RecordType::A)
            .await
            .map_err(|source| ResolveError::AddressLookup {
                hostname: hostname.clone(),
                nameserver: display.clone(),
                source,
            })?;
        let addresses = decode(name, RecordType::A, answers, |rdata| match rdata {
            RData::A(a) => Ok(a.0),
            other => Err(other),
        })?;
        if addresses.is_empty() {
            event!(Level::WARN, %server, "Nameserver returned no A records");
        }
        Ok((Source::nameserver(display), addresses))
    }
}

#[async_trait]
impl Resolver for AuthorityResolver {
    #[instrument(skip(self), name = "AuthorityResolver::resolve")]
    async fn resolve(&self, hostname: &Hostname) -> Result<AddressSet, ResolveError> {
        let name = fqdn(hostname)?;

        let nameservers = self.nameservers(hostname, &name).await?;
        if nameservers.is_empty() {
            return Err(ResolveError::NoNameservers(hostname.clone()));
        }
        event!(Level::DEBUG, ?nameservers, "Successfully looked up NS records");

        let lookups = nameservers
            .into_iter()
            .map(|nameserver| self.lookup_via(hostname, &name, nameserver));
        let per_nameserver = futures::future::try_join_all(lookups).await?;

        let addresses: AddressSet = per_nameserver
            .into_iter()
            .flat_map(|(source, ips)| {
                ips.into_iter()
                    .map(move |ip| (IpAddr::V4(ip), source.clone()))
            })
            .collect();
        if addresses.is_empty() {
            return Err(ResolveError::NoAddresses(hostname.clone()));
        }
        Ok(addresses)
    }
}

pub(crate) fn fqdn(hostname: &Hostname) -> Result<Name, ResolveError> {
    let mut name =
        Name::from_utf8(hostname.as_str()).map_err(|source| ResolveError::InvalidName {
            hostname: hostname.clone(),
            source,
        })?;
    name.set_fqdn(true);
    Ok(name)
}

fn display_name(name: &Name) -> String {
    name.to_utf8().trim_end_matches('.').to_string()
}

// Pulls the expected record data out of an answer section.
//
// CNAME records are links in an alias chain that ends in the records we
// asked for, so they are skipped. Anything else is an error.
fn decode<T>(
    name: &Name,
    expected: RecordType,
    answers: Vec<RData>,
    mut extract: impl FnMut(RData) -> Result<T, RData>,
) -> Result<Vec<T>, ResolveError> {
    let mut out = Vec::with_capacity(answers.len());
    for rdata in answers {
        match extract(rdata) {
            Ok(value) => out.push(value),
            Err(RData::CNAME(_)) => continue,
            Err(other) => {
                return Err(ResolveError::UnexpectedRecord {
                    name: display_name(name),
                    expected,
                    found: other.record_type(),
                })
            }
        }
    }
    Ok(out)
}
