//! The interface for sending a single DNS query to a specific server.

use async_trait::async_trait;
use hickory_resolver::config::NameServerConfig;
use hickory_resolver::config::Protocol;
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::config::ResolverOpts;
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::proto::rr::{Name, RData, RecordType};
use hickory_resolver::TokioAsyncResolver;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{event, instrument, Level};

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("query to {server} timed out after {timeout:?}")]
    Timeout {
        server: SocketAddr,
        timeout: Duration,
    },

    #[error("query to {server} failed")]
    Failed {
        server: SocketAddr,
        #[source]
        source: ResolveError,
    },
}

/// Sends one question to one DNS server.
///
/// Implementations return the record data of the answer section. An answer
/// with no records is `Ok` and empty, not an error.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn exchange(
        &self,
        server: SocketAddr,
        name: &Name,
        record_type: RecordType,
    ) -> Result<Vec<RData>, ExchangeError>;
}

pub type SharedTransport = Arc<dyn Transport>;

// How long do we expect a healthy DNS server to take to respond?
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Implements [Transport] over UDP with hickory.
///
/// Each exchange builds a resolver pointed only at the requested server, so
/// answers are never served from a cache shared across poll cycles.
pub struct HickoryTransport {
    query_timeout: Duration,
}

impl HickoryTransport {
    pub fn new(query_timeout: Duration) -> Self {
        Self { query_timeout }
    }

    fn resolver_for(&self, server: SocketAddr) -> TokioAsyncResolver {
        let mut rc = ResolverConfig::new();
        rc.add_name_server(NameServerConfig {
            socket_addr: server,
            protocol: Protocol::Udp,
            tls_dns_name: None,
            trust_negative_responses: false,
            bind_addr: None,
        });
        let mut opts = ResolverOpts::default();
        opts.use_hosts_file = false;
        opts.timeout = self.query_timeout;
        opts.attempts = 1;
        opts.edns0 = true;
        TokioAsyncResolver::tokio(rc, opts)
    }
}

impl Default for HickoryTransport {
    fn default() -> Self {
        Self::new(DEFAULT_QUERY_TIMEOUT)
    }
}

#[async_trait]
impl Transport for HickoryTransport {
    #[instrument(level = "debug", skip(self), name = "HickoryTransport::exchange")]
    async fn exchange(
        &self,
        server: SocketAddr,
        name: &Name,
        record_type: RecordType,
    ) -> Result<Vec<RData>, ExchangeError> {
        let resolver = self.resolver_for(server);

        // The resolver carries its own timeout, but we bound the whole
        // exchange as well so a wedged socket can't stall the caller.
        let lookup = match timeout(self.query_timeout, resolver.lookup(name.clone(), record_type))
            .await
        {
            Ok(Ok(lookup)) => lookup,
            Ok(Err(err)) => match err.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => {
                    event!(Level::DEBUG, %server, "No records found");
                    return Ok(vec![]);
                }
                _ => return Err(ExchangeError::Failed { server, source: err }),
            },
            Err(_) => {
                return Err(ExchangeError::Timeout {
                    server,
                    timeout: self.query_timeout,
                })
            }
        };

        let answers: Vec<RData> = lookup.iter().cloned().collect();
        event!(Level::DEBUG, %server, count = answers.len(), "Received answers");
        Ok(answers)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_utils::{a, ZoneBuilder};
    use std::time::Instant;

    fn name(s: &str) -> Name {
        Name::from_utf8(s).unwrap()
    }

    #[tokio::test]
    async fn silent_server_is_bounded_by_query_timeout() {
        // Bound, but never read from.
        let silent = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server = silent.local_addr().unwrap();
        let transport = HickoryTransport::new(Duration::from_millis(500));

        let start = Instant::now();
        let result = transport
            .exchange(server, &name("lb.example.com."), RecordType::A)
            .await;
        let elapsed = start.elapsed();

        assert!(result.is_err(), "unexpected answer: {result:?}");
        assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");
    }

    #[tokio::test]
    async fn missing_records_are_an_empty_answer() {
        let server = ZoneBuilder::new("test.example.")
            .record("test.example.", a("10.0.0.1"))
            .run("127.0.0.1:0")
            .await;
        let transport = HickoryTransport::default();

        let answers = transport
            .exchange(server, &name("test.example."), RecordType::NS)
            .await
            .unwrap();
        assert!(answers.is_empty());

        let answers = transport
            .exchange(server, &name("test.example."), RecordType::A)
            .await
            .unwrap();
        assert_eq!(answers, vec![a("10.0.0.1")]);
    }
}
