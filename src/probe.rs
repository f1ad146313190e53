//! Concurrent TCP health checks against every discovered address.

use crate::address_set::{AddressSet, Source};
use crate::host::Hostname;
#[cfg(feature = "probes")]
use crate::probes;

use async_trait::async_trait;
use futures::StreamExt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{event, instrument, Level};

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("connection failed")]
    Io(#[from] std::io::Error),

    #[error("connection timed out after {0:?}")]
    Timeout(Duration),
}

impl ProbeError {
    #[cfg(feature = "probes")]
    // Convert to a static string for USDT probes.
    const fn as_str(&self) -> &'static str {
        match self {
            ProbeError::Io(_) => "Io",
            ProbeError::Timeout(_) => "Timeout",
        }
    }
}

/// Describes how a health-check connection to an address is made.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a connection to `address`, and closes it again.
    ///
    /// The caller bounds this call with the probe timeout.
    async fn connect(&self, address: SocketAddr) -> Result<(), ProbeError>;
}

pub type SharedConnector = Arc<dyn Connector>;

/// The outcome of probing a single address.
#[derive(Debug)]
pub struct ProbeResult {
    pub address: IpAddr,
    /// Who reported this address during resolution.
    pub sources: Vec<Source>,
    pub outcome: Result<(), ProbeError>,
}

impl ProbeResult {
    pub fn ok(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn error(&self) -> Option<&ProbeError> {
        self.outcome.as_ref().err()
    }
}

// Which port do we expect load balancers to accept connections on?
pub const DEFAULT_PROBE_PORT: u16 = 443;

// How long may a single connection attempt take?
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration options for health probing.
#[derive(Clone, Debug)]
pub struct ProbeConfig {
    /// Default: 443
    pub port: u16,

    /// How long a connection attempt may take before it counts as failed.
    ///
    /// Default: 5 seconds
    pub timeout: Duration,

    /// How many connection attempts may be in flight at once?
    ///
    /// Default: None, one attempt per address
    pub max_concurrency: Option<usize>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PROBE_PORT,
            timeout: DEFAULT_DIAL_TIMEOUT,
            max_concurrency: None,
        }
    }
}

/// Probes every address of an [AddressSet] concurrently.
pub struct Prober {
    connector: SharedConnector,
    config: ProbeConfig,
}

impl Prober {
    pub fn new(connector: SharedConnector, config: ProbeConfig) -> Self {
        Self { connector, config }
    }

    /// Attempts one connection to each address, returning once all attempts
    /// have finished.
    ///
    /// Exactly one result is returned per unique address, in no particular
    /// order. Failures are reported within the results; this never retries.
    #[instrument(skip(self, addresses), fields(count = addresses.len()), name = "Prober::probe")]
    pub async fn probe(&self, hostname: &Hostname, addresses: &AddressSet) -> Vec<ProbeResult> {
        let targets = addresses.ip_to_sources();
        let limit = self.config.max_concurrency.unwrap_or(targets.len()).max(1);

        futures::stream::iter(
            targets
                .into_iter()
                .map(|(address, sources)| self.probe_one(hostname, address, sources)),
        )
        .buffer_unordered(limit)
        .collect()
        .await
    }

    async fn probe_one(
        &self,
        #[allow(unused_variables)] hostname: &Hostname,
        address: IpAddr,
        sources: Vec<Source>,
    ) -> ProbeResult {
        let target = SocketAddr::new(address, self.config.port);
        #[cfg(feature = "probes")]
        let target_str = target.to_string();
        #[cfg(feature = "probes")]
        probes::probe__start!(|| (hostname.as_str(), target_str.as_str()));

        let outcome = match timeout(self.config.timeout, self.connector.connect(target)).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout(self.config.timeout)),
        };

        match &outcome {
            Ok(()) => {
                event!(Level::TRACE, %target, "Probe succeeded");
                #[cfg(feature = "probes")]
                probes::probe__done!(|| (hostname.as_str(), target_str.as_str()));
            }
            Err(err) => {
                event!(Level::DEBUG, %target, ?err, "Probe failed");
                #[cfg(feature = "probes")]
                probes::probe__failed!(|| (hostname.as_str(), target_str.as_str(), err.as_str()));
            }
        }

        ProbeResult {
            address,
            sources,
            outcome,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_utils::{Behavior, ScriptedConnector};
    use std::collections::BTreeSet;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn addresses(ips: &[&str]) -> AddressSet {
        ips.iter().map(|s| (ip(s), Source::Direct)).collect()
    }

    fn prober(connector: ScriptedConnector, config: ProbeConfig) -> (Arc<ScriptedConnector>, Prober) {
        let connector = Arc::new(connector);
        (connector.clone(), Prober::new(connector, config))
    }

    #[tokio::test(start_paused = true)]
    async fn one_result_per_address_regardless_of_outcome() {
        let connector = ScriptedConnector::new(Behavior::Accept)
            .with(ip("10.0.0.2"), Behavior::Refuse)
            .with(ip("10.0.0.3"), Behavior::Hang);
        let (connector, prober) = prober(connector, ProbeConfig::default());

        let input = addresses(&["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4"]);
        let results = prober.probe(&Hostname::new("lb.example.com"), &input).await;

        assert_eq!(results.len(), 4);
        let probed: BTreeSet<IpAddr> = results.iter().map(|r| r.address).collect();
        assert_eq!(probed, input.ips());

        let failed: BTreeSet<IpAddr> = results
            .iter()
            .filter(|r| !r.ok())
            .map(|r| r.address)
            .collect();
        assert_eq!(failed, BTreeSet::from([ip("10.0.0.2"), ip("10.0.0.3")]));
        assert_eq!(connector.attempts().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_connections_time_out() {
        let connector = ScriptedConnector::new(Behavior::Hang);
        let config = ProbeConfig {
            timeout: Duration::from_secs(3),
            ..Default::default()
        };
        let (_, prober) = prober(connector, config);

        let results = prober
            .probe(&Hostname::new("lb.example.com"), &addresses(&["1.2.3.4"]))
            .await;

        assert_eq!(results.len(), 1);
        assert!(matches!(
            results[0].error(),
            Some(ProbeError::Timeout(d)) if *d == Duration::from_secs(3)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn probes_run_concurrently() {
        // Every connection takes one second; with one attempt per address
        // the whole set should take about as long as a single attempt.
        let connector = ScriptedConnector::new(Behavior::Delay(Duration::from_secs(1)));
        let (_, prober) = prober(connector, ProbeConfig::default());

        let input = addresses(&["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4", "10.0.0.5"]);
        let start = tokio::time::Instant::now();
        let results = prober.probe(&Hostname::new("lb.example.com"), &input).await;

        assert!(results.iter().all(ProbeResult::ok));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_limit_is_respected() {
        let connector = ScriptedConnector::new(Behavior::Delay(Duration::from_secs(1)));
        let config = ProbeConfig {
            max_concurrency: Some(2),
            ..Default::default()
        };
        let (connector, prober) = prober(connector, config);

        let input = addresses(&["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4"]);
        let start = tokio::time::Instant::now();
        let results = prober.probe(&Hostname::new("lb.example.com"), &input).await;

        assert_eq!(results.len(), 4);
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert!(connector.max_in_flight() <= 2);
    }

    #[tokio::test]
    async fn sources_are_carried_into_results() {
        let (_, prober) = prober(ScriptedConnector::new(Behavior::Accept), ProbeConfig::default());
        let input: AddressSet = [
            (ip("10.0.0.1"), Source::nameserver("ns1")),
            (ip("10.0.0.1"), Source::nameserver("ns2")),
        ]
        .into_iter()
        .collect();

        let results = prober.probe(&Hostname::new("lb.example.com"), &input).await;
        assert_eq!(
            results[0].sources,
            vec![Source::nameserver("ns1"), Source::nameserver("ns2")]
        );
    }

    #[tokio::test]
    async fn empty_input_yields_no_results() {
        let (connector, prober) =
            prober(ScriptedConnector::new(Behavior::Accept), ProbeConfig::default());
        let results = prober
            .probe(&Hostname::new("lb.example.com"), &AddressSet::new())
            .await;
        assert!(results.is_empty());
        assert!(connector.attempts().is_empty());
    }
}
