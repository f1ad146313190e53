//! A monitor which repeatedly resolves a hostname and probes its addresses.
//!
//! Each poll cycle moves through the same phases:
//!
//! - Resolving: find every address of the hostname, via a [Resolver].
//! - Probing: connect to every address concurrently, via a [Prober].
//! - Reporting: log and report each failure, and emit the number of failed
//!   ("borked") addresses as a gauge.
//! - Sleeping: wait for the poll interval.
//!
//! If resolution fails, the cycle skips straight to Sleeping, and no gauge
//! is emitted for it.

use crate::address_set::AddressSet;
use crate::host::Hostname;
use crate::metrics::SharedMetrics;
use crate::probe::{ProbeResult, Prober};
#[cfg(feature = "probes")]
use crate::probes;
use crate::report::{error_chain, ErrorReport, ReportKind, SharedErrorSink};
use crate::resolver::SharedResolver;

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{event, instrument, Level};

// How long between poll cycles?
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

pub const DEFAULT_METRICS_PREFIX: &str = "lb-monitor";

/// Configuration shared by every monitor.
#[derive(Clone, Debug)]
pub struct MonitorConfig {
    /// How long to sleep after each poll cycle.
    ///
    /// Default: 60 seconds
    pub poll_interval: Duration,

    /// Prefix of the gauge name; see [Hostname::metric_name].
    ///
    /// Default: "lb-monitor"
    pub metrics_prefix: String,

    /// Log every probe result, not just failures.
    ///
    /// Default: false
    pub debug: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            metrics_prefix: DEFAULT_METRICS_PREFIX.to_string(),
            debug: false,
        }
    }
}

/// A reference hostname, used to annotate failures.
#[derive(Clone)]
pub struct Upstream {
    pub hostname: Hostname,
    pub resolver: SharedResolver,
}

/// Whether a failed address is also served by the upstream hostname.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Containment {
    Contained,
    NotContained,
}

impl Containment {
    pub fn of(address: &IpAddr, upstream: &AddressSet) -> Self {
        if upstream.contains(address) {
            Containment::Contained
        } else {
            Containment::NotContained
        }
    }
}

impl std::fmt::Display for Containment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Containment::Contained => f.write_str("contained upstream"),
            Containment::NotContained => f.write_str("not contained upstream"),
        }
    }
}

/// A failed probe, with its upstream annotation if one was computed.
#[derive(Debug)]
pub struct Failure {
    pub result: ProbeResult,
    pub upstream: Option<Containment>,
}

/// The aggregate of one poll cycle.
#[derive(Debug)]
pub struct PollOutcome {
    /// How many addresses were probed.
    pub total: usize,
    pub failures: Vec<Failure>,
}

impl PollOutcome {
    /// The number of addresses which failed their probe.
    pub fn borked(&self) -> usize {
        self.failures.len()
    }
}

/// Monitors a single hostname.
///
/// Cheap to clone; everything shared is reference-counted.
#[derive(Clone)]
pub struct Monitor {
    hostname: Hostname,
    resolver: SharedResolver,
    upstream: Option<Upstream>,
    prober: Arc<Prober>,
    metrics: SharedMetrics,
    errors: SharedErrorSink,
    config: Arc<MonitorConfig>,
}

impl Monitor {
    pub fn new(
        hostname: Hostname,
        resolver: SharedResolver,
        prober: Arc<Prober>,
        metrics: SharedMetrics,
        errors: SharedErrorSink,
        config: Arc<MonitorConfig>,
    ) -> Self {
        Self {
            hostname,
            resolver,
            upstream: None,
            prober,
            metrics,
            errors,
            config,
        }
    }

    /// Annotates every failure with whether `upstream` also serves it.
    pub fn with_upstream(mut self, upstream: Upstream) -> Self {
        self.upstream = Some(upstream);
        self
    }

    pub fn hostname(&self) -> &Hostname {
        &self.hostname
    }

    /// Runs poll cycles until `shutdown` becomes true, or its sender is
    /// dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = shutdown.wait_for(|stop| *stop) => return,
                _ = self.poll() => {},
            }
            tokio::select! {
                _ = shutdown.wait_for(|stop| *stop) => return,
                _ = tokio::time::sleep(self.config.poll_interval) => {},
            }
        }
    }

    /// Runs a single poll cycle.
    ///
    /// Returns `None` if the hostname could not be resolved, in which case
    /// nothing was probed and no gauge was emitted.
    #[instrument(skip(self), fields(hostname = %self.hostname), name = "Monitor::poll")]
    pub async fn poll(&self) -> Option<PollOutcome> {
        event!(Level::INFO, "Polling");

        let addresses = self.resolve().await?;

        let results = self.prober.probe(&self.hostname, &addresses).await;
        let total = results.len();
        if self.config.debug {
            for result in &results {
                event!(
                    Level::INFO,
                    ok = result.ok(),
                    err = ?result.error(),
                    ip = %result.address,
                    sources = ?result.sources,
                    "Probe result"
                );
            }
        }

        let failed: Vec<ProbeResult> = results.into_iter().filter(|r| !r.ok()).collect();
        let upstream = if failed.is_empty() {
            None
        } else {
            self.upstream_addresses().await
        };
        let failures = failed
            .into_iter()
            .map(|result| Failure {
                upstream: upstream
                    .as_ref()
                    .map(|addresses| Containment::of(&result.address, addresses)),
                result,
            })
            .collect();

        let outcome = PollOutcome { total, failures };
        self.report(&outcome).await;
        Some(outcome)
    }

    async fn resolve(&self) -> Option<AddressSet> {
        #[cfg(feature = "probes")]
        probes::resolve__start!(|| self.hostname.as_str());

        match self.resolver.resolve(&self.hostname).await {
            Ok(addresses) => {
                #[cfg(feature = "probes")]
                probes::resolve__done!(|| (self.hostname.as_str(), addresses.len() as u64));
                event!(Level::DEBUG, count = addresses.len(), "Resolved addresses");
                Some(addresses)
            }
            Err(err) => {
                #[cfg(feature = "probes")]
                probes::resolve__failed!(|| (self.hostname.as_str(), err.as_str()));
                event!(Level::ERROR, err = %error_chain(&err), "Resolution failed, skipping probes");
                self.errors
                    .report(ErrorReport::new(&self.hostname, ReportKind::Resolution, &err))
                    .await;
                None
            }
        }
    }

    // Resolves the upstream hostname, if one is configured.
    //
    // A failure here only costs us the annotations, so it is reported but
    // does not affect the cycle.
    async fn upstream_addresses(&self) -> Option<AddressSet> {
        let upstream = self.upstream.as_ref()?;
        match upstream.resolver.resolve(&upstream.hostname).await {
            Ok(addresses) => Some(addresses),
            Err(err) => {
                event!(
                    Level::WARN,
                    upstream = %upstream.hostname,
                    err = %error_chain(&err),
                    "Upstream resolution failed"
                );
                self.errors
                    .report(ErrorReport::new(&upstream.hostname, ReportKind::Resolution, &err))
                    .await;
                None
            }
        }
    }

    async fn report(&self, outcome: &PollOutcome) {
        let reports = outcome.failures.iter().filter_map(|failure| {
            let err = failure.result.error()?;
            match failure.upstream {
                Some(containment) => event!(
                    Level::WARN,
                    ip = %failure.result.address,
                    err = %error_chain(err),
                    sources = ?failure.result.sources,
                    "Borked address, {containment}"
                ),
                None => event!(
                    Level::WARN,
                    ip = %failure.result.address,
                    err = %error_chain(err),
                    sources = ?failure.result.sources,
                    "Borked address"
                ),
            }
            let report = ErrorReport::new(&self.hostname, ReportKind::Probe, err)
                .with_address(failure.result.address);
            Some(self.errors.report(report))
        });
        futures::future::join_all(reports).await;

        let borked = outcome.borked();
        #[cfg(feature = "probes")]
        probes::cycle__done!(|| (self.hostname.as_str(), outcome.total as u64, borked as u64));
        event!(Level::INFO, total = outcome.total, borked, "Poll complete");

        self.metrics.gauge(
            &self.hostname.metric_name(&self.config.metrics_prefix),
            borked as u64,
        );
    }
}
