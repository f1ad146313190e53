//! Process configuration, read from the environment or command line.

use crate::host::Hostname;
use crate::monitor::{MonitorConfig, DEFAULT_METRICS_PREFIX};
use crate::probe::ProbeConfig;
use crate::resolvers::authority::AuthorityResolverConfig;

use clap::builder::BoolishValueParser;
use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tracing::{event, Level};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("please provide at least one hostname in HOSTNAMES")]
    NoHostnames,

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

#[derive(Debug, Clone, Parser)]
#[command(name = "lb-monitor", version, about)]
pub struct Args {
    /// Comma-separated hostnames to monitor
    #[arg(long, env = "HOSTNAMES", value_delimiter = ',', required = true)]
    pub hostnames: Vec<String>,

    /// Seconds to sleep between poll cycles
    #[arg(long = "poll-interval", env = "POLL_INTERVAL", default_value_t = 60)]
    pub poll_interval_secs: u64,

    /// Seconds a TCP connection attempt may take
    #[arg(long = "dial-timeout", env = "DIAL_TIMEOUT", default_value_t = 5)]
    pub dial_timeout_secs: u64,

    /// Seconds a single DNS exchange may take
    #[arg(long = "dns-timeout", env = "DNS_TIMEOUT", default_value_t = 5)]
    pub dns_timeout_secs: u64,

    /// TCP port probed on every address
    #[arg(long, env = "PROBE_PORT", default_value_t = 443)]
    pub probe_port: u16,

    /// Recursive resolver used to look up nameservers
    #[arg(long, env = "DNS_SERVER", default_value = "8.8.8.8:53")]
    pub dns_server: SocketAddr,

    /// Port used to query nameservers directly
    #[arg(long, env = "NAMESERVER_PORT", default_value_t = 53)]
    pub nameserver_port: u16,

    /// Ask each authoritative nameserver for addresses, rather than using a
    /// plain system lookup
    #[arg(
        long,
        env = "RESOLVE_NAMESERVERS",
        default_value_t = true,
        value_parser = BoolishValueParser::new(),
        action = clap::ArgAction::Set
    )]
    pub resolve_nameservers: bool,

    /// Hostname whose addresses annotate failures
    #[arg(long, env = "UPSTREAM_HOSTNAME")]
    pub upstream_hostname: Option<String>,

    /// Upper bound on concurrent connection attempts per hostname
    #[arg(long, env = "MAX_CONCURRENT_PROBES")]
    pub max_concurrent_probes: Option<usize>,

    /// Log every probe result
    #[arg(
        long,
        env = "DEBUG",
        default_value_t = false,
        value_parser = BoolishValueParser::new(),
        action = clap::ArgAction::Set
    )]
    pub debug: bool,

    /// Prefix of every gauge name
    #[arg(long, env = "METRICS_PREFIX", default_value = DEFAULT_METRICS_PREFIX)]
    pub metrics_prefix: String,

    /// Label identifying this instance on every gauge
    #[arg(long, env = "METRICS_SOURCE")]
    pub metrics_source: Option<String>,

    /// Fallback for the metrics source, as set by some platforms
    #[arg(long, env = "DYNO", hide = true)]
    pub dyno: Option<String>,

    /// Address to serve Prometheus metrics on
    #[arg(long, env = "PROMETHEUS_ADDR")]
    pub prometheus_addr: Option<SocketAddr>,

    /// URL which receives each error report as JSON
    #[arg(long, env = "ERROR_WEBHOOK_URL")]
    pub error_webhook_url: Option<reqwest::Url>,

    /// Environment name attached to error reports
    #[arg(long, env = "ERROR_ENVIRONMENT")]
    pub error_environment: Option<String>,
}

/// How hostnames are turned into addresses.
#[derive(Clone, Debug)]
pub enum ResolutionMode {
    /// Ask each authoritative nameserver.
    Authority(AuthorityResolverConfig),
    /// Plain system lookup.
    System,
}

/// Validated configuration. Built once at startup and never modified.
#[derive(Clone, Debug)]
pub struct Config {
    pub hostnames: Vec<Hostname>,
    pub resolution: ResolutionMode,
    pub dns_timeout: Duration,
    pub probe: ProbeConfig,
    pub monitor: MonitorConfig,
    pub upstream: Option<Hostname>,
    pub metrics_source: Option<String>,
    pub prometheus_addr: Option<SocketAddr>,
    pub error_webhook_url: Option<reqwest::Url>,
    pub error_environment: Option<String>,
}

fn seconds(name: &'static str, secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::Zero(name));
    }
    Ok(Duration::from_secs(secs))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// Last resort for the metrics source label.
fn machine_hostname() -> Option<String> {
    match sys_info::hostname() {
        Ok(hostname) => non_empty(Some(hostname)),
        Err(err) => {
            event!(Level::WARN, ?err, "Failed to read machine hostname");
            None
        }
    }
}

impl Args {
    pub fn into_config(self) -> Result<Config, ConfigError> {
        let mut hostnames: Vec<Hostname> = vec![];
        for hostname in self.hostnames.iter().map(|h| h.trim()).filter(|h| !h.is_empty()) {
            let hostname = Hostname::new(hostname);
            if !hostnames.contains(&hostname) {
                hostnames.push(hostname);
            }
        }
        if hostnames.is_empty() {
            return Err(ConfigError::NoHostnames);
        }

        if self.max_concurrent_probes == Some(0) {
            return Err(ConfigError::Zero("MAX_CONCURRENT_PROBES"));
        }

        let resolution = if self.resolve_nameservers {
            ResolutionMode::Authority(AuthorityResolverConfig {
                public_resolver: self.dns_server,
                nameserver_port: self.nameserver_port,
            })
        } else {
            ResolutionMode::System
        };

        Ok(Config {
            hostnames,
            resolution,
            dns_timeout: seconds("DNS_TIMEOUT", self.dns_timeout_secs)?,
            probe: ProbeConfig {
                port: self.probe_port,
                timeout: seconds("DIAL_TIMEOUT", self.dial_timeout_secs)?,
                max_concurrency: self.max_concurrent_probes,
            },
            monitor: MonitorConfig {
                poll_interval: seconds("POLL_INTERVAL", self.poll_interval_secs)?,
                metrics_prefix: self.metrics_prefix,
                debug: self.debug,
            },
            upstream: non_empty(self.upstream_hostname).map(Hostname::from),
            metrics_source: non_empty(self.metrics_source)
                .or_else(|| non_empty(self.dyno))
                .or_else(machine_hostname),
            prometheus_addr: self.prometheus_addr,
            error_webhook_url: self.error_webhook_url,
            error_environment: non_empty(self.error_environment),
        })
    }
}
