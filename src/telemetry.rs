//! Logging and metrics-exporter setup.

use anyhow::Context;
use std::net::SocketAddr;
use tracing::{event, Level};
use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber and, if `prometheus_addr` is set,
/// a Prometheus exporter for every gauge.
///
/// `RUST_LOG` takes precedence over `debug`.
pub fn init(debug: bool, prometheus_addr: Option<SocketAddr>) -> anyhow::Result<()> {
    let default_level = if debug { "debug" } else { "info" };
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new(default_level)
            .add_directive("hickory_proto=warn".parse()?)
            .add_directive("hickory_resolver=warn".parse()?),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_level(true)
        .init();

    if let Some(addr) = prometheus_addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to start Prometheus exporter")?;
        event!(Level::INFO, %addr, "Prometheus metrics exporter started");
    } else {
        event!(
            Level::INFO,
            "No PROMETHEUS_ADDR provided, gauges will not be exported"
        );
    }

    Ok(())
}
