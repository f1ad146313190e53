use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{event, Level};

use lb_monitor::config::{Args, Config, ResolutionMode};
use lb_monitor::connectors::tcp::TcpConnector;
use lb_monitor::metrics::{FacadeMetrics, SharedMetrics};
use lb_monitor::monitor::{Monitor, Upstream};
use lb_monitor::probe::Prober;
use lb_monitor::report::{LogSink, SharedErrorSink, WebhookSink};
use lb_monitor::resolver::SharedResolver;
use lb_monitor::resolvers::authority::AuthorityResolver;
use lb_monitor::resolvers::system::SystemResolver;
use lb_monitor::supervisor::{RestartPolicy, Supervisor};
use lb_monitor::telemetry;
use lb_monitor::transport::HickoryTransport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; the environment may already be set.
    let _ = dotenvy::dotenv();

    let config = Args::parse().into_config()?;
    telemetry::init(config.monitor.debug, config.prometheus_addr)?;
    log_config(&config);

    #[cfg(feature = "probes")]
    if let Err(err) = usdt::register_probes() {
        event!(Level::WARN, ?err, "Failed to register USDT probes");
    }

    let supervisor = build(&config)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::task::spawn(supervisor.run(shutdown_rx));

    shutdown_signal().await.context("failed to listen for shutdown signals")?;
    event!(Level::INFO, "Received shutdown signal, stopping monitors");
    let _ = shutdown_tx.send(true);
    handle.await.context("supervisor failed")?;

    event!(Level::INFO, "Shutdown complete");
    Ok(())
}

fn log_config(config: &Config) {
    event!(
        Level::INFO,
        hostnames = ?config.hostnames,
        poll_interval = ?config.monitor.poll_interval,
        dial_timeout = ?config.probe.timeout,
        dns_timeout = ?config.dns_timeout,
        port = config.probe.port,
        resolution = ?config.resolution,
        upstream = ?config.upstream,
        "Starting lb-monitor"
    );
    if config.error_webhook_url.is_none() {
        event!(
            Level::INFO,
            "No ERROR_WEBHOOK_URL provided, errors will only be logged"
        );
    }
}

fn build(config: &Config) -> anyhow::Result<Supervisor> {
    let resolver: SharedResolver = match &config.resolution {
        ResolutionMode::Authority(authority) => Arc::new(AuthorityResolver::new(
            Arc::new(HickoryTransport::new(config.dns_timeout)),
            authority.clone(),
        )),
        ResolutionMode::System => Arc::new(SystemResolver::new()),
    };
    let upstream = config.upstream.clone().map(|hostname| Upstream {
        hostname,
        resolver: Arc::new(SystemResolver::new()),
    });

    let prober = Arc::new(Prober::new(
        Arc::new(TcpConnector::default()),
        config.probe.clone(),
    ));
    let metrics: SharedMetrics = Arc::new(FacadeMetrics::new(config.metrics_source.clone()));
    let errors: SharedErrorSink = match &config.error_webhook_url {
        Some(url) => Arc::new(
            WebhookSink::new(url.clone(), config.error_environment.clone())
                .context("failed to build error webhook client")?,
        ),
        None => Arc::new(LogSink::default()),
    };
    let monitor_config = Arc::new(config.monitor.clone());

    let monitors = config
        .hostnames
        .iter()
        .map(|hostname| {
            let monitor = Monitor::new(
                hostname.clone(),
                resolver.clone(),
                prober.clone(),
                metrics.clone(),
                errors.clone(),
                monitor_config.clone(),
            );
            match &upstream {
                Some(upstream) => monitor.with_upstream(upstream.clone()),
                None => monitor,
            }
        })
        .collect();

    let policy = RestartPolicy {
        max_backoff: config.monitor.poll_interval,
        ..Default::default()
    };
    Ok(Supervisor::new(monitors, errors, policy))
}

async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
