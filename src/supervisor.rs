//! Runs one [Monitor] task per hostname, restarting any that panic.

use crate::backoff::ExponentialBackoff;
use crate::join::{classify, Exit};
use crate::monitor::Monitor;
use crate::report::{ErrorReport, ReportKind, SharedErrorSink};

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{event, Level};

/// How a panicked monitor is restarted.
#[derive(Clone, Debug)]
pub struct RestartPolicy {
    /// Delay before the first restart.
    ///
    /// Default: 1 second
    pub initial_backoff: Duration,

    /// The delay doubles on each consecutive panic, up to this limit. A
    /// monitor which stays up for longer than this resets the delay.
    ///
    /// Default: 60 seconds
    pub max_backoff: Duration,

    /// Random jitter added to each delay.
    ///
    /// Default: 1 second
    pub spread: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            spread: Duration::from_secs(1),
        }
    }
}

/// Owns the monitor tasks.
///
/// Monitors share nothing but their metrics and error sinks, so a panic in
/// one never disturbs the others.
pub struct Supervisor {
    monitors: Vec<Monitor>,
    errors: SharedErrorSink,
    policy: RestartPolicy,
}

impl Supervisor {
    pub fn new(monitors: Vec<Monitor>, errors: SharedErrorSink, policy: RestartPolicy) -> Self {
        Self {
            monitors,
            errors,
            policy,
        }
    }

    /// Runs every monitor until `shutdown` becomes true, then waits for all
    /// of them to stop.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let mut tasks = JoinSet::new();
        for monitor in self.monitors {
            tasks.spawn(supervise(
                monitor,
                self.errors.clone(),
                self.policy.clone(),
                shutdown.clone(),
            ));
        }
        while let Some(result) = tasks.join_next().await {
            if let Exit::Panicked(message) = classify(result) {
                event!(Level::ERROR, panic = %message, "Supervisor task panicked");
            }
        }
    }
}

async fn supervise(
    monitor: Monitor,
    errors: SharedErrorSink,
    policy: RestartPolicy,
    mut shutdown: watch::Receiver<bool>,
) {
    let hostname = monitor.hostname().clone();
    let mut backoff = policy.initial_backoff;
    loop {
        let started = Instant::now();
        let handle = tokio::task::spawn(monitor.clone().run(shutdown.clone()));
        let message = match classify(handle.await) {
            Exit::Stopped => return,
            Exit::Panicked(message) => message,
        };

        if started.elapsed() > policy.max_backoff {
            backoff = policy.initial_backoff;
        }
        let delay = backoff.add_spread(policy.spread);
        backoff = backoff.exponential_backoff(policy.max_backoff);

        event!(
            Level::ERROR,
            %hostname,
            panic = %message,
            ?delay,
            "Monitor panicked, restarting"
        );
        errors
            .report(ErrorReport {
                hostname: hostname.clone(),
                kind: ReportKind::Panic,
                address: None,
                message,
            })
            .await;

        tokio::select! {
            _ = shutdown.wait_for(|stop| *stop) => return,
            _ = tokio::time::sleep(delay) => {},
        }
    }
}
