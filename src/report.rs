//! Delivery of errors to an external reporting collaborator.

use crate::host::Hostname;

use async_trait::async_trait;
use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{event, Level};

/// What part of a poll cycle failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    /// The hostname could not be resolved; the cycle was skipped.
    Resolution,
    /// A single address failed its health probe.
    Probe,
    /// A monitor task panicked.
    Panic,
}

#[derive(Clone, Debug, Serialize)]
pub struct ErrorReport {
    pub hostname: Hostname,
    pub kind: ReportKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<IpAddr>,
    /// The error, followed by each of its sources.
    pub message: String,
}

impl ErrorReport {
    pub fn new(hostname: &Hostname, kind: ReportKind, err: &(dyn std::error::Error + 'static)) -> Self {
        Self {
            hostname: hostname.clone(),
            kind,
            address: None,
            message: error_chain(err),
        }
    }

    pub fn with_address(mut self, address: IpAddr) -> Self {
        self.address = Some(address);
        self
    }
}

/// Flattens an error and its sources into a single line.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Receives every resolution failure, probe failure, and monitor panic.
///
/// Shared by every monitor and every probe, so implementations must
/// tolerate concurrent calls.
#[async_trait]
pub trait ErrorSink: Send + Sync {
    async fn report(&self, report: ErrorReport);
}

pub type SharedErrorSink = Arc<dyn ErrorSink>;

fn log_report(report: &ErrorReport) {
    event!(
        Level::ERROR,
        hostname = %report.hostname,
        kind = ?report.kind,
        address = ?report.address,
        error = %report.message,
        "error reported"
    );
}

/// An [ErrorSink] which only logs.
#[derive(Clone, Debug, Default)]
pub struct LogSink {}

#[async_trait]
impl ErrorSink for LogSink {
    async fn report(&self, report: ErrorReport) {
        log_report(&report);
    }
}

// How long may delivering a single report take?
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct WebhookBody<'a> {
    #[serde(flatten)]
    report: &'a ErrorReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    environment: Option<&'a str>,
}

/// An [ErrorSink] which logs, then POSTs each report as JSON.
///
/// Delivery failures are logged and otherwise ignored.
pub struct WebhookSink {
    client: reqwest::Client,
    url: reqwest::Url,
    environment: Option<String>,
}

impl WebhookSink {
    pub fn new(url: reqwest::Url, environment: Option<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(WEBHOOK_TIMEOUT).build()?;
        Ok(Self {
            client,
            url,
            environment,
        })
    }
}

#[async_trait]
impl ErrorSink for WebhookSink {
    async fn report(&self, report: ErrorReport) {
        log_report(&report);

        let body = WebhookBody {
            report: &report,
            environment: self.environment.as_deref(),
        };
        let result = self
            .client
            .post(self.url.clone())
            .json(&body)
            .send()
            .await
            .and_then(|response| response.error_for_status());
        if let Err(err) = result {
            event!(Level::WARN, ?err, url = %self.url, "Failed to deliver error report");
        }
    }
}
