//! Emission of the borked-address gauge.

use std::sync::Arc;

/// Accepts successive values for named gauges.
///
/// Shared by every monitor, so implementations must tolerate concurrent
/// calls.
pub trait MetricsSink: Send + Sync {
    fn gauge(&self, name: &str, value: u64);
}

pub type SharedMetrics = Arc<dyn MetricsSink>;

/// Emits gauges through the `metrics` facade.
///
/// Without an installed recorder (see [crate::telemetry]), emission is a
/// no-op.
#[derive(Clone, Debug, Default)]
pub struct FacadeMetrics {
    source: Option<String>,
}

impl FacadeMetrics {
    /// `source` is attached to every gauge as a label, identifying which
    /// instance of the monitor reported it.
    pub fn new(source: Option<String>) -> Self {
        Self { source }
    }
}

impl MetricsSink for FacadeMetrics {
    fn gauge(&self, name: &str, value: u64) {
        let name = name.to_string();
        match &self.source {
            Some(source) => ::metrics::gauge!(name, "source" => source.clone()).set(value as f64),
            None => ::metrics::gauge!(name).set(value as f64),
        }
    }
}
