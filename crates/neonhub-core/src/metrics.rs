//! Metrics sink implementations.

use crate::ports::MetricsSink;
use async_trait::async_trait;
use tracing::debug;

/// Sink that emits data points as structured log lines. Suitable as a
/// default when no external metrics backend is wired in.
pub struct TracingMetricsSink;

#[async_trait]
impl MetricsSink for TracingMetricsSink {
    async fn record(&self, name: &str, value: f64, tags: &[(&str, &str)]) {
        debug!(metric = name, value, ?tags, "Recorded metric");
    }
}

/// Sink that drops everything. Used in tests and when metrics tracking
/// is disabled.
pub struct NoopMetricsSink;

#[async_trait]
impl MetricsSink for NoopMetricsSink {
    async fn record(&self, _name: &str, _value: f64, _tags: &[(&str, &str)]) {}
}
