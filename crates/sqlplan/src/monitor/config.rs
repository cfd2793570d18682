use std::time::Duration;

/// Configuration for query monitoring and timeouts.
///
/// By default, monitoring is disabled and no timeout applies.
#[derive(Debug, Clone, Default)]
pub struct MonitorConfig {
    /// Deadline for one database round trip. `None` means no timeout.
    pub query_timeout: Option<Duration>,
    /// Statements slower than this trigger `on_slow_query`.
    pub slow_query_threshold: Option<Duration>,
    /// Whether monitors receive events.
    pub monitoring_enabled: bool,
}

impl MonitorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the round-trip deadline.
    ///
    /// A statement exceeding it fails with `PlanError::Timeout` and a
    /// best-effort cancel request is sent to the server.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    pub fn with_slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.slow_query_threshold = Some(threshold);
        self
    }

    pub fn enable_monitoring(mut self) -> Self {
        self.monitoring_enabled = true;
        self
    }

    pub fn disable_monitoring(mut self) -> Self {
        self.monitoring_enabled = false;
        self
    }

    /// Whether `duration` crosses the slow-query threshold.
    pub(crate) fn is_slow(&self, duration: Duration) -> bool {
        self.slow_query_threshold.is_some_and(|t| duration > t)
    }
}
