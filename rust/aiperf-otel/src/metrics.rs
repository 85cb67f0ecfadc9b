//! Optional Prometheus exporter: process-level counters alongside the
//! per-run `ProfileResults` published by the records manager. Additive
//! observability, not a replacement for that summary.

use aiperf_core::{AiperfError, AiperfResult, CreditPhase};
use prometheus::{IntCounterVec, Opts, Registry, TextEncoder};

/// Holds the process-wide counter set and the registry they're
/// registered against. Cheap to construct; the controller builds one and
/// hands workers/the timing manager a clone of the counters they touch.
pub struct PrometheusMetrics {
    registry: Registry,
    credits_sent: IntCounterVec,
    credits_completed: IntCounterVec,
    credits_failed: IntCounterVec,
    http_errors: IntCounterVec,
}

impl PrometheusMetrics {
    pub fn new() -> AiperfResult<Self> {
        let registry = Registry::new();

        let credits_sent = IntCounterVec::new(
            Opts::new("aiperf_credits_sent_total", "Credits dropped onto the bus, by phase"),
            &["phase"],
        )
        .map_err(|e| AiperfError::Configuration(format!("failed to build credits_sent metric: {e}")))?;
        let credits_completed = IntCounterVec::new(
            Opts::new("aiperf_credits_completed_total", "Credits returned successfully, by phase"),
            &["phase"],
        )
        .map_err(|e| AiperfError::Configuration(format!("failed to build credits_completed metric: {e}")))?;
        let credits_failed = IntCounterVec::new(
            Opts::new("aiperf_credits_failed_total", "Credits returned as failures, by phase"),
            &["phase"],
        )
        .map_err(|e| AiperfError::Configuration(format!("failed to build credits_failed metric: {e}")))?;
        let http_errors = IntCounterVec::new(
            Opts::new("aiperf_http_errors_total", "HTTP-layer request failures, by error type"),
            &["error_type"],
        )
        .map_err(|e| AiperfError::Configuration(format!("failed to build http_errors metric: {e}")))?;

        registry
            .register(Box::new(credits_sent.clone()))
            .map_err(|e| AiperfError::Configuration(format!("failed to register credits_sent: {e}")))?;
        registry
            .register(Box::new(credits_completed.clone()))
            .map_err(|e| AiperfError::Configuration(format!("failed to register credits_completed: {e}")))?;
        registry
            .register(Box::new(credits_failed.clone()))
            .map_err(|e| AiperfError::Configuration(format!("failed to register credits_failed: {e}")))?;
        registry
            .register(Box::new(http_errors.clone()))
            .map_err(|e| AiperfError::Configuration(format!("failed to register http_errors: {e}")))?;

        Ok(Self {
            registry,
            credits_sent,
            credits_completed,
            credits_failed,
            http_errors,
        })
    }

    pub fn record_credit_sent(&self, phase: CreditPhase) {
        self.credits_sent.with_label_values(&[&phase.to_string()]).inc();
    }

    pub fn record_credit_completed(&self, phase: CreditPhase, failed: bool) {
        if failed {
            self.credits_failed.with_label_values(&[&phase.to_string()]).inc();
        } else {
            self.credits_completed.with_label_values(&[&phase.to_string()]).inc();
        }
    }

    pub fn record_http_error(&self, error_type: &str) {
        self.http_errors.with_label_values(&[error_type]).inc();
    }

    /// Renders every registered metric in Prometheus text exposition
    /// format, for a caller to serve or write to a file.
    pub fn gather_text(&self) -> AiperfResult<String> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        encoder
            .encode_to_string(&families)
            .map_err(|e| AiperfError::Configuration(format!("failed to encode metrics: {e}")))
    }
}

impl Default for PrometheusMetrics {
    fn default() -> Self {
        Self::new().expect("metric descriptors are static and always valid")
    }
}
