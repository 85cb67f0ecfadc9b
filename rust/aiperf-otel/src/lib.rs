//! Tracing subscriber installation and the optional Prometheus metrics
//! registry. Owned by the controller binary; every other crate only
//! emits `tracing` events and never installs a subscriber itself.

mod metrics;
mod tracing;

pub use metrics::PrometheusMetrics;
pub use tracing::{init_tracing, TracingInitError};
