//! One `reqwest::Client` per worker process, grounded on the connection-pool
//! construction pattern in `rust_loadtest`'s worker module.

use std::time::Duration;

use aiperf_core::{AiperfError, AiperfResult};

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub request_timeout: Duration,
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            pool_max_idle_per_host: 64,
        }
    }
}

pub fn build_client(config: &HttpClientConfig) -> AiperfResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.request_timeout)
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .build()
        .map_err(|err| AiperfError::Configuration(format!("failed to build HTTP client: {err}")))
}
