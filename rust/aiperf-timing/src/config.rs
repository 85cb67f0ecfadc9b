//! Timing manager configuration: the subset of `UserConfig` that selects a
//! load-generation strategy and its phase shape.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestRateMode {
    Constant,
    Poisson,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingMode {
    Concurrency,
    RequestRate,
    FixedSchedule,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    pub mode: TimingMode,
    pub concurrency: Option<u64>,
    pub request_rate: Option<f64>,
    pub request_rate_mode: RequestRateMode,
    pub max_concurrency: Option<u64>,
    pub request_count: Option<u64>,
    pub benchmarking_duration_sec: Option<f64>,
    pub warmup_request_count: u64,
    pub random_seed: u64,
    #[serde(with = "humantime_serde_millis")]
    pub progress_interval: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            mode: TimingMode::Concurrency,
            concurrency: Some(1),
            request_rate: None,
            request_rate_mode: RequestRateMode::Constant,
            max_concurrency: None,
            request_count: Some(1),
            benchmarking_duration_sec: None,
            warmup_request_count: 0,
            random_seed: 0,
            progress_interval: Duration::from_millis(500),
        }
    }
}

impl TimingConfig {
    pub fn has_warmup(&self) -> bool {
        self.warmup_request_count > 0
    }
}

/// Minimal millisecond (de)serializer so `progress_interval` reads as a
/// plain integer in the YAML config rather than pulling in a full
/// humantime dependency for one field.
mod humantime_serde_millis {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
