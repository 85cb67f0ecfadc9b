//! Environment variable overlay (spec §6): ambient settings read
//! straight from the process environment, independent of the
//! `UserConfig` file/CLI path in [`crate::config`]. Mirrors the
//! teacher's `KNHK_`-prefixed overlay, renamed to `AIPERF_`.

use std::time::Duration;

/// Ambient settings read from `AIPERF_*` environment variables. These
/// aren't part of `UserConfig` because they tune the harness itself
/// (heartbeats, timeouts, worker caps) rather than the benchmark being
/// run, and apply regardless of which config file or CLI flags were
/// given.
#[derive(Debug, Clone)]
pub struct EnvOverlay {
    pub heartbeat_interval: Duration,
    pub command_response_timeout: Duration,
    pub worker_health_check_interval: Duration,
    pub max_workers_cap: u32,
    pub record_processor_scale_factor: u32,
    pub dev_mode: bool,
}

impl Default for EnvOverlay {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(5),
            command_response_timeout: Duration::from_secs(30),
            worker_health_check_interval: Duration::from_secs(10),
            max_workers_cap: 256,
            record_processor_scale_factor: 1,
            dev_mode: false,
        }
    }
}

impl EnvOverlay {
    /// Reads `AIPERF_*` from the real process environment, falling back
    /// to the documented default for anything unset or unparseable.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Same as [`Self::from_env`] but over an arbitrary iterator, so
    /// tests don't have to mutate the real process environment.
    pub fn from_vars(vars: impl Iterator<Item = (String, String)>) -> Self {
        let mut overlay = Self::default();
        for (key, value) in vars {
            let Some(setting) = key.strip_prefix("AIPERF_") else {
                continue;
            };
            match setting {
                "HEARTBEAT_INTERVAL" => {
                    if let Ok(secs) = value.parse() {
                        overlay.heartbeat_interval = Duration::from_secs_f64(secs);
                    }
                }
                "COMMAND_RESPONSE_TIMEOUT" => {
                    if let Ok(secs) = value.parse() {
                        overlay.command_response_timeout = Duration::from_secs_f64(secs);
                    }
                }
                "WORKER_HEALTH_CHECK_INTERVAL" => {
                    if let Ok(secs) = value.parse() {
                        overlay.worker_health_check_interval = Duration::from_secs_f64(secs);
                    }
                }
                "MAX_WORKERS_CAP" => {
                    if let Ok(cap) = value.parse() {
                        overlay.max_workers_cap = cap;
                    }
                }
                "RECORD_PROCESSOR_SCALE_FACTOR" => {
                    if let Ok(factor) = value.parse() {
                        overlay.record_processor_scale_factor = factor;
                    }
                }
                "DEV_MODE" => {
                    overlay.dev_mode = matches!(value.as_str(), "1" | "true" | "TRUE" | "yes");
                }
                _ => {}
            }
        }
        overlay
    }
}
