//! Global tracing subscriber installation. Called exactly once, by the
//! controller binary; library crates only ever call `tracing::info!` and
//! friends, never install a subscriber themselves.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// `AIPERF_LOG` overrides the level (`error`/`warn`/`info`/`debug`/`trace`,
/// or a full `tracing-subscriber` filter directive). Defaults to `info`.
const LOG_ENV_VAR: &str = "AIPERF_LOG";

#[derive(Debug, thiserror::Error)]
pub enum TracingInitError {
    #[error("tracing subscriber already installed")]
    AlreadyInstalled,
}

/// Installs a filtered, JSON-capable `fmt` subscriber. `json` selects
/// structured output (for log aggregation) over the human-readable
/// default (for a terminal).
pub fn init_tracing(json: bool) -> Result<(), TracingInitError> {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry.with(fmt::layer().json().with_target(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };
    result.map_err(|_| TracingInitError::AlreadyInstalled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_reports_already_installed() {
        let _ = init_tracing(false);
        let second = init_tracing(false);
        assert!(matches!(second, Err(TracingInitError::AlreadyInstalled)));
    }
}
