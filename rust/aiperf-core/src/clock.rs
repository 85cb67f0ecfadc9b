//! Clock discipline: a wall clock for external events, a monotonic
//! performance clock for latency arithmetic. The two are never mixed —
//! each is its own newtype so subtracting across clocks is a type error.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Nanoseconds on the wall clock, captured at the moment of an external event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct WallNs(pub i64);

impl WallNs {
    pub fn now() -> Self {
        let dur = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        WallNs(dur.as_nanos() as i64)
    }
}

/// Nanoseconds on the monotonic performance clock, used for all latency math.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct PerfNs(pub i64);

impl PerfNs {
    /// Monotonic time relative to a process-wide epoch `Instant`.
    pub fn now() -> Self {
        PerfNs(perf_epoch().elapsed().as_nanos() as i64)
    }

    pub fn saturating_sub(self, other: PerfNs) -> i64 {
        self.0.saturating_sub(other.0)
    }
}

impl std::ops::Sub for PerfNs {
    type Output = i64;
    fn sub(self, rhs: PerfNs) -> i64 {
        self.0 - rhs.0
    }
}

fn perf_epoch() -> &'static Instant {
    static EPOCH: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    EPOCH.get_or_init(Instant::now)
}

/// Returns the current monotonic performance timestamp.
pub fn perf_ns() -> PerfNs {
    PerfNs::now()
}

/// Returns the current wall-clock timestamp.
pub fn wall_ns() -> WallNs {
    WallNs::now()
}
