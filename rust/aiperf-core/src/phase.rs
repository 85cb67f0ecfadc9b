//! Credit phases and per-phase accounting.

use crate::clock::PerfNs;
use serde::{Deserialize, Serialize};

/// A named sub-run with independent credit accounting.
///
/// Resolves Open Question 1 in favor of the two-state model: the richer
/// `{WARMUP, RAMP_UP, STABILIZING, STEADY_STATE}` enum seen elsewhere in the
/// original source is not reachable from the timing manager and is not
/// modeled here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditPhase {
    Warmup,
    Profiling,
}

impl std::fmt::Display for CreditPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CreditPhase::Warmup => write!(f, "warmup"),
            CreditPhase::Profiling => write!(f, "profiling"),
        }
    }
}

/// Per-phase counters, wall-clock bounds, and expected-work accounting.
///
/// Invariants (see spec §3):
/// - `sent >= completed + failed`
/// - exactly one of `total_expected_requests` / `expected_duration_ns` is set
/// - sending-complete when the should-send predicate turns false
/// - complete when sending-complete and `in_flight() == 0`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditPhaseStats {
    pub phase: CreditPhase,
    pub start_ns: Option<PerfNs>,
    pub end_ns: Option<PerfNs>,
    pub sent_end_ns: Option<PerfNs>,
    pub total_expected_requests: Option<u64>,
    pub expected_duration_ns: Option<i64>,
    pub sent: u64,
    pub completed: u64,
    pub failed: u64,
}

impl CreditPhaseStats {
    pub fn new_count_based(phase: CreditPhase, total_expected_requests: u64) -> Self {
        Self {
            phase,
            start_ns: None,
            end_ns: None,
            sent_end_ns: None,
            total_expected_requests: Some(total_expected_requests),
            expected_duration_ns: None,
            sent: 0,
            completed: 0,
            failed: 0,
        }
    }

    pub fn new_time_based(phase: CreditPhase, expected_duration_ns: i64) -> Self {
        Self {
            phase,
            start_ns: None,
            end_ns: None,
            sent_end_ns: None,
            total_expected_requests: None,
            expected_duration_ns: Some(expected_duration_ns),
            sent: 0,
            completed: 0,
            failed: 0,
        }
    }

    pub fn is_time_based(&self) -> bool {
        self.expected_duration_ns.is_some()
    }

    pub fn is_count_based(&self) -> bool {
        self.total_expected_requests.is_some()
    }

    pub fn is_started(&self) -> bool {
        self.start_ns.is_some()
    }

    pub fn is_sending_complete(&self) -> bool {
        self.sent_end_ns.is_some()
    }

    pub fn in_flight(&self) -> u64 {
        self.sent.saturating_sub(self.completed + self.failed)
    }

    pub fn is_complete(&self) -> bool {
        self.is_sending_complete() && self.in_flight() == 0
    }

    /// Percentage of progress through the phase, or `None` if not yet started
    /// or progress cannot be determined.
    pub fn progress_percent(&self) -> Option<f64> {
        if !self.is_started() {
            return None;
        }
        if self.is_complete() {
            return Some(100.0);
        }
        if let (Some(start), Some(duration_ns)) = (self.start_ns, self.expected_duration_ns) {
            if duration_ns <= 0 {
                return Some(100.0);
            }
            let elapsed = PerfNs::now() - start;
            return Some((elapsed as f64 / duration_ns as f64) * 100.0);
        }
        if let Some(total) = self.total_expected_requests {
            if total == 0 {
                return Some(100.0);
            }
            return Some((self.completed + self.failed) as f64 / total as f64 * 100.0);
        }
        None
    }

    pub fn mark_started(&mut self) {
        self.start_ns = Some(PerfNs::now());
    }

    pub fn mark_sending_complete(&mut self) {
        self.sent_end_ns = Some(PerfNs::now());
    }

    pub fn mark_ended(&mut self) {
        self.end_ns = Some(PerfNs::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_based_in_flight_and_complete() {
        let mut stats = CreditPhaseStats::new_count_based(CreditPhase::Profiling, 3);
        stats.mark_started();
        stats.sent = 3;
        stats.mark_sending_complete();
        assert_eq!(stats.in_flight(), 3);
        assert!(!stats.is_complete());

        stats.completed = 2;
        stats.failed = 1;
        assert_eq!(stats.in_flight(), 0);
        assert!(stats.is_complete());
        assert_eq!(stats.progress_percent(), Some(100.0));
    }

    #[test]
    fn time_based_is_distinguishable_from_count_based() {
        let time_based = CreditPhaseStats::new_time_based(CreditPhase::Profiling, 1_000_000_000);
        assert!(time_based.is_time_based());
        assert!(!time_based.is_count_based());

        let count_based = CreditPhaseStats::new_count_based(CreditPhase::Profiling, 10);
        assert!(count_based.is_count_based());
        assert!(!count_based.is_time_based());
    }
}
