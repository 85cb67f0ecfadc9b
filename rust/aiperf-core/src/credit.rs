//! Credits: logical permission tokens, never persisted.

use crate::phase::CreditPhase;
use serde::{Deserialize, Serialize};

/// Permission to issue one inference request under a given phase.
///
/// A credit is dropped when the timing manager enqueues a [`CreditDrop`];
/// returned when the worker enqueues a [`CreditReturn`]. Every drop must
/// eventually be matched by exactly one return.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditDrop {
    pub credit_phase: CreditPhase,
    pub conversation_id: Option<String>,
    /// Scheduled drop time on the monotonic clock. `None` means send ASAP.
    pub credit_drop_ns: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditReturn {
    pub credit_phase: CreditPhase,
    pub conversation_id: Option<String>,
    pub credit_drop_ns: Option<i64>,
    /// How far the actual start lagged the scheduled drop time.
    pub delayed_ns: i64,
    /// For fixed-concurrency replay: time spent before inference began.
    pub pre_inference_ns: Option<i64>,
    pub failed: bool,
}
