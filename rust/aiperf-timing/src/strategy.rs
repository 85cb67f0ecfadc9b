//! The pluggable credit-emission strategy and the phase shape it builds.

use std::sync::Arc;

use aiperf_core::AiperfResult;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::phase_runner::PhaseRunner;

/// One phase's expected size, in whichever unit the strategy uses.
#[derive(Debug, Clone, Copy)]
pub enum PhaseShape {
    Count(u64),
    Duration { expected_duration_ns: i64 },
}

/// A load-generation policy. Implementations drive exactly one phase's
/// credit-emission loop per call to [`CreditIssuingStrategy::emit`]; the
/// [`PhaseRunner`] they're given owns publishing and accounting.
#[async_trait]
pub trait CreditIssuingStrategy: Send + Sync {
    /// Runs the should-send loop for one phase, calling `runner.drop_credit`
    /// for each credit it issues, then `runner.mark_sending_complete()` once
    /// the predicate turns false or the run is cancelled. Does not wait for
    /// in-flight credits to drain; the caller does that separately.
    async fn emit(&self, runner: Arc<PhaseRunner>, cancel: CancellationToken) -> AiperfResult<()>;
}
