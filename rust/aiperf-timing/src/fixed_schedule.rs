//! S3: fixed-schedule replay against a pre-recorded `(timestamp_ns,
//! conversation_id)` trace obtained from the dataset manager. No warmup.

use std::sync::Arc;
use std::time::Duration;

use aiperf_core::{AiperfError, AiperfResult, PerfNs};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::phase_runner::PhaseRunner;
use crate::strategy::CreditIssuingStrategy;

pub struct FixedScheduleStrategy {
    timing_data: Vec<(i64, String)>,
}

impl FixedScheduleStrategy {
    /// Open Question 3: an empty or all-`None`-timestamp timing response is
    /// a configuration error raised here, not silently downgraded to
    /// another strategy.
    pub fn new(timing_data: Vec<(i64, String)>) -> AiperfResult<Self> {
        if timing_data.is_empty() {
            return Err(AiperfError::Configuration(
                "fixed_schedule mode requires a non-empty dataset timing schedule".into(),
            ));
        }
        Ok(Self { timing_data })
    }

    pub fn entry_count(&self) -> u64 {
        self.timing_data.len() as u64
    }
}

#[async_trait]
impl CreditIssuingStrategy for FixedScheduleStrategy {
    async fn emit(&self, runner: Arc<PhaseRunner>, cancel: CancellationToken) -> AiperfResult<()> {
        let t0 = PerfNs::now();
        for (timestamp_ns, conversation_id) in &self.timing_data {
            if cancel.is_cancelled() {
                break;
            }
            let target_ns = t0.0 + *timestamp_ns;
            let wait_ns = target_ns - PerfNs::now().0;
            if wait_ns > 0 {
                tokio::time::sleep(Duration::from_nanos(wait_ns as u64)).await;
            }
            runner
                .drop_credit(Some(conversation_id.clone()), Some(PerfNs::now().0))
                .await?;
        }
        runner.mark_sending_complete().await
    }
}
