//! S2: open-loop request-rate strategy, constant or Poisson inter-arrival,
//! with an optional concurrency ceiling.

use std::sync::Arc;
use std::time::Duration;

use aiperf_core::{AiperfResult, PerfNs};
use aiperf_dataset::{ConversationRequest, DatasetManager};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Exp};
use tokio::sync::Semaphore;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::RequestRateMode;
use crate::phase_runner::PhaseRunner;
use crate::strategy::CreditIssuingStrategy;

const DATASET_REQUEST_DEADLINE: Duration = Duration::from_secs(5);

pub struct RequestRateStrategy {
    rate: f64,
    mode: RequestRateMode,
    max_concurrency: Option<Arc<Semaphore>>,
    rng: Mutex<StdRng>,
    dataset: DatasetManager,
}

impl RequestRateStrategy {
    pub fn new(
        rate: f64,
        mode: RequestRateMode,
        max_concurrency: Option<u64>,
        random_seed: u64,
        dataset: DatasetManager,
    ) -> Self {
        Self {
            rate,
            mode,
            max_concurrency: max_concurrency.map(|c| Arc::new(Semaphore::new(c as usize))),
            rng: Mutex::new(StdRng::seed_from_u64(random_seed)),
            dataset,
        }
    }

    async fn next_gap_ns(&self) -> i64 {
        let seconds = match self.mode {
            RequestRateMode::Constant => 1.0 / self.rate,
            RequestRateMode::Poisson => {
                let mut rng = self.rng.lock().await;
                Exp::new(self.rate).expect("rate must be positive").sample(&mut *rng)
            }
        };
        (seconds * 1_000_000_000.0).round() as i64
    }
}

#[async_trait]
impl CreditIssuingStrategy for RequestRateStrategy {
    async fn emit(&self, runner: Arc<PhaseRunner>, cancel: CancellationToken) -> AiperfResult<()> {
        if let Some(semaphore) = self.max_concurrency.clone() {
            runner
                .set_return_hook(Box::new(move |_ret| {
                    semaphore.add_permits(1);
                }))
                .await;
        }

        let stats = runner.stats_snapshot().await;
        let start = stats.start_ns.expect("phase started before emit runs");
        let mut target_ns: i64 = 0;

        loop {
            if cancel.is_cancelled() {
                break;
            }
            let stats = runner.stats_snapshot().await;
            if !should_send(&stats) {
                break;
            }

            target_ns += self.next_gap_ns().await;
            let now = PerfNs::now();
            let wait_ns = (start.0 + target_ns) - now.0;
            if wait_ns > 0 {
                tokio::time::sleep(Duration::from_nanos(wait_ns as u64)).await;
            }
            // Falling behind schedule still emits immediately; the worker
            // records how late the credit actually went out.

            if let Some(semaphore) = &self.max_concurrency {
                match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit.forget(),
                    Err(_) => break,
                }
            }

            let conversation_id = self
                .dataset
                .handle_conversation_request(
                    ConversationRequest { conversation_id: None },
                    DATASET_REQUEST_DEADLINE,
                )
                .await
                .map(|conversation| conversation.session_id)
                .ok();

            runner
                .drop_credit(conversation_id, Some(start.0 + target_ns))
                .await?;
        }

        runner.mark_sending_complete().await
    }
}

fn should_send(stats: &aiperf_core::CreditPhaseStats) -> bool {
    if let Some(total) = stats.total_expected_requests {
        return stats.sent < total;
    }
    if let Some(duration_ns) = stats.expected_duration_ns {
        let start = stats.start_ns.expect("phase started before should_send runs");
        return PerfNs::now() - start < duration_ns;
    }
    false
}
