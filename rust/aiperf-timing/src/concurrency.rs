//! S1: fixed in-flight count via a counted semaphore.

use std::sync::Arc;

use aiperf_core::{AiperfResult, PerfNs};
use aiperf_dataset::{ConversationRequest, DatasetManager};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::phase_runner::PhaseRunner;
use crate::strategy::CreditIssuingStrategy;

const DATASET_REQUEST_DEADLINE: Duration = Duration::from_secs(5);

pub struct ConcurrencyStrategy {
    semaphore: Arc<Semaphore>,
    dataset: DatasetManager,
}

impl ConcurrencyStrategy {
    pub fn new(concurrency: u64, dataset: DatasetManager) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(concurrency.max(1) as usize)),
            dataset,
        }
    }
}

#[async_trait]
impl CreditIssuingStrategy for ConcurrencyStrategy {
    async fn emit(&self, runner: Arc<PhaseRunner>, cancel: CancellationToken) -> AiperfResult<()> {
        let semaphore = Arc::clone(&self.semaphore);
        runner
            .set_return_hook(Box::new(move |_ret| {
                semaphore.add_permits(1);
            }))
            .await;

        loop {
            if cancel.is_cancelled() {
                break;
            }
            let stats = runner.stats_snapshot().await;
            if !should_send(&stats) {
                break;
            }

            let acquired = if let Some(duration_ns) = stats.expected_duration_ns {
                let start = stats.start_ns.expect("phase started before emit runs");
                let remaining_ns = duration_ns - (PerfNs::now() - start);
                if remaining_ns <= 0 {
                    break;
                }
                let remaining = Duration::from_nanos(remaining_ns as u64);
                match tokio::time::timeout(remaining, self.semaphore.clone().acquire_owned()).await {
                    Ok(Ok(permit)) => Some(permit),
                    Ok(Err(_)) | Err(_) => None,
                }
            } else {
                self.semaphore.clone().acquire_owned().await.ok()
            };

            let Some(permit) = acquired else {
                debug!("concurrency deadline expired while waiting for a permit");
                break;
            };
            // Ownership of the permit transfers conceptually to the
            // in-flight credit; it is released by the return hook above
            // when the worker's `CreditReturn` arrives.
            permit.forget();

            let conversation_id = self
                .dataset
                .handle_conversation_request(
                    ConversationRequest { conversation_id: None },
                    DATASET_REQUEST_DEADLINE,
                )
                .await
                .map(|conversation| conversation.session_id)
                .ok();

            runner.drop_credit(conversation_id, None).await?;
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
