//! Timing manager: selects a credit-issuing strategy and drives the
//! warmup/profiling phase sequence (component C4).

mod concurrency;
mod config;
mod fixed_schedule;
mod manager;
mod phase_runner;
mod rate;
mod strategy;

pub use concurrency::ConcurrencyStrategy;
pub use config::{RequestRateMode, TimingConfig, TimingMode};
pub use fixed_schedule::FixedScheduleStrategy;
pub use manager::{CreditsCompletePayload, TimingManager};
pub use phase_runner::PhaseRunner;
pub use rate::RequestRateStrategy;
pub use strategy::{CreditIssuingStrategy, PhaseShape};

#[cfg(test)]
mod tests {
    use super::*;
    use aiperf_bus::{envelope::queues, envelope::subjects, Broker, Envelope};
    use aiperf_core::{CreditReturn, MessageType};
    use aiperf_dataset::{DatasetManager, SyntheticConfig, SyntheticGenerator};
    use aiperf_service::{Service, ServiceRuntime};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    async fn ready_dataset(seed: u64, count: usize, broker: Broker) -> DatasetManager {
        let dataset = DatasetManager::new(seed, broker);
        dataset.set_expected_total(count).await;
        dataset
            .ingest_generated(
                SyntheticGenerator::new(SyntheticConfig {
                    num_conversations: count,
                    turns_per_conversation: 1,
                    mean_input_tokens: 16,
                    random_seed: seed,
                })
                .generate(),
            )
            .await;
        dataset
    }

    fn auto_return_credits(broker: Broker) {
        tokio::spawn(async move {
            let drops = broker.queue_receiver(queues::CREDIT_DROP);
            loop {
                match drops.recv().await {
                    Ok(envelope) => {
                        let drop: aiperf_core::CreditDrop = envelope.decode().unwrap();
                        let ret = CreditReturn {
                            credit_phase: drop.credit_phase,
                            conversation_id: drop.conversation_id,
                            credit_drop_ns: drop.credit_drop_ns,
                            delayed_ns: 0,
                            pre_inference_ns: None,
                            failed: false,
                        };
                        let env = Envelope::new(queues::CREDIT_RETURN, MessageType::CreditReturn, &ret).unwrap();
                        broker.push(queues::CREDIT_RETURN, env).await.unwrap();
                    }
                    Err(_) => break,
                }
            }
        });
    }

    #[tokio::test]
    async fn concurrency_strategy_completes_count_based_run() {
        let broker = Broker::default();
        let dataset = ready_dataset(1, 10, broker.clone()).await;
        auto_return_credits(broker.clone());

        let mut subscriber = broker.subscribe();
        let config = TimingConfig {
            mode: TimingMode::Concurrency,
            concurrency: Some(2),
            request_count: Some(10),
            warmup_request_count: 0,
            progress_interval: Duration::from_millis(50),
            ..TimingConfig::default()
        };
        let manager = TimingManager::new("timing-0", broker.clone(), dataset, config);
        let runtime = ServiceRuntime::new(manager);
        runtime.initialize().await.unwrap();
        runtime.start().await.unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        let mut saw_credits_complete = false;
        while tokio::time::Instant::now() < deadline {
            if let Ok(Ok(envelope)) =
                tokio::time::timeout(Duration::from_millis(200), subscriber.recv()).await
            {
                if envelope.subject == subjects::CREDITS_COMPLETE {
                    let payload: CreditsCompletePayload = envelope.decode().unwrap();
                    assert!(!payload.cancelled);
                    saw_credits_complete = true;
                    break;
                }
            }
        }
        assert!(saw_credits_complete, "expected CreditsComplete to be published");
        runtime.stop().await.unwrap();
    }

    #[tokio::test]
    async fn fixed_schedule_requires_nonempty_timing_data() {
        let broker = Broker::default();
        let dataset = DatasetManager::new(1, broker.clone());
        dataset.set_expected_total(0).await;

        let config = TimingConfig {
            mode: TimingMode::FixedSchedule,
            ..TimingConfig::default()
        };
        let manager = TimingManager::new("timing-1", broker, dataset, config);
        let result = manager.on_init().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn cancellation_publishes_credits_complete_with_cancelled_flag() {
        let broker = Broker::default();
        let dataset = ready_dataset(2, 1000, broker.clone()).await;

        let config = TimingConfig {
            mode: TimingMode::Concurrency,
            concurrency: Some(4),
            request_count: Some(1000),
            warmup_request_count: 0,
            progress_interval: Duration::from_millis(50),
            ..TimingConfig::default()
        };
        let manager = TimingManager::new("timing-2", broker.clone(), dataset, config);
        let mut subscriber = broker.subscribe();
        let runtime = ServiceRuntime::new(manager);
        runtime.initialize().await.unwrap();
        runtime.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        runtime.stop().await.unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        let mut saw_cancelled = false;
        while tokio::time::Instant::now() < deadline {
            if let Ok(Ok(envelope)) =
                tokio::time::timeout(Duration::from_millis(200), subscriber.recv()).await
            {
                if envelope.subject == subjects::CREDITS_COMPLETE {
                    let payload: CreditsCompletePayload = envelope.decode().unwrap();
                    saw_cancelled = payload.cancelled;
                    break;
                }
            }
        }
        assert!(saw_cancelled);
    }
}
