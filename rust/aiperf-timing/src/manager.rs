//! The timing manager service: selects a strategy from [`TimingConfig`],
//! builds the phase list, and drives warmup/profiling end to end.

use std::sync::Arc;
use std::time::Duration;

use aiperf_bus::{envelope::queues, envelope::subjects, Broker, Envelope};
use aiperf_core::{AiperfError, AiperfResult, CreditPhase, CreditReturn, MessageType};
use aiperf_dataset::DatasetManager;
use aiperf_service::{CommandKind, CommandMessage, CommandOutcome, Service};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::concurrency::ConcurrencyStrategy;
use crate::config::TimingConfig;
use crate::config::TimingMode;
use crate::fixed_schedule::FixedScheduleStrategy;
use crate::phase_runner::PhaseRunner;
use crate::rate::RequestRateStrategy;
use crate::strategy::{CreditIssuingStrategy, PhaseShape};

/// How long the manager waits for in-flight credits to drain after an
/// external cancel before force-publishing phase completion regardless.
const CANCEL_DRAIN_GRACE: Duration = Duration::from_secs(3);
const DATASET_TIMING_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditsCompletePayload {
    pub cancelled: bool,
}

#[derive(Clone)]
struct PhaseSpec {
    phase: CreditPhase,
    shape: PhaseShape,
}

pub struct TimingManager {
    service_id: String,
    broker: Broker,
    dataset: DatasetManager,
    config: TimingConfig,
    strategy: OnceCell<Arc<dyn CreditIssuingStrategy>>,
    phases: OnceCell<Vec<PhaseSpec>>,
    runners: Arc<DashMap<CreditPhase, Arc<PhaseRunner>>>,
}

impl TimingManager {
    pub fn new(service_id: impl Into<String>, broker: Broker, dataset: DatasetManager, config: TimingConfig) -> Self {
        Self {
            service_id: service_id.into(),
            broker,
            dataset,
            config,
            strategy: OnceCell::new(),
            phases: OnceCell::new(),
            runners: Arc::new(DashMap::new()),
        }
    }

    async fn build(&self) -> AiperfResult<()> {
        let mut phases = Vec::new();
        let strategy: Arc<dyn CreditIssuingStrategy> = match self.config.mode {
            TimingMode::Concurrency => {
                let concurrency = self.config.concurrency.ok_or_else(|| {
                    AiperfError::Configuration("concurrency mode requires --concurrency".into())
                })?;
                if self.config.has_warmup() {
                    phases.push(PhaseSpec {
                        phase: CreditPhase::Warmup,
                        shape: PhaseShape::Count(self.config.warmup_request_count),
                    });
                }
                phases.push(self.profiling_phase()?);
                Arc::new(ConcurrencyStrategy::new(concurrency, self.dataset.clone()))
            }
            TimingMode::RequestRate => {
                let rate = self.config.request_rate.ok_or_else(|| {
                    AiperfError::Configuration("request_rate mode requires --request-rate".into())
                })?;
                if self.config.has_warmup() {
                    phases.push(PhaseSpec {
                        phase: CreditPhase::Warmup,
                        shape: PhaseShape::Count(self.config.warmup_request_count),
                    });
                }
                phases.push(self.profiling_phase()?);
                Arc::new(RequestRateStrategy::new(
                    rate,
                    self.config.request_rate_mode,
                    self.config.max_concurrency,
                    self.config.random_seed,
                    self.dataset.clone(),
                ))
            }
            TimingMode::FixedSchedule => {
                let timing = self
                    .dataset
                    .handle_dataset_timing_request(DATASET_TIMING_DEADLINE)
                    .await?;
                let strategy = FixedScheduleStrategy::new(timing.timing_data)?;
                phases.push(PhaseSpec {
                    phase: CreditPhase::Profiling,
                    shape: PhaseShape::Count(strategy.entry_count()),
                });
                Arc::new(strategy)
            }
        };

        self.strategy
            .set(strategy)
            .map_err(|_| AiperfError::InvalidState("timing manager already initialized".into()))?;
        self.phases
            .set(phases)
            .map_err(|_| AiperfError::InvalidState("timing manager already initialized".into()))?;
        Ok(())
    }

    fn profiling_phase(&self) -> AiperfResult<PhaseSpec> {
        if let Some(duration_sec) = self.config.benchmarking_duration_sec {
            return Ok(PhaseSpec {
                phase: CreditPhase::Profiling,
                shape: PhaseShape::Duration {
                    expected_duration_ns: (duration_sec * 1_000_000_000.0) as i64,
                },
            });
        }
        let count = self.config.request_count.ok_or_else(|| {
            AiperfError::Configuration("profiling phase requires request_count or benchmarking_duration".into())
        })?;
        Ok(PhaseSpec {
            phase: CreditPhase::Profiling,
            shape: PhaseShape::Count(count),
        })
    }

    fn spawn_return_listener(&self) -> JoinHandle<()> {
        let broker = self.broker.clone();
        let runners = Arc::clone(&self.runners);
        tokio::spawn(async move {
            let receiver = broker.queue_receiver(queues::CREDIT_RETURN);
            while let Ok(envelope) = receiver.recv().await {
                let ret: CreditReturn = match envelope.decode() {
                    Ok(ret) => ret,
                    Err(err) => {
                        warn!(error = %err, "failed to decode credit return");
                        continue;
                    }
                };
                if let Some(runner) = runners.get(&ret.credit_phase) {
                    runner.handle_return(&ret).await;
                }
            }
        })
    }

    async fn publish_credits_complete(&self, cancelled: bool) -> AiperfResult<()> {
        let payload = CreditsCompletePayload { cancelled };
        let envelope = Envelope::new(subjects::CREDITS_COMPLETE, MessageType::CreditsComplete, &payload)?;
        self.broker.publish(envelope);
        Ok(())
    }
}

#[async_trait]
impl Service for TimingManager {
    fn service_id(&self) -> &str {
        &self.service_id
    }

    fn service_type(&self) -> &'static str {
        "timing_manager"
    }

    async fn on_init(&self) -> AiperfResult<()> {
        self.build().await
    }

    async fn on_command(&self, command: &CommandMessage) -> AiperfResult<CommandOutcome> {
        match command.command {
            CommandKind::ProfileStart => Ok(CommandOutcome::Acknowledged),
            _ => Ok(CommandOutcome::Unhandled),
        }
    }

    async fn background_task(&self, cancel: CancellationToken) -> AiperfResult<()> {
        let strategy = self
            .strategy
            .get()
            .ok_or_else(|| AiperfError::InvalidState("timing manager not initialized".into()))?
            .clone();
        let phases = self
            .phases
            .get()
            .ok_or_else(|| AiperfError::InvalidState("timing manager not initialized".into()))?
            .clone();

        let return_listener = self.spawn_return_listener();
        let mut cancelled = false;

        for spec in &phases {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let runner = match spec.shape {
                PhaseShape::Count(n) => PhaseRunner::new_count_based(spec.phase, n, self.broker.clone()),
                PhaseShape::Duration { expected_duration_ns } => {
                    PhaseRunner::new_time_based(spec.phase, expected_duration_ns, self.broker.clone())
                }
            };
            self.runners.insert(spec.phase, Arc::clone(&runner));
            runner.start().await?;
            let ticker = runner.spawn_progress_ticker(self.config.progress_interval);

            strategy.emit(Arc::clone(&runner), cancel.clone()).await?;

            if cancel.is_cancelled() {
                cancelled = true;
                match tokio::time::timeout(CANCEL_DRAIN_GRACE, runner.wait_for_drain_and_complete()).await {
                    Ok(result) => result?,
                    Err(_) => warn!(phase = %spec.phase, "drain grace period elapsed, completing with in-flight work outstanding"),
                }
                ticker.abort();
                break;
            }

            runner.wait_for_drain_and_complete().await?;
            ticker.abort();
        }

        return_listener.abort();
        info!(cancelled, "profile run finished");
        self.publish_credits_complete(cancelled).await
    }
}
