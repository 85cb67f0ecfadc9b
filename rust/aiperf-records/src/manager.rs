//! The records manager service (component C7, spec §4.7): consumes
//! parsed inference results, evaluates the metric registry, aggregates
//! percentiles per phase, and exports a [`ProfileResults`] summary on
//! `PROCESS_RECORDS`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use aiperf_bus::{envelope::queues, envelope::subjects, Broker, Envelope};
use aiperf_core::{AiperfResult, ErrorDetails, MessageType, ParsedResponseRecord};
use aiperf_service::{CommandKind, CommandMessage, CommandOutcome, Service};
use aiperf_timing::CreditsCompletePayload;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::aggregate::MetricAggregator;
use crate::exporter::Exporter;
use crate::registry::MetricRegistry;
use crate::summary::{ErrorDetailsCount, MetricsSummary, ProfileResults};

/// Consecutive empty polls of the parsed-results queue required before
/// [`RecordsManager::drain_pending`] considers the parser idle.
const DRAIN_SETTLE_CHECKS: u32 = 5;
const DRAIN_SETTLE_INTERVAL: Duration = Duration::from_millis(20);

pub struct RecordsManager {
    service_id: String,
    broker: Broker,
    registry: Arc<MetricRegistry>,
    aggregator: Arc<MetricAggregator>,
    exporters: Vec<Arc<dyn Exporter>>,
    total_records: Arc<AtomicU64>,
    error_records: Arc<AtomicU64>,
    errors_by_type: Arc<Mutex<HashMap<String, u64>>>,
    cancelled: Arc<AtomicBool>,
}

impl RecordsManager {
    pub fn new(
        service_id: impl Into<String>,
        broker: Broker,
        registry: MetricRegistry,
        exporters: Vec<Arc<dyn Exporter>>,
    ) -> Self {
        Self {
            service_id: service_id.into(),
            broker,
            registry: Arc::new(registry),
            aggregator: Arc::new(MetricAggregator::new()),
            exporters,
            total_records: Arc::new(AtomicU64::new(0)),
            error_records: Arc::new(AtomicU64::new(0)),
            errors_by_type: Arc::new(Mutex::new(HashMap::new())),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    async fn ingest(&self, record: ParsedResponseRecord) {
        self.total_records.fetch_add(1, Ordering::Relaxed);
        if let Some(error) = &record.error {
            self.error_records.fetch_add(1, Ordering::Relaxed);
            self.count_error(error).await;
            return;
        }

        let phase = record.credit_phase;
        let values = self.registry.evaluate(&record);
        for (metric, value) in values {
            self.aggregator.record(phase, &metric, value).await;
        }
    }

    async fn count_error(&self, error: &ErrorDetails) {
        let mut by_type = self.errors_by_type.lock().await;
        *by_type.entry(error.error_type.clone()).or_insert(0) += 1;
    }

    /// Drains the parsed-results queue when `PROCESS_RECORDS` arrives. The
    /// parser decodes and pushes each raw result from its own background
    /// task, so a single non-blocking sweep can run ahead of work already in
    /// flight; the bus has no bounded-queue `.join()` to wait on instead, so
    /// this keeps draining until the queue has come up empty
    /// `DRAIN_SETTLE_CHECKS` times in a row, `DRAIN_SETTLE_INTERVAL` apart,
    /// resetting the streak the moment more work shows up.
    async fn drain_pending(&self) {
        let receiver = self.broker.queue_receiver(queues::PARSED_INFERENCE_RESULTS);
        let mut idle_checks = 0u32;
        while idle_checks < DRAIN_SETTLE_CHECKS {
            let mut drained_any = false;
            while let Ok(envelope) = receiver.try_recv() {
                drained_any = true;
                if let Ok(record) = envelope.decode::<ParsedResponseRecord>() {
                    self.ingest(record).await;
                }
            }
            if drained_any {
                idle_checks = 0;
            } else {
                idle_checks += 1;
            }
            if idle_checks < DRAIN_SETTLE_CHECKS {
                tokio::time::sleep(DRAIN_SETTLE_INTERVAL).await;
            }
        }
    }

    async fn build_results(&self) -> ProfileResults {
        let metrics_snapshot = self.aggregator.snapshot().await;
        let metrics: HashMap<_, HashMap<String, MetricsSummary>> = metrics_snapshot
            .into_iter()
            .map(|(phase, by_metric)| {
                (
                    phase,
                    by_metric.into_iter().map(|(k, v)| (k, v.into())).collect(),
                )
            })
            .collect();

        let errors_by_type = self
            .errors_by_type
            .lock()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), ErrorDetailsCount { count: *v }))
            .collect();

        ProfileResults {
            total_records: self.total_records.load(Ordering::Relaxed),
            error_records: self.error_records.load(Ordering::Relaxed),
            errors_by_type,
            metrics,
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }

    async fn process_records(&self) -> AiperfResult<ProfileResults> {
        self.drain_pending().await;
        let results = self.build_results().await;

        let envelope = Envelope::new(subjects::PROFILE_RESULTS, MessageType::ProfileResults, &results)?;
        self.broker.publish(envelope);

        for exporter in &self.exporters {
            if let Err(err) = exporter.export(&results).await {
                warn!(error = %err, "exporter failed");
            }
        }
        Ok(results)
    }

    fn spawn_credits_complete_listener(&self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let mut subscriber = self.broker.subscribe();
        let cancelled_flag = Arc::clone(&self.cancelled);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = subscriber.recv() => match received {
                        Ok(envelope) if envelope.subject == subjects::CREDITS_COMPLETE => {
                            if let Ok(payload) = envelope.decode::<CreditsCompletePayload>() {
                                if payload.cancelled {
                                    cancelled_flag.store(true, Ordering::Relaxed);
                                }
                            }
                        }
                        Ok(_) => continue,
                        Err(_) => break,
                    },
                }
            }
        })
    }
}

#[async_trait]
impl Service for RecordsManager {
    fn service_id(&self) -> &str {
        &self.service_id
    }

    fn service_type(&self) -> &'static str {
        "records_manager"
    }

    async fn on_command(&self, command: &CommandMessage) -> AiperfResult<CommandOutcome> {
        match command.command {
            CommandKind::ProcessRecords => match self.process_records().await {
                Ok(results) => Ok(CommandOutcome::Success {
                    data: serde_json::to_value(&results).ok(),
                }),
                Err(err) => Ok(CommandOutcome::Error { error: err.into() }),
            },
            _ => Ok(CommandOutcome::Unhandled),
        }
    }

    async fn background_task(&self, cancel: CancellationToken) -> AiperfResult<()> {
        let credits_complete = self.spawn_credits_complete_listener(cancel.clone());
        let receiver = self.broker.queue_receiver(queues::PARSED_INFERENCE_RESULTS);
        loop {
            let envelope = tokio::select! {
                _ = cancel.cancelled() => break,
                received = receiver.recv() => match received {
                    Ok(envelope) => envelope,
                    Err(_) => break,
                },
            };

            match envelope.decode::<ParsedResponseRecord>() {
                Ok(record) => self.ingest(record).await,
                Err(err) => warn!(error = %err, "malformed parsed_inference_results envelope, skipping"),
            }
        }
        credits_complete.abort();
        info!(
            total = self.total_records.load(Ordering::Relaxed),
            errors = self.error_records.load(Ordering::Relaxed),
            "records manager background task exiting"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aiperf_core::{perf_ns, wall_ns, AiperfError, CreditPhase};
    use aiperf_service::ServiceRuntime;
    use std::time::Duration;

    fn base_record(error: Option<ErrorDetails>) -> ParsedResponseRecord {
        ParsedResponseRecord {
            x_request_id: "r".into(),
            x_correlation_id: "c".into(),
            worker_id: "w".into(),
            model: "llama".into(),
            conversation_id: "conv".into(),
            turn_index: 0,
            credit_phase: CreditPhase::Profiling,
            timestamp_ns: wall_ns(),
            start_perf_ns: perf_ns(),
            first_response_perf_ns: Some(perf_ns()),
            last_response_perf_ns: Some(perf_ns()),
            responses: Vec::new(),
            input_token_count: Some(4),
            output_token_count: Some(2),
            error,
        }
    }

    #[tokio::test]
    async fn process_records_reports_counts_and_errors() {
        let broker = Broker::default();
        let registry = MetricRegistry::new(crate::metric::default_metrics()).unwrap();
        let manager = RecordsManager::new("records-1", broker.clone(), registry, Vec::new());
        let runtime = ServiceRuntime::new(manager);
        runtime.initialize().await.unwrap();
        runtime.start().await.unwrap();

        let ok_envelope = Envelope::new(
            queues::PARSED_INFERENCE_RESULTS,
            MessageType::ParsedInferenceResults,
            &base_record(None),
        )
        .unwrap();
        broker.push(queues::PARSED_INFERENCE_RESULTS, ok_envelope).await.unwrap();

        let error = ErrorDetails::from(AiperfError::Inference("boom".into()));
        let err_envelope = Envelope::new(
            queues::PARSED_INFERENCE_RESULTS,
            MessageType::ParsedInferenceResults,
            &base_record(Some(error)),
        )
        .unwrap();
        broker.push(queues::PARSED_INFERENCE_RESULTS, err_envelope).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;

        let command = CommandMessage::broadcast(CommandKind::ProcessRecords, None);
        let outcome = runtime.dispatch_command(&command).await.unwrap();
        let CommandOutcome::Success { data } = outcome else {
            panic!("expected Success, got {outcome:?}");
        };
        let results: ProfileResults = serde_json::from_value(data.unwrap()).unwrap();
        assert_eq!(results.total_records, 2);
        assert_eq!(results.error_records, 1);
        assert_eq!(results.errors_by_type["InferenceError"].count, 1);

        runtime.stop().await.unwrap();
    }
}
