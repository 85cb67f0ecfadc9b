//! Metric registry, percentile aggregation, and result export (component
//! C7, spec §4.7): the terminal stage that turns parsed inference results
//! into a published [`ProfileResults`] summary.

mod aggregate;
mod exporter;
mod manager;
mod metric;
mod registry;
mod summary;

pub use aggregate::{MetricAggregator, MetricSummaryStats};
pub use exporter::{Exporter, JsonFileExporter};
pub use manager::RecordsManager;
pub use metric::{default_metrics, MetricDefinition, MetricKey};
pub use registry::MetricRegistry;
pub use summary::{ErrorDetailsCount, MetricsSummary, ProfileResults};

#[cfg(test)]
mod tests {
    use super::*;
    use aiperf_bus::{envelope::queues, envelope::subjects, Broker, Envelope};
    use aiperf_core::{perf_ns, wall_ns, CreditPhase, MessageType, ParsedResponseRecord};
    use aiperf_service::ServiceRuntime;
    use std::time::Duration;

    #[tokio::test]
    async fn published_profile_results_are_observable_on_the_bus() {
        let broker = Broker::default();
        let registry = MetricRegistry::new(default_metrics()).unwrap();
        let manager = RecordsManager::new("records-2", broker.clone(), registry, Vec::new());
        let runtime = ServiceRuntime::new(manager);
        runtime.initialize().await.unwrap();
        runtime.start().await.unwrap();

        let mut subscriber = broker.subscribe();

        let record = ParsedResponseRecord {
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
            error: None,
        };
        let envelope = Envelope::new(queues::PARSED_INFERENCE_RESULTS, MessageType::ParsedInferenceResults, &record).unwrap();
        broker.push(queues::PARSED_INFERENCE_RESULTS, envelope).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let command = aiperf_service::CommandMessage::broadcast(aiperf_service::CommandKind::ProcessRecords, None);
        runtime.dispatch_command(&command).await.unwrap();

        let envelope = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let envelope = subscriber.recv().await.unwrap();
                if envelope.subject == subjects::PROFILE_RESULTS {
                    return envelope;
                }
            }
        })
        .await
        .expect("profile_results should be published");
        let results: ProfileResults = envelope.decode().unwrap();
        assert_eq!(results.total_records, 1);

        runtime.stop().await.unwrap();
    }
}
