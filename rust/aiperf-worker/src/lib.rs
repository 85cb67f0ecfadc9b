//! The worker pool: HTTP/SSE client plumbing, request converters, and the
//! credit-pull loop that turns dataset turns into inference requests
//! (spec §4.5).

mod converter;
mod health;
mod http_client;
mod sse;
mod worker;

pub use converter::{
    extractor_for, ChatConverter, ChatExtractor, EndpointFamily, ModelEndpointInfo, RequestConverter,
    ResponseExtractor, UnsupportedExtractor,
};
pub use health::{HealthReporter, WorkerTaskStats};
pub use http_client::{build_client, HttpClientConfig};
pub use sse::{SseDecoder, SseEvent};
pub use worker::{Worker, WorkerConfig};

#[cfg(test)]
mod tests {
    use super::*;
    use aiperf_bus::{envelope::queues, Broker};
    use aiperf_core::{CreditDrop, CreditPhase};
    use aiperf_dataset::{DatasetManager, SyntheticConfig, SyntheticGenerator};
    use aiperf_service::ServiceRuntime;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn ready_dataset(broker: Broker) -> DatasetManager {
        let dataset = DatasetManager::new(11, broker);
        dataset.set_expected_total(1).await;
        let generated = SyntheticGenerator::new(SyntheticConfig {
            num_conversations: 1,
            turns_per_conversation: 1,
            mean_input_tokens: 8,
            random_seed: 11,
        })
        .generate();
        dataset.ingest_generated(generated).await;
        dataset
    }

    #[tokio::test]
    async fn worker_executes_one_credit_and_returns_it() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_raw(
                        "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n\ndata: [DONE]\n\n",
                        "text/event-stream",
                    ),
            )
            .mount(&mock_server)
            .await;

        let broker = Broker::default();
        let dataset = ready_dataset(broker.clone()).await;
        let config = WorkerConfig {
            endpoint: ModelEndpointInfo {
                model: "llama".into(),
                base_url: mock_server.uri(),
                family: EndpointFamily::Chat,
                streaming: true,
            },
            max_concurrent_requests: 4,
            health_check_interval: Duration::from_millis(50),
            http: HttpClientConfig::default(),
        };
        let worker = Worker::new("worker-1", broker.clone(), dataset, config, Arc::new(ChatConverter));
        let runtime = ServiceRuntime::new(worker);
        runtime.initialize().await.unwrap();
        runtime.start().await.unwrap();

        let envelope = aiperf_bus::Envelope::new(
            queues::CREDIT_DROP,
            aiperf_core::MessageType::CreditDrop,
            &CreditDrop {
                credit_phase: CreditPhase::Profiling,
                conversation_id: None,
                credit_drop_ns: Some(aiperf_core::perf_ns().0),
            },
        )
        .unwrap();
        broker.push(queues::CREDIT_DROP, envelope).await.unwrap();

        let returns = broker.queue_receiver(queues::CREDIT_RETURN);
        let ret: CreditReturnForTest = tokio::time::timeout(Duration::from_secs(5), async {
            let envelope = returns.recv().await.unwrap();
            envelope.decode().unwrap()
        })
        .await
        .expect("worker should return the credit within the deadline");
        assert!(!ret.failed);

        let results = broker.queue_receiver(queues::RAW_INFERENCE_RESULTS);
        let record: aiperf_core::RequestRecord = tokio::time::timeout(Duration::from_secs(5), async {
            let envelope = results.recv().await.unwrap();
            envelope.decode().unwrap()
        })
        .await
        .expect("worker should push a raw inference record");
        assert_eq!(record.responses.len(), 1);

        runtime.stop().await.unwrap();
    }

    type CreditReturnForTest = aiperf_core::CreditReturn;
}
