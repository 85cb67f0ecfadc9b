//! Inference-result parser: transforms raw worker output into parsed,
//! token-counted records (spec §4.6).

mod parser;
mod tokenizer_cache;

pub use parser::{Parser, ParserConfig};
pub use tokenizer_cache::TokenizerCache;

#[cfg(test)]
mod tests {
    use super::*;
    use aiperf_bus::{envelope::queues, Broker, Envelope};
    use aiperf_core::{
        perf_ns, wall_ns, AiperfError, CreditPhase, ErrorDetails, MessageType, RawResponse, RequestRecord,
    };
    use aiperf_dataset::{DatasetManager, SyntheticConfig, SyntheticGenerator};
    use aiperf_service::ServiceRuntime;
    use aiperf_worker::EndpointFamily;
    use std::time::Duration;

    async fn ready_dataset(broker: Broker) -> DatasetManager {
        let dataset = DatasetManager::new(3, broker);
        dataset.set_expected_total(1).await;
        let generated = SyntheticGenerator::new(SyntheticConfig {
            num_conversations: 1,
            turns_per_conversation: 1,
            mean_input_tokens: 8,
            random_seed: 3,
        })
        .generate();
        dataset.ingest_generated(generated).await;
        dataset
    }

    fn base_record(conversation_id: String, responses: Vec<RawResponse>, error: Option<ErrorDetails>) -> RequestRecord {
        RequestRecord {
            x_request_id: "req-1".into(),
            x_correlation_id: "corr-1".into(),
            worker_id: "worker-1".into(),
            model: "llama".into(),
            conversation_id,
            turn_index: 0,
            credit_phase: CreditPhase::Profiling,
            timestamp_ns: wall_ns(),
            start_perf_ns: perf_ns(),
            end_perf_ns: perf_ns(),
            request_payload: b"{}".to_vec(),
            responses,
            error,
            delayed_ns: 0,
            pre_inference_ns: None,
        }
    }

    #[tokio::test]
    async fn parses_a_successful_record_with_token_counts() {
        let broker = Broker::default();
        let dataset = ready_dataset(broker.clone()).await;
        let parser = Parser::new(
            "parser-1",
            broker.clone(),
            dataset.clone(),
            ParserConfig { family: EndpointFamily::Chat },
        );
        let runtime = ServiceRuntime::new(parser);
        runtime.initialize().await.unwrap();
        runtime.start().await.unwrap();

        let conversation_id = "synthetic-0".to_string();
        let raw = br#"{"choices":[{"delta":{"content":"hello world"}}]}"#.to_vec();
        let record = base_record(
            conversation_id,
            vec![RawResponse { perf_ns: perf_ns(), payload: raw }],
            None,
        );
        let envelope = Envelope::new(queues::RAW_INFERENCE_RESULTS, MessageType::InferenceResults, &record).unwrap();
        broker.push(queues::RAW_INFERENCE_RESULTS, envelope).await.unwrap();

        let parsed_receiver = broker.queue_receiver(queues::PARSED_INFERENCE_RESULTS);
        let parsed: aiperf_core::ParsedResponseRecord = tokio::time::timeout(Duration::from_secs(5), async {
            let envelope = parsed_receiver.recv().await.unwrap();
            envelope.decode().unwrap()
        })
        .await
        .expect("parser should push a parsed result");

        assert_eq!(parsed.responses.len(), 1);
        assert_eq!(parsed.output_token_count, Some(2));
        assert!(parsed.input_token_count.is_some());
        assert!(parsed.error.is_none());

        runtime.stop().await.unwrap();
    }

    #[tokio::test]
    async fn preserves_the_error_instead_of_extracting() {
        let broker = Broker::default();
        let dataset = ready_dataset(broker.clone()).await;
        let parser = Parser::new(
            "parser-2",
            broker.clone(),
            dataset,
            ParserConfig { family: EndpointFamily::Chat },
        );
        let runtime = ServiceRuntime::new(parser);
        runtime.initialize().await.unwrap();
        runtime.start().await.unwrap();

        let error = ErrorDetails::from(AiperfError::Inference("connection reset".into()));
        let record = base_record("synthetic-0".into(), Vec::new(), Some(error));
        let envelope = Envelope::new(queues::RAW_INFERENCE_RESULTS, MessageType::InferenceResults, &record).unwrap();
        broker.push(queues::RAW_INFERENCE_RESULTS, envelope).await.unwrap();

        let parsed_receiver = broker.queue_receiver(queues::PARSED_INFERENCE_RESULTS);
        let parsed: aiperf_core::ParsedResponseRecord = tokio::time::timeout(Duration::from_secs(5), async {
            let envelope = parsed_receiver.recv().await.unwrap();
            envelope.decode().unwrap()
        })
        .await
        .expect("parser should still push a parsed result for an error record");

        assert!(parsed.responses.is_empty());
        assert!(parsed.error.is_some());

        runtime.stop().await.unwrap();
    }

    #[tokio::test]
    async fn parse_failure_is_forwarded_as_an_error_tagged_record() {
        let broker = Broker::default();
        let dataset = ready_dataset(broker.clone()).await;
        let parser = Parser::new(
            "parser-3",
            broker.clone(),
            dataset,
            ParserConfig { family: EndpointFamily::Chat },
        );
        let runtime = ServiceRuntime::new(parser);
        runtime.initialize().await.unwrap();
        runtime.start().await.unwrap();

        // Valid response payload, but an unknown conversation_id: extraction
        // succeeds, the dataset turn lookup that follows it does not.
        let raw = br#"{"choices":[{"delta":{"content":"hello"}}]}"#.to_vec();
        let record = base_record(
            "no-such-conversation".into(),
            vec![RawResponse { perf_ns: perf_ns(), payload: raw }],
            None,
        );
        let envelope = Envelope::new(queues::RAW_INFERENCE_RESULTS, MessageType::InferenceResults, &record).unwrap();
        broker.push(queues::RAW_INFERENCE_RESULTS, envelope).await.unwrap();

        let parsed_receiver = broker.queue_receiver(queues::PARSED_INFERENCE_RESULTS);
        let parsed: aiperf_core::ParsedResponseRecord = tokio::time::timeout(Duration::from_secs(5), async {
            let envelope = parsed_receiver.recv().await.unwrap();
            envelope.decode().unwrap()
        })
        .await
        .expect("a parse_one failure should still be forwarded, not dropped");

        assert_eq!(parsed.x_request_id, "req-1");
        assert!(parsed.error.is_some());
        assert_eq!(parsed.error.unwrap().error_type, "DatasetError");

        runtime.stop().await.unwrap();
    }
}
