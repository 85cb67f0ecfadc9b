//! The inference-result parser service (spec §4.6): raw -> parsed, with
//! token counting via the tokenizer cache.

use std::time::Duration;

use aiperf_bus::{envelope::queues, Broker, Envelope};
use aiperf_core::{
    AiperfResult, MessageType, ParsedResponseData, ParsedResponseRecord, RequestRecord,
};
use aiperf_dataset::{ConversationTurnRequest, DatasetManager};
use aiperf_service::{CommandMessage, CommandOutcome, Service};
use aiperf_worker::{extractor_for, EndpointFamily};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::tokenizer_cache::TokenizerCache;

const DATASET_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// The parser only ever sees the one endpoint family the run was
/// configured against; multi-family runs are out of scope (spec.md §1).
#[derive(Debug, Clone, Copy)]
pub struct ParserConfig {
    pub family: EndpointFamily,
}

pub struct Parser {
    service_id: String,
    broker: Broker,
    dataset: DatasetManager,
    config: ParserConfig,
    tokenizers: TokenizerCache,
}

impl Parser {
    pub fn new(service_id: impl Into<String>, broker: Broker, dataset: DatasetManager, config: ParserConfig) -> Self {
        Self {
            service_id: service_id.into(),
            broker,
            dataset,
            config,
            tokenizers: TokenizerCache::new(),
        }
    }

    async fn parse_one(&self, record: RequestRecord) -> AiperfResult<ParsedResponseRecord> {
        if let Some(error) = record.error {
            return Ok(ParsedResponseRecord {
                x_request_id: record.x_request_id,
                x_correlation_id: record.x_correlation_id,
                worker_id: record.worker_id,
                model: record.model,
                conversation_id: record.conversation_id,
                turn_index: record.turn_index,
                credit_phase: record.credit_phase,
                timestamp_ns: record.timestamp_ns,
                start_perf_ns: record.start_perf_ns,
                first_response_perf_ns: None,
                last_response_perf_ns: None,
                responses: Vec::new(),
                input_token_count: None,
                output_token_count: None,
                error: Some(error),
            });
        }

        let tokenizer = self.tokenizers.get_or_build(&record.model).await;
        let extractor = extractor_for(self.config.family);

        let mut responses = Vec::with_capacity(record.responses.len());
        for raw in &record.responses {
            if let Some(parsed) = extractor.extract(raw.perf_ns, &raw.payload, tokenizer.as_ref())? {
                responses.push(parsed);
            }
        }

        let first_response_perf_ns = responses.first().map(|r| r.perf_ns);
        let last_response_perf_ns = responses.last().map(|r| r.perf_ns);

        let output_text: String = responses
            .iter()
            .filter_map(|r| match &r.data {
                ParsedResponseData::Text { text, .. } => Some(text.as_str()),
                ParsedResponseData::Embedding { .. } => None,
            })
            .collect();
        let output_token_count = if output_text.is_empty() {
            None
        } else {
            Some(tokenizer.count_tokens(&output_text))
        };

        let turn = self
            .dataset
            .handle_conversation_turn_request(
                ConversationTurnRequest {
                    conversation_id: record.conversation_id.clone(),
                    turn_index: record.turn_index,
                },
                DATASET_REQUEST_TIMEOUT,
            )
            .await?;
        let input_token_count = Some(tokenizer.count_tokens(&turn.text));

        Ok(ParsedResponseRecord {
            x_request_id: record.x_request_id,
            x_correlation_id: record.x_correlation_id,
            worker_id: record.worker_id,
            model: record.model,
            conversation_id: record.conversation_id,
            turn_index: record.turn_index,
            credit_phase: record.credit_phase,
            timestamp_ns: record.timestamp_ns,
            start_perf_ns: record.start_perf_ns,
            first_response_perf_ns,
            last_response_perf_ns,
            responses,
            input_token_count,
            output_token_count,
            error: None,
        })
    }
}

#[async_trait]
impl Service for Parser {
    fn service_id(&self) -> &str {
        &self.service_id
    }

    fn service_type(&self) -> &'static str {
        "parser"
    }

    async fn on_command(&self, _command: &CommandMessage) -> AiperfResult<CommandOutcome> {
        Ok(CommandOutcome::Unhandled)
    }

    async fn background_task(&self, cancel: CancellationToken) -> AiperfResult<()> {
        let receiver = self.broker.queue_receiver(queues::RAW_INFERENCE_RESULTS);
        loop {
            let envelope = tokio::select! {
                _ = cancel.cancelled() => break,
                received = receiver.recv() => match received {
                    Ok(envelope) => envelope,
                    Err(_) => break,
                },
            };

            let record: RequestRecord = match envelope.decode() {
                Ok(record) => record,
                Err(err) => {
                    warn!(error = %err, "malformed inference_results envelope, skipping");
                    continue;
                }
            };

            let fallback = record.clone();
            match self.parse_one(record).await {
                Ok(parsed) => {
                    if let Err(err) = self.push_parsed(&parsed).await {
                        warn!(error = %err, "failed to push parsed inference result");
                    }
                }
                Err(err) => {
                    warn!(error = %err, "failed to parse inference result, forwarding as an error-tagged record");
                    let parsed = ParsedResponseRecord {
                        x_request_id: fallback.x_request_id,
                        x_correlation_id: fallback.x_correlation_id,
                        worker_id: fallback.worker_id,
                        model: fallback.model,
                        conversation_id: fallback.conversation_id,
                        turn_index: fallback.turn_index,
                        credit_phase: fallback.credit_phase,
                        timestamp_ns: fallback.timestamp_ns,
                        start_perf_ns: fallback.start_perf_ns,
                        first_response_perf_ns: None,
                        last_response_perf_ns: None,
                        responses: Vec::new(),
                        input_token_count: None,
                        output_token_count: None,
                        error: Some(err.into()),
                    };
                    if let Err(push_err) = self.push_parsed(&parsed).await {
                        warn!(error = %push_err, "failed to push error-tagged parsed result");
                    }
                }
            }
        }
        Ok(())
    }
}

impl Parser {
    async fn push_parsed(&self, parsed: &ParsedResponseRecord) -> AiperfResult<()> {
        let envelope = Envelope::new(queues::PARSED_INFERENCE_RESULTS, MessageType::ParsedInferenceResults, parsed)?;
        self.broker.push(queues::PARSED_INFERENCE_RESULTS, envelope).await?;
        Ok(())
    }
}
