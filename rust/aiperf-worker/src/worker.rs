//! The worker pool service: pulls credits off the bus, turns them into
//! HTTP/SSE requests against the inference endpoint, and always returns
//! the credit exactly once (spec §4.5), regardless of outcome.

use std::sync::Arc;
use std::time::Duration;

use aiperf_bus::{envelope::queues, Broker, Envelope};
use aiperf_core::{
    perf_ns, wall_ns, AiperfError, AiperfResult, Conversation, CreditDrop, CreditReturn, MessageType,
    PerfNs, RawResponse, RequestRecord,
};
use aiperf_dataset::{ConversationRequest, DatasetManager};
use aiperf_service::{CommandMessage, CommandOutcome, Service};
use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::converter::{ModelEndpointInfo, RequestConverter};
use crate::health::{HealthReporter, WorkerTaskStats};
use crate::http_client::{build_client, HttpClientConfig};
use crate::sse::{SseDecoder, SseEvent};

const DATASET_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub endpoint: ModelEndpointInfo,
    pub max_concurrent_requests: usize,
    pub health_check_interval: Duration,
    pub http: HttpClientConfig,
}

/// One worker process's share of the pool. Several of these, each with a
/// distinct `service_id`, typically run concurrently against the same
/// dataset manager and bus.
pub struct Worker {
    service_id: String,
    config: WorkerConfig,
    broker: Broker,
    dataset: DatasetManager,
    converter: Arc<dyn RequestConverter>,
    http: std::sync::OnceLock<reqwest::Client>,
    stats: Arc<WorkerTaskStats>,
    permits: Arc<Semaphore>,
}

impl Worker {
    pub fn new(
        service_id: impl Into<String>,
        broker: Broker,
        dataset: DatasetManager,
        config: WorkerConfig,
        converter: Arc<dyn RequestConverter>,
    ) -> Self {
        let permits = config.max_concurrent_requests.max(1);
        Self {
            service_id: service_id.into(),
            config,
            broker,
            dataset,
            converter,
            http: std::sync::OnceLock::new(),
            stats: Arc::new(WorkerTaskStats::default()),
            permits: Arc::new(Semaphore::new(permits)),
        }
    }
}

#[async_trait]
impl Service for Worker {
    fn service_id(&self) -> &str {
        &self.service_id
    }

    fn service_type(&self) -> &'static str {
        "worker"
    }

    async fn on_start(&self) -> AiperfResult<()> {
        let client = build_client(&self.config.http)?;
        let _ = self.http.set(client);
        Ok(())
    }

    async fn on_command(&self, _command: &CommandMessage) -> AiperfResult<CommandOutcome> {
        Ok(CommandOutcome::Unhandled)
    }

    async fn background_task(&self, cancel: CancellationToken) -> AiperfResult<()> {
        let http = self
            .http
            .get()
            .cloned()
            .ok_or_else(|| AiperfError::Configuration("worker started without an HTTP client".into()))?;

        let health = Arc::new(HealthReporter::new(
            self.service_id.clone(),
            self.broker.clone(),
            Arc::clone(&self.stats),
        ));
        let health_handle = health.spawn(self.config.health_check_interval, cancel.clone());

        let receiver = self.broker.queue_receiver(queues::CREDIT_DROP);
        loop {
            let envelope = tokio::select! {
                _ = cancel.cancelled() => break,
                received = receiver.recv() => match received {
                    Ok(envelope) => envelope,
                    Err(_) => break,
                },
            };

            let credit_drop: CreditDrop = match envelope.decode() {
                Ok(credit_drop) => credit_drop,
                Err(err) => {
                    warn!(error = %err, "malformed credit_drop envelope, skipping");
                    continue;
                }
            };

            let permit = match Arc::clone(&self.permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            self.stats.mark_started(credit_drop.credit_phase).await;

            let worker_id = self.service_id.clone();
            let broker = self.broker.clone();
            let dataset = self.dataset.clone();
            let http = http.clone();
            let endpoint = self.config.endpoint.clone();
            let converter = Arc::clone(&self.converter);
            let stats = Arc::clone(&self.stats);
            let phase = credit_drop.credit_phase;

            tokio::spawn(async move {
                let _permit = permit;
                let failed = execute_one(&worker_id, &broker, &dataset, &http, &endpoint, converter.as_ref(), credit_drop).await;
                stats.mark_finished(phase, failed).await;
            });
        }

        health_handle.abort();
        Ok(())
    }
}

/// Executes one credit end to end and publishes its `CreditReturn`.
/// Returns whether the attempt failed.
#[instrument(skip(broker, dataset, http, endpoint, converter, credit_drop), fields(worker_id, conversation_id = ?credit_drop.conversation_id))]
async fn execute_one(
    worker_id: &str,
    broker: &Broker,
    dataset: &DatasetManager,
    http: &reqwest::Client,
    endpoint: &ModelEndpointInfo,
    converter: &dyn RequestConverter,
    credit_drop: CreditDrop,
) -> bool {
    let receive_ns = perf_ns();
    let delayed_ns = credit_drop
        .credit_drop_ns
        .map(|scheduled| receive_ns.0 - scheduled)
        .unwrap_or(0);

    let result = run_request(worker_id, broker, dataset, http, endpoint, converter, &credit_drop, receive_ns, delayed_ns).await;
    let failed = result.is_err();
    if let Err(err) = &result {
        warn!(worker_id, error = %err, "request attempt failed");
    }

    let credit_return = CreditReturn {
        credit_phase: credit_drop.credit_phase,
        conversation_id: credit_drop.conversation_id,
        credit_drop_ns: credit_drop.credit_drop_ns,
        delayed_ns,
        pre_inference_ns: result.ok(),
        failed,
    };
    match Envelope::new(queues::CREDIT_RETURN, MessageType::CreditReturn, &credit_return) {
        Ok(envelope) => {
            if let Err(err) = broker.push(queues::CREDIT_RETURN, envelope).await {
                warn!(worker_id, error = %err, "failed to push credit_return");
            }
        }
        Err(err) => warn!(worker_id, error = %err, "failed to encode credit_return"),
    }
    failed
}

/// Fetches a conversation turn, converts it into a request, executes it
/// over HTTP/SSE, and pushes the resulting [`RequestRecord`]. Returns the
/// `pre_inference_ns` (time from credit receipt to request start) on
/// success, for the caller to attach to the credit return.
async fn run_request(
    worker_id: &str,
    broker: &Broker,
    dataset: &DatasetManager,
    http: &reqwest::Client,
    endpoint: &ModelEndpointInfo,
    converter: &dyn RequestConverter,
    credit_drop: &CreditDrop,
    receive_ns: PerfNs,
    delayed_ns: i64,
) -> AiperfResult<i64> {
    let conversation: Conversation = dataset
        .handle_conversation_request(
            ConversationRequest {
                conversation_id: credit_drop.conversation_id.clone(),
            },
            DATASET_REQUEST_TIMEOUT,
        )
        .await?;
    let turn = conversation
        .turn(0)
        .ok_or_else(|| AiperfError::Dataset(format!("conversation {} has no turns", conversation.session_id)))?;

    let payload = converter.convert(endpoint, turn)?;
    let request_payload = serde_json::to_vec(&payload)?;
    let timestamp_ns = wall_ns();
    let pre_inference_ns = perf_ns().saturating_sub(receive_ns);

    let start_perf_ns = perf_ns();
    let response = http
        .post(endpoint.request_url())
        .json(&payload)
        .send()
        .await
        .map_err(|err| AiperfError::Inference(format!("request to {} failed: {err}", endpoint.request_url())))?;

    if !response.status().is_success() {
        return Err(AiperfError::Inference(format!(
            "endpoint returned status {}",
            response.status()
        )));
    }

    let responses = if endpoint.streaming {
        collect_streamed(response).await?
    } else {
        let body = response
            .bytes()
            .await
            .map_err(|err| AiperfError::Inference(format!("body read failed: {err}")))?;
        vec![RawResponse {
            perf_ns: perf_ns(),
            payload: body.to_vec(),
        }]
    };

    let end_perf_ns = perf_ns();
    let record = RequestRecord {
        x_request_id: Uuid::new_v4().to_string(),
        x_correlation_id: Uuid::new_v4().to_string(),
        worker_id: worker_id.to_string(),
        model: endpoint.model.clone(),
        conversation_id: conversation.session_id.clone(),
        turn_index: 0,
        credit_phase: credit_drop.credit_phase,
        timestamp_ns,
        start_perf_ns,
        end_perf_ns,
        request_payload,
        responses,
        error: None,
        delayed_ns,
        pre_inference_ns: Some(pre_inference_ns),
    };

    let envelope = Envelope::new(queues::RAW_INFERENCE_RESULTS, MessageType::InferenceResults, &record)?;
    broker.push(queues::RAW_INFERENCE_RESULTS, envelope).await?;
    Ok(pre_inference_ns)
}

async fn collect_streamed(response: reqwest::Response) -> AiperfResult<Vec<RawResponse>> {
    let mut decoder = SseDecoder::new();
    let mut stream = response.bytes_stream();
    let mut responses = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|err| AiperfError::Inference(format!("stream read failed: {err}")))?;
        for event in decoder.push(&chunk) {
            match event {
                SseEvent::Done => return Ok(responses),
                SseEvent::Data(payload) => responses.push(RawResponse {
                    perf_ns: perf_ns(),
                    payload,
                }),
            }
        }
    }
    Ok(responses)
}
