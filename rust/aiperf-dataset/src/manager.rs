//! The dataset manager: aggregates generated conversations keyed by
//! `session_id`, gates request handlers on a `dataset_configured` event, and
//! serves the three request types from spec §4.3.

use std::sync::Arc;
use std::time::Duration;

use aiperf_bus::{envelope::subjects, Broker, Envelope};
use aiperf_core::{AiperfError, AiperfResult, Conversation, MessageType, Turn};
use aiperf_service::Service;
use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

/// Published on `subjects::DATASET_CONFIGURED` the moment the manager
/// reaches its expected conversation count (spec §4.3).
#[derive(Debug, Clone, Serialize)]
struct DatasetConfiguredPayload {
    conversation_count: usize,
}

/// `ConversationRequest` -> `ConversationResponse`.
pub struct ConversationRequest {
    pub conversation_id: Option<String>,
}

/// `ConversationTurnRequest` -> `ConversationTurnResponse`.
pub struct ConversationTurnRequest {
    pub conversation_id: String,
    pub turn_index: usize,
}

/// `DatasetTimingRequest` -> `DatasetTimingResponse`.
pub struct DatasetTimingResponse {
    pub timing_data: Vec<(i64, String)>,
}

struct Inner {
    broker: Broker,
    conversations: DashMap<String, Conversation>,
    expected_total: Mutex<Option<usize>>,
    configured: Notify,
    configured_flag: std::sync::atomic::AtomicBool,
    selection_rng: Mutex<StdRng>,
}

/// Owns the aggregated dataset and answers the dataset-request handlers.
/// Cheaply cloneable; internal state is shared via `Arc`. Implements
/// [`Service`] so it shares the same Created/Initialized/Running lifecycle
/// as every other AIPerf component (component C3, spec §4.3), even though
/// its request handlers are called directly rather than dispatched over
/// the bus.
#[derive(Clone)]
pub struct DatasetManager {
    inner: Arc<Inner>,
}

impl DatasetManager {
    pub fn new(random_seed: u64, broker: Broker) -> Self {
        Self {
            inner: Arc::new(Inner {
                broker,
                conversations: DashMap::new(),
                expected_total: Mutex::new(None),
                configured: Notify::new(),
                configured_flag: std::sync::atomic::AtomicBool::new(false),
                selection_rng: Mutex::new(StdRng::seed_from_u64(random_seed)),
            }),
        }
    }

    /// Declares how many conversations the current profile run expects, so
    /// the manager knows when aggregation is complete. Called once, from the
    /// `PROFILE_CONFIGURE` handler, before any `ingest` calls.
    pub async fn set_expected_total(&self, total: usize) {
        *self.inner.expected_total.lock().await = Some(total);
        if total == 0 {
            self.mark_configured();
        }
    }

    /// Folds conversations returned by a dataset processor
    /// (`ProcessDatasetResponseMessage.generated_data`) into the aggregate.
    /// Fires `dataset_configured` once the accumulated size reaches the
    /// expected total.
    pub async fn ingest_generated(&self, conversations: Vec<Conversation>) {
        for conversation in conversations {
            self.inner
                .conversations
                .insert(conversation.session_id.clone(), conversation);
        }
        let expected = *self.inner.expected_total.lock().await;
        if let Some(expected) = expected {
            if self.inner.conversations.len() >= expected {
                self.mark_configured();
            }
        }
    }

    fn mark_configured(&self) {
        if !self.inner.configured_flag.swap(true, std::sync::atomic::Ordering::SeqCst) {
            let count = self.inner.conversations.len();
            info!(count, "dataset configured");
            self.inner.configured.notify_waiters();
            self.publish_dataset_configured(count);
        }
    }

    fn publish_dataset_configured(&self, conversation_count: usize) {
        match Envelope::new(
            subjects::DATASET_CONFIGURED,
            MessageType::DatasetConfigured,
            &DatasetConfiguredPayload { conversation_count },
        ) {
            Ok(envelope) => self.inner.broker.publish(envelope),
            Err(err) => warn!(error = %err, "failed to encode dataset_configured envelope"),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.configured_flag.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Blocks until `dataset_configured` fires or `deadline` elapses. Every
    /// request handler calls this first, so requests arriving before
    /// configuration queue naturally behind the reply socket.
    pub async fn wait_configured(&self, deadline: Duration) -> AiperfResult<()> {
        // Register interest before checking the flag so a `mark_configured`
        // racing with this call can't be missed between the two.
        let notified = self.inner.configured.notified();
        if self.is_configured() {
            return Ok(());
        }
        tokio::pin!(notified);
        tokio::select! {
            _ = &mut notified => Ok(()),
            _ = tokio::time::sleep(deadline) => {
                if self.is_configured() {
                    Ok(())
                } else {
                    Err(AiperfError::Dataset("dataset_configured deadline exceeded".into()))
                }
            }
        }
    }

    pub async fn handle_conversation_request(
        &self,
        request: ConversationRequest,
        deadline: Duration,
    ) -> AiperfResult<Conversation> {
        self.wait_configured(deadline).await?;
        match request.conversation_id {
            Some(id) => self
                .inner
                .conversations
                .get(&id)
                .map(|entry| entry.value().clone())
                .ok_or_else(|| AiperfError::Dataset(format!("unknown conversation_id {id}"))),
            None => self.pick_random().await,
        }
    }

    async fn pick_random(&self) -> AiperfResult<Conversation> {
        if self.inner.conversations.is_empty() {
            return Err(AiperfError::Dataset("dataset is empty".into()));
        }
        let index = {
            let mut rng = self.inner.selection_rng.lock().await;
            rng.gen_range(0..self.inner.conversations.len())
        };
        self.inner
            .conversations
            .iter()
            .nth(index)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AiperfError::Dataset("conversation selection index out of range".into()))
    }

    pub async fn handle_conversation_turn_request(
        &self,
        request: ConversationTurnRequest,
        deadline: Duration,
    ) -> AiperfResult<Turn> {
        self.wait_configured(deadline).await?;
        let conversation = self
            .inner
            .conversations
            .get(&request.conversation_id)
            .ok_or_else(|| {
                AiperfError::Dataset(format!("unknown conversation_id {}", request.conversation_id))
            })?;
        conversation
            .turn(request.turn_index)
            .cloned()
            .ok_or_else(|| {
                AiperfError::Dataset(format!(
                    "turn_index {} out of range for conversation {}",
                    request.turn_index, request.conversation_id
                ))
            })
    }

    pub async fn handle_dataset_timing_request(
        &self,
        deadline: Duration,
    ) -> AiperfResult<DatasetTimingResponse> {
        self.wait_configured(deadline).await?;
        let mut timing_data: Vec<(i64, String)> = self
            .inner
            .conversations
            .iter()
            .filter_map(|entry| {
                entry
                    .value()
                    .turn(0)
                    .and_then(|turn| turn.timestamp_ns)
                    .map(|ts| (ts, entry.key().clone()))
            })
            .collect();
        timing_data.sort_by_key(|(ts, _)| *ts);
        debug!(entries = timing_data.len(), "dataset timing response built");
        Ok(DatasetTimingResponse { timing_data })
    }
}

impl Service for DatasetManager {
    fn service_id(&self) -> &str {
        "dataset_manager-0"
    }

    fn service_type(&self) -> &'static str {
        "dataset_manager"
    }
}
