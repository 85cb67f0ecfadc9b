//! The central broker: fan-out pub/sub, fair-queued push/pull, and routed
//! request/reply, all in-process. Late-arriving subscribers still receive
//! every message published after they register (spec §4.1) because the
//! broker itself is the single owner of each topic's subscriber list /
//! queue, created lazily and never torn down mid-run.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, warn};

use crate::envelope::Envelope;
use crate::error::BusError;

const BROADCAST_CAPACITY: usize = 4096;
const PUSH_RETRIES: u32 = 2;
const PUSH_RETRY_SPACING: Duration = Duration::from_millis(100);
/// Capacity of every push/pull queue (spec §4.1/§5): bounded so a fan-in
/// point that fills up applies back-pressure to its producers instead of
/// growing without limit.
const QUEUE_CAPACITY: usize = 100_000;

pub(crate) struct PendingRequest {
    pub reply: oneshot::Sender<Envelope>,
}

/// Shared broker state. Cheap to clone (all fields are `Arc`-backed);
/// every service in the process holds a clone and constructs clients
/// against it.
#[derive(Clone)]
pub struct Broker {
    inner: Arc<BrokerInner>,
}

struct BrokerInner {
    pubsub: broadcast::Sender<Envelope>,
    queues: DashMap<String, async_channel::Sender<Envelope>>,
    queue_recvs: DashMap<String, async_channel::Receiver<Envelope>>,
    pending_requests: DashMap<String, PendingRequest>,
    reply_queues: DashMap<String, async_channel::Sender<(Envelope, String)>>,
    reply_recvs: DashMap<String, async_channel::Receiver<(Envelope, String)>>,
    /// How long the controller should wait after startup before the first
    /// broadcast, so late subscribers have propagated (spec §4.1).
    pub subscription_window: Duration,
}

impl Default for Broker {
    fn default() -> Self {
        Self::new(Duration::from_millis(200))
    }
}

impl Broker {
    pub fn new(subscription_window: Duration) -> Self {
        let (tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            inner: Arc::new(BrokerInner {
                pubsub: tx,
                queues: DashMap::new(),
                queue_recvs: DashMap::new(),
                pending_requests: DashMap::new(),
                reply_queues: DashMap::new(),
                reply_recvs: DashMap::new(),
                subscription_window,
            }),
        }
    }

    pub fn subscription_window(&self) -> Duration {
        self.inner.subscription_window
    }

    /// Publish to every subscriber whose prefix matches `envelope.subject`.
    /// Per-publisher ordering to each subscriber is preserved because this
    /// call sends directly on the broadcast channel from the caller's task.
    pub fn publish(&self, envelope: Envelope) {
        // A send error just means there are currently no subscribers; that
        // is not a bus failure, messages are fire-and-forget for pub/sub.
        let _ = self.inner.pubsub.send(envelope);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.inner.pubsub.subscribe()
    }

    fn queue(&self, name: &str) -> async_channel::Sender<Envelope> {
        if let Some(tx) = self.inner.queues.get(name) {
            return tx.clone();
        }
        let (tx, rx) = async_channel::bounded(QUEUE_CAPACITY);
        self.inner.queues.insert(name.to_string(), tx.clone());
        self.inner.queue_recvs.insert(name.to_string(), rx);
        tx
    }

    pub fn queue_receiver(&self, name: &str) -> async_channel::Receiver<Envelope> {
        self.queue(name);
        self.inner.queue_recvs.get(name).unwrap().clone()
    }

    /// Push with bounded retry/backoff (spec §4.1: 2 retries, 100ms spacing).
    pub async fn push(&self, queue_name: &str, envelope: Envelope) -> Result<(), BusError> {
        let sender = self.queue(queue_name);
        let mut attempt = 0;
        loop {
            match sender.try_send(envelope.clone()) {
                Ok(()) => return Ok(()),
                Err(async_channel::TrySendError::Closed(_)) => {
                    return Err(BusError::Push {
                        retries: attempt,
                        message: format!("queue {queue_name:?} is closed"),
                    });
                }
                Err(async_channel::TrySendError::Full(_)) => {
                    if attempt >= PUSH_RETRIES {
                        return Err(BusError::Push {
                            retries: attempt,
                            message: format!("queue {queue_name:?} did not accept message"),
                        });
                    }
                    warn!(queue = queue_name, attempt, "push retry after backoff");
                    tokio::time::sleep(PUSH_RETRY_SPACING).await;
                    attempt += 1;
                }
            }
        }
    }

    fn reply_queue(&self, service: &str) -> async_channel::Sender<(Envelope, String)> {
        if let Some(tx) = self.inner.reply_queues.get(service) {
            return tx.clone();
        }
        let (tx, rx) = async_channel::unbounded();
        self.inner.reply_queues.insert(service.to_string(), tx.clone());
        self.inner.reply_recvs.insert(service.to_string(), rx);
        tx
    }

    pub fn reply_receiver(&self, service: &str) -> async_channel::Receiver<(Envelope, String)> {
        self.reply_queue(service);
        self.inner.reply_recvs.get(service).unwrap().clone()
    }

    /// Send a request, generating a fresh `request_id`, and await the
    /// correlated reply or time out.
    pub async fn request(
        &self,
        service: &str,
        envelope: Envelope,
        timeout: Duration,
    ) -> Result<Envelope, BusError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.inner
            .pending_requests
            .insert(request_id.clone(), PendingRequest { reply: tx });

        let queue = self.reply_queue(service);
        if queue.send((envelope, request_id.clone())).await.is_err() {
            self.inner.pending_requests.remove(&request_id);
            return Err(BusError::NoResponse(service.to_string()));
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(BusError::NoResponse(service.to_string())),
            Err(_) => {
                self.inner.pending_requests.remove(&request_id);
                Err(BusError::Timeout(timeout))
            }
        }
    }

    /// Called by a reply handler to deliver the correlated response back to
    /// the original requester, preserving the routing envelope.
    pub fn reply(&self, request_id: &str, envelope: Envelope) {
        if let Some((_, pending)) = self.inner.pending_requests.remove(request_id) {
            let _ = pending.reply.send(envelope);
        } else {
            debug!(request_id, "reply arrived for unknown or expired request");
        }
    }
}
