//! Typed client handles over the [`Broker`]. These mirror the
//! `CommunicationClientProtocol` family (`PushClientProtocol`,
//! `PullClientProtocol`, `PubClientProtocol`, `SubClientProtocol`,
//! `RequestClientProtocol`, `ReplyClientProtocol`) from the original
//! source's `aiperf/common/comms/base.py`, as async traits over an
//! [`Envelope`] rather than a ZeroMQ socket.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use tracing::instrument;

use crate::broker::Broker;
use crate::envelope::Envelope;
use crate::error::BusError;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait PushClient: Send + Sync {
    async fn push(&self, envelope: Envelope) -> Result<(), BusError>;
}

#[async_trait]
pub trait PullClient: Send + Sync {
    async fn pull(&self) -> Option<Envelope>;
}

#[async_trait]
pub trait PubClient: Send + Sync {
    fn publish(&self, envelope: Envelope);
}

pub type MessageHandler = Box<dyn Fn(Envelope) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

#[async_trait]
pub trait RequestClient: Send + Sync {
    async fn request(&self, envelope: Envelope, timeout: Duration) -> Result<Envelope, BusError>;
}

/// Push handle bound to one named fair-queue.
pub struct PushHandle {
    broker: Broker,
    queue_name: String,
}

impl PushHandle {
    pub fn new(broker: Broker, queue_name: impl Into<String>) -> Self {
        Self {
            broker,
            queue_name: queue_name.into(),
        }
    }
}

#[async_trait]
impl PushClient for PushHandle {
    #[instrument(skip(self, envelope), fields(queue = %self.queue_name))]
    async fn push(&self, envelope: Envelope) -> Result<(), BusError> {
        self.broker.push(&self.queue_name, envelope).await
    }
}

/// Pull handle bound to one named fair-queue. Many `PullHandle`s created
/// against the same queue name naturally round-robin: `async_channel` hands
/// each message to exactly one waiting receiver.
pub struct PullHandle {
    receiver: async_channel::Receiver<Envelope>,
}

impl PullHandle {
    pub fn new(broker: &Broker, queue_name: &str) -> Self {
        Self {
            receiver: broker.queue_receiver(queue_name),
        }
    }
}

#[async_trait]
impl PullClient for PullHandle {
    async fn pull(&self) -> Option<Envelope> {
        self.receiver.recv().await.ok()
    }
}

/// Publish handle over the shared broadcast pub/sub bus.
pub struct PubHandle {
    broker: Broker,
}

impl PubHandle {
    pub fn new(broker: Broker) -> Self {
        Self { broker }
    }
}

impl PubClient for PubHandle {
    fn publish(&self, envelope: Envelope) {
        self.broker.publish(envelope);
    }
}

/// Subscribe handle filtering the shared broadcast bus by subject prefix.
pub struct SubHandle {
    receiver: tokio::sync::broadcast::Receiver<Envelope>,
    prefixes: Vec<String>,
}

impl SubHandle {
    pub fn new(broker: &Broker, prefixes: Vec<String>) -> Self {
        Self {
            receiver: broker.subscribe(),
            prefixes,
        }
    }

    fn matches(&self, subject: &str) -> bool {
        self.prefixes.iter().any(|p| subject.starts_with(p.as_str()))
    }

    /// Wait for the next message whose subject matches a registered prefix,
    /// skipping (and logging) any messages dropped because this subscriber
    /// lagged behind the broadcast buffer.
    pub async fn recv(&mut self) -> Option<Envelope> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) if self.matches(&envelope.subject) => return Some(envelope),
                Ok(_) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Request handle bound to one named service.
pub struct RequestHandle {
    broker: Broker,
    service: String,
}

impl RequestHandle {
    pub fn new(broker: Broker, service: impl Into<String>) -> Self {
        Self {
            broker,
            service: service.into(),
        }
    }
}

#[async_trait]
impl RequestClient for RequestHandle {
    async fn request(&self, envelope: Envelope, timeout: Duration) -> Result<Envelope, BusError> {
        self.broker.request(&self.service, envelope, timeout).await
    }
}

/// Reply handle: pulls `(request, request_id)` pairs off a service's
/// request queue; the caller replies via [`Broker::reply`], preserving the
/// router envelope back to the original requester.
pub struct ReplyHandle {
    broker: Broker,
    receiver: async_channel::Receiver<(Envelope, String)>,
}

impl ReplyHandle {
    pub fn new(broker: Broker, service: &str) -> Self {
        let receiver = broker.reply_receiver(service);
        Self { broker, receiver }
    }

    pub async fn recv(&self) -> Option<(Envelope, String)> {
        self.receiver.recv().await.ok()
    }

    pub fn reply(&self, request_id: &str, envelope: Envelope) {
        self.broker.reply(request_id, envelope);
    }
}
