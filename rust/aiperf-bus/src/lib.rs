//! The AIPerf message bus (component C1): pub/sub with prefix-matched
//! subscriptions, push/pull fair-queueing, and routed request/reply, all
//! fronted by a single in-process broker. See spec §4.1.

pub mod broker;
pub mod clients;
pub mod envelope;
pub mod error;

pub use broker::Broker;
pub use clients::{
    PubClient, PubHandle, PullClient, PullHandle, PushClient, PushHandle, ReplyHandle,
    RequestClient, RequestHandle, SubHandle, DEFAULT_REQUEST_TIMEOUT,
};
pub use envelope::{command_subject, queues, services, subjects, Envelope};
pub use error::BusError;

#[cfg(test)]
mod tests {
    use super::*;
    use aiperf_core::MessageType;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Ping {
        n: u32,
    }

    #[tokio::test]
    async fn push_pull_round_robin_delivers_each_message_once() {
        let broker = Broker::default();
        let pusher = PushHandle::new(broker.clone(), "q");
        let puller_a = PullHandle::new(&broker, "q");
        let puller_b = PullHandle::new(&broker, "q");

        for i in 0..4u32 {
            let env = Envelope::new("q", MessageType::CreditDrop, &Ping { n: i }).unwrap();
            pusher.push(env).await.unwrap();
        }

        let mut seen = vec![];
        for _ in 0..4 {
            let env = tokio::select! {
                e = puller_a.pull() => e,
                e = puller_b.pull() => e,
            };
            let ping: Ping = env.unwrap().decode().unwrap();
            seen.push(ping.n);
        }
        seen.sort();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn pub_sub_filters_by_prefix() {
        let broker = Broker::default();
        let publisher = PubHandle::new(broker.clone());
        let mut sub = SubHandle::new(&broker, vec!["command.worker".to_string()]);

        publisher.publish(Envelope::new("command.timing", MessageType::Command, &Ping { n: 1 }).unwrap());
        publisher.publish(Envelope::new("command.worker", MessageType::Command, &Ping { n: 2 }).unwrap());

        let received = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .unwrap()
            .unwrap();
        let ping: Ping = received.decode().unwrap();
        assert_eq!(ping.n, 2);
    }

    #[tokio::test]
    async fn request_reply_round_trips_and_preserves_routing() {
        let broker = Broker::default();
        let requester = RequestHandle::new(broker.clone(), "dataset_manager");
        let replier = ReplyHandle::new(broker.clone(), "dataset_manager");

        let server = tokio::spawn(async move {
            let (request, request_id) = replier.recv().await.unwrap();
            let ping: Ping = request.decode().unwrap();
            let reply = Envelope::new("reply", MessageType::ConversationResponse, &Ping { n: ping.n + 1 })
                .unwrap();
            replier.reply(&request_id, reply);
        });

        let req = Envelope::new("req", MessageType::ConversationRequest, &Ping { n: 41 }).unwrap();
        let reply = requester
            .request(req, Duration::from_secs(1))
            .await
            .unwrap();
        let ping: Ping = reply.decode().unwrap();
        assert_eq!(ping.n, 42);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn request_without_a_reply_times_out() {
        let broker = Broker::default();
        let requester = RequestHandle::new(broker.clone(), "nobody_home");
        let req = Envelope::new("req", MessageType::ConversationRequest, &Ping { n: 1 }).unwrap();
        let result = requester.request(req, Duration::from_millis(50)).await;
        assert!(matches!(result, Err(BusError::Timeout(_))));
    }
}
