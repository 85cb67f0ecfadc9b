//! Dataset manager: aggregates synthetic and custom conversations and serves
//! the conversation/turn/timing request handlers.

mod custom;
mod manager;
mod synthetic;

pub use custom::{CustomDatasetType, DatasetSource};
pub use manager::{
    ConversationRequest, ConversationTurnRequest, DatasetManager, DatasetTimingResponse,
};
pub use synthetic::{SyntheticConfig, SyntheticGenerator};

#[cfg(test)]
mod tests {
    use super::*;
    use aiperf_bus::Broker;
    use std::time::Duration;

    #[tokio::test]
    async fn configure_then_serve_conversation_request() {
        let manager = DatasetManager::new(7, Broker::default());
        manager.set_expected_total(2).await;
        let generated = SyntheticGenerator::new(SyntheticConfig {
            num_conversations: 2,
            turns_per_conversation: 1,
            mean_input_tokens: 16,
            random_seed: 7,
        })
        .generate();
        manager.ingest_generated(generated).await;
        assert!(manager.is_configured());

        let response = manager
            .handle_conversation_request(
                ConversationRequest {
                    conversation_id: Some("synthetic-0".into()),
                },
                Duration::from_millis(50),
            )
            .await
            .unwrap();
        assert_eq!(response.session_id, "synthetic-0");
    }

    #[tokio::test]
    async fn request_before_configuration_times_out() {
        let manager = DatasetManager::new(1, Broker::default());
        manager.set_expected_total(5).await;
        let result = manager
            .handle_conversation_request(
                ConversationRequest { conversation_id: None },
                Duration::from_millis(20),
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn turn_index_out_of_range_errors() {
        let manager = DatasetManager::new(3, Broker::default());
        manager.set_expected_total(1).await;
        manager
            .ingest_generated(
                SyntheticGenerator::new(SyntheticConfig {
                    num_conversations: 1,
                    turns_per_conversation: 1,
                    ..SyntheticConfig::default()
                })
                .generate(),
            )
            .await;

        let result = manager
            .handle_conversation_turn_request(
                ConversationTurnRequest {
                    conversation_id: "synthetic-0".into(),
                    turn_index: 5,
                },
                Duration::from_millis(50),
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn zero_expected_total_configures_immediately() {
        let manager = DatasetManager::new(1, Broker::default());
        manager.set_expected_total(0).await;
        assert!(manager.is_configured());
    }
}
