//! The `message_type` discriminator shared by every message on the bus
//! (spec §6). Concrete message structs live in the crate that owns them
//! (`aiperf-service` for lifecycle/command messages, `aiperf-timing` for
//! credit messages, etc.) but all tag themselves with a variant from this
//! single enum so every message on the wire can be told apart by a reader
//! that only understands this crate.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Registration,
    Command,
    CommandAcknowledged,
    CommandSuccess,
    CommandError,
    CommandUnhandled,
    DatasetConfigured,
    ConversationRequest,
    ConversationResponse,
    ConversationTurnRequest,
    ConversationTurnResponse,
    DatasetTimingRequest,
    DatasetTimingResponse,
    CreditDrop,
    CreditReturn,
    CreditPhaseStart,
    CreditPhaseProgress,
    CreditPhaseSendingComplete,
    CreditPhaseComplete,
    CreditsComplete,
    InferenceResults,
    ParsedInferenceResults,
    MetricRecords,
    ProcessingStats,
    ProfileResults,
    WorkerHealth,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "unknown".to_string());
        write!(f, "{s}")
    }
}

/// Fields common to every message: who sent it, when, and (for
/// request/reply) the correlation id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageMeta {
    pub service_id: String,
    pub request_id: Option<String>,
    pub timestamp_ns: i64,
}

impl MessageMeta {
    pub fn new(service_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            request_id: None,
            timestamp_ns: crate::clock::wall_ns().0,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_round_trips_through_json() {
        for mt in [
            MessageType::CreditDrop,
            MessageType::CreditsComplete,
            MessageType::ProfileResults,
            MessageType::WorkerHealth,
        ] {
            let json = serde_json::to_string(&mt).unwrap();
            let back: MessageType = serde_json::from_str(&json).unwrap();
            assert_eq!(mt, back);
        }
    }

    #[test]
    fn message_type_is_snake_case_on_the_wire() {
        let json = serde_json::to_string(&MessageType::CreditPhaseSendingComplete).unwrap();
        assert_eq!(json, "\"credit_phase_sending_complete\"");
    }
}
