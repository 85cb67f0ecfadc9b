//! Wire envelope: a subject string plus a JSON payload. Subjects are
//! ASCII, dot-separated, and prefix-matched by subscribers (spec §6).

use aiperf_core::MessageType;
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct Envelope {
    pub subject: String,
    pub message_type: MessageType,
    pub payload: Vec<u8>,
}

impl Envelope {
    pub fn new<T: Serialize>(subject: impl Into<String>, message_type: MessageType, body: &T) -> serde_json::Result<Self> {
        Ok(Self {
            subject: subject.into(),
            message_type,
            payload: serde_json::to_vec(body)?,
        })
    }

    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.payload)
    }
}

/// Well-known pub/sub subjects (spec §4.1). Subscribers typically register
/// one of these as a prefix; `command.<service_type>` / `command.<service_id>`
/// are built with [`command_subject`].
pub mod subjects {
    pub const COMMAND: &str = "command";
    pub const WORKER_HEALTH: &str = "worker_health";
    pub const PROFILE_RESULTS: &str = "profile_results";
    pub const CREDIT_PHASE: &str = "credit_phase";
    pub const CREDITS_COMPLETE: &str = "credits_complete";
    pub const DATASET_CONFIGURED: &str = "dataset_configured";
    pub const PROCESSING_STATS: &str = "processing_stats";
    pub const REGISTRATION: &str = "registration";
}

pub fn command_subject(target: &str) -> String {
    format!("{}.{}", subjects::COMMAND, target)
}

/// Well-known push/pull queue names.
pub mod queues {
    pub const CREDIT_DROP: &str = "credit_drop";
    pub const CREDIT_RETURN: &str = "credit_return";
    pub const RAW_INFERENCE_RESULTS: &str = "raw_inference_results";
    pub const PARSED_INFERENCE_RESULTS: &str = "parsed_inference_results";
    pub const DATASET_JOBS: &str = "dataset_jobs";
}

/// Well-known request/reply service names.
pub mod services {
    pub const DATASET_MANAGER: &str = "dataset_manager";
}
