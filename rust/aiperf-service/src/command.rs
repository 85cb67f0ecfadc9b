//! Commands: the controller's broadcast control-plane protocol (spec §4.2).

use aiperf_core::ErrorDetails;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandKind {
    ProfileConfigure,
    ProfileStart,
    ProfileCancel,
    ProcessRecords,
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandTarget {
    pub service_type: Option<String>,
    pub service_id: Option<String>,
}

impl CommandTarget {
    pub fn broadcast() -> Self {
        Self {
            service_type: None,
            service_id: None,
        }
    }

    /// Whether this target matches a service with the given type/id.
    pub fn matches(&self, service_type: &str, service_id: &str) -> bool {
        let type_ok = self
            .service_type
            .as_deref()
            .map(|t| t == service_type)
            .unwrap_or(true);
        let id_ok = self
            .service_id
            .as_deref()
            .map(|i| i == service_id)
            .unwrap_or(true);
        type_ok && id_ok
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandMessage {
    pub command: CommandKind,
    pub command_id: String,
    pub target: CommandTarget,
    pub data: Option<Value>,
    pub require_response: bool,
}

impl CommandMessage {
    pub fn broadcast(command: CommandKind, data: Option<Value>) -> Self {
        Self {
            command,
            command_id: uuid::Uuid::new_v4().to_string(),
            target: CommandTarget::broadcast(),
            data,
            require_response: true,
        }
    }
}

/// The outcome a service reports for a command it matched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommandOutcome {
    Acknowledged,
    Success { data: Option<Value> },
    Error { error: ErrorDetails },
    Unhandled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandReply {
    pub command_id: String,
    pub service_id: String,
    pub outcome: CommandOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_target_matches_any_service() {
        let target = CommandTarget::broadcast();
        assert!(target.matches("worker", "worker-1"));
        assert!(target.matches("timing_manager", "timing-0"));
    }

    #[test]
    fn service_type_target_matches_only_that_type() {
        let target = CommandTarget {
            service_type: Some("worker".into()),
            service_id: None,
        };
        assert!(target.matches("worker", "worker-1"));
        assert!(!target.matches("timing_manager", "timing-0"));
    }
}
