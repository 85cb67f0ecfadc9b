//! The service lifecycle state machine (spec §4.2).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Created,
    Initializing,
    Initialized,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl ServiceState {
    /// Whether `to` is a legal transition from `self`.
    pub fn can_transition_to(self, to: ServiceState) -> bool {
        use ServiceState::*;
        matches!(
            (self, to),
            (Created, Initializing)
                | (Initializing, Initialized)
                | (Initializing, Failed)
                | (Initialized, Starting)
                | (Starting, Running)
                | (Starting, Failed)
                | (Running, Stopping)
                | (Running, Failed)
                | (Stopping, Stopped)
                | (Stopping, Failed)
                // A second stop() while already stopping force-kills; that
                // is modeled as Stopping -> Stopping (idempotent) at the
                // state-machine level, with escalation handled by the runtime.
                | (Stopping, Stopping)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ServiceState::*;

    #[test]
    fn lifecycle_happy_path_is_legal() {
        assert!(Created.can_transition_to(Initializing));
        assert!(Initializing.can_transition_to(Initialized));
        assert!(Initialized.can_transition_to(Starting));
        assert!(Starting.can_transition_to(Running));
        assert!(Running.can_transition_to(Stopping));
        assert!(Stopping.can_transition_to(Stopped));
    }

    #[test]
    fn starting_before_init_is_illegal() {
        assert!(!Created.can_transition_to(Starting));
        assert!(!Created.can_transition_to(Running));
    }
}
