use aiperf_core::{AiperfError, CommunicationErrorKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BusError {
    #[error("push failed after {retries} retries: {message}")]
    Push { retries: u32, message: String },

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("no subscriber registered for queue {0:?}")]
    NoResponse(String),

    #[error("failed to subscribe to {0:?}: {1}")]
    Subscribe(String, String),
}

impl From<BusError> for AiperfError {
    fn from(err: BusError) -> Self {
        let kind = match &err {
            BusError::Push { .. } => CommunicationErrorKind::PushError,
            BusError::Timeout(_) => CommunicationErrorKind::Timeout,
            BusError::NoResponse(_) => CommunicationErrorKind::NoResponse,
            BusError::Subscribe(..) => CommunicationErrorKind::SubscribeError,
        };
        AiperfError::Communication {
            kind,
            message: err.to_string(),
        }
    }
}
