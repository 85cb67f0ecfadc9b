//! The closed error taxonomy (spec §7), implemented as a single
//! `thiserror`-derived enum in the teacher's `SwarmError` shape.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type AiperfResult<T> = Result<T, AiperfError>;

/// The kind of communication failure, mirrored onto the wire as
/// `ErrorDetails.type = "CommunicationError"` with this as the `code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommunicationErrorKind {
    PushError,
    Timeout,
    NoResponse,
    SubscribeError,
}

#[derive(Error, Debug)]
pub enum AiperfError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("service registration error: {0}")]
    Registration(String),

    #[error("service timed out: {0}")]
    ServiceTimeout(String),

    #[error("communication error ({kind:?}): {message}")]
    Communication {
        kind: CommunicationErrorKind,
        message: String,
    },

    #[error("inference error: {0}")]
    Inference(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid service state: {0}")]
    InvalidState(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AiperfError {
    /// Whether a caller may retry the operation that produced this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AiperfError::Communication {
                kind: CommunicationErrorKind::Timeout | CommunicationErrorKind::PushError,
                ..
            } | AiperfError::Inference(_)
                | AiperfError::Parse(_)
                | AiperfError::Tokenizer(_)
        )
    }

    /// Whether this error, surfacing from a `background_task` hook with
    /// `stop_on_error = true`, should transition the owning service to Failed.
    pub fn is_fatal_to_service(&self) -> bool {
        matches!(
            self,
            AiperfError::Configuration(_)
                | AiperfError::Registration(_)
                | AiperfError::ServiceTimeout(_)
                | AiperfError::InvalidState(_)
        )
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            AiperfError::Configuration(_) => "ConfigurationError",
            AiperfError::Registration(_) => "RegistrationError",
            AiperfError::ServiceTimeout(_) => "ServiceTimeout",
            AiperfError::Communication { .. } => "CommunicationError",
            AiperfError::Inference(_) => "InferenceError",
            AiperfError::Parse(_) => "ParseError",
            AiperfError::Tokenizer(_) => "TokenizerError",
            AiperfError::Dataset(_) => "DatasetError",
            AiperfError::Cancelled => "CancelledError",
            AiperfError::InvalidState(_) => "InvalidStateError",
            AiperfError::Io(_) | AiperfError::Json(_) => "InternalError",
        }
    }
}

/// The wire representation of an error, attached to records and command
/// replies. Constructed from an [`AiperfError`] via `From`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    #[serde(rename = "type")]
    pub error_type: String,
    pub code: Option<String>,
    pub message: String,
}

impl From<&AiperfError> for ErrorDetails {
    fn from(err: &AiperfError) -> Self {
        let code = if let AiperfError::Communication { kind, .. } = err {
            Some(format!("{kind:?}"))
        } else {
            None
        };
        ErrorDetails {
            error_type: err.error_type().to_string(),
            code,
            message: err.to_string(),
        }
    }
}

impl From<AiperfError> for ErrorDetails {
    fn from(err: AiperfError) -> Self {
        ErrorDetails::from(&err)
    }
}
