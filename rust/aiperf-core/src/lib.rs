//! Shared data model for AIPerf: identifiers and timestamps, credits and
//! phases, conversations, request/response records, metrics, and the
//! closed error taxonomy. Every other crate in the workspace depends on
//! this one; it depends on nothing in the workspace.

pub mod clock;
pub mod conversation;
pub mod credit;
pub mod error;
pub mod message_type;
pub mod metric;
pub mod phase;
pub mod record;
pub mod tokenizer;

pub use clock::{perf_ns, wall_ns, PerfNs, WallNs};
pub use conversation::{Conversation, Turn, TurnRole};
pub use credit::{CreditDrop, CreditReturn};
pub use error::{AiperfError, AiperfResult, CommunicationErrorKind, ErrorDetails};
pub use message_type::{MessageMeta, MessageType};
pub use metric::{MetricRecord, RecordMetadata, WorkerHealth, WorkerPhaseTaskStats};
pub use phase::{CreditPhase, CreditPhaseStats};
pub use record::{ParsedResponse, ParsedResponseData, ParsedResponseRecord, RawResponse, RequestRecord};
pub use tokenizer::{Tokenizer, WhitespaceTokenizer};
