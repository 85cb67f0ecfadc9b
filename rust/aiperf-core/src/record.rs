//! Per-request records as they flow worker -> parser -> records manager.

use crate::clock::{PerfNs, WallNs};
use crate::error::ErrorDetails;
use crate::phase::CreditPhase;
use serde::{Deserialize, Serialize};

/// One raw chunk read off the inference socket, stamped the instant it
/// arrives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawResponse {
    pub perf_ns: PerfNs,
    pub payload: Vec<u8>,
}

/// The worker's log of one attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRecord {
    pub x_request_id: String,
    pub x_correlation_id: String,
    pub worker_id: String,
    pub model: String,
    pub conversation_id: String,
    pub turn_index: usize,
    pub credit_phase: CreditPhase,
    pub timestamp_ns: WallNs,
    pub start_perf_ns: PerfNs,
    pub end_perf_ns: PerfNs,
    pub request_payload: Vec<u8>,
    pub responses: Vec<RawResponse>,
    pub error: Option<ErrorDetails>,
    pub delayed_ns: i64,
    pub pre_inference_ns: Option<i64>,
}

/// A typed extraction of one streaming chunk's user-visible payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParsedResponseData {
    Text {
        text: String,
        reasoning: Option<String>,
    },
    Embedding {
        embedding: Vec<f32>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedResponse {
    pub perf_ns: PerfNs,
    pub data: ParsedResponseData,
}

/// Request plus its ordered parsed responses and derived token counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedResponseRecord {
    pub x_request_id: String,
    pub x_correlation_id: String,
    pub worker_id: String,
    pub model: String,
    pub conversation_id: String,
    pub turn_index: usize,
    pub credit_phase: CreditPhase,
    pub timestamp_ns: WallNs,
    pub start_perf_ns: PerfNs,
    pub first_response_perf_ns: Option<PerfNs>,
    pub last_response_perf_ns: Option<PerfNs>,
    pub responses: Vec<ParsedResponse>,
    pub input_token_count: Option<usize>,
    pub output_token_count: Option<usize>,
    pub error: Option<ErrorDetails>,
}

impl ParsedResponseRecord {
    /// Time-to-first-token: `first_response_perf_ns - start_perf_ns`.
    pub fn ttft_ns(&self) -> Option<i64> {
        self.first_response_perf_ns
            .map(|t| t.saturating_sub(self.start_perf_ns))
    }

    /// Mean inter-token latency across all responses after the first.
    pub fn mean_itl_ns(&self) -> Option<f64> {
        if self.responses.len() < 2 {
            return None;
        }
        let mut total = 0i64;
        for pair in self.responses.windows(2) {
            total += pair[1].perf_ns.saturating_sub(pair[0].perf_ns);
        }
        Some(total as f64 / (self.responses.len() - 1) as f64)
    }
}
