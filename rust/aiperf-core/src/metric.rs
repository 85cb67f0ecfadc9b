//! Flat per-attempt metric records consumed by the records manager.

use crate::clock::WallNs;
use crate::error::ErrorDetails;
use crate::phase::CreditPhase;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Metadata common to every metric record, used for keying aggregates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub conversation_id: String,
    pub turn_index: usize,
    pub timestamp_ns: WallNs,
    pub worker_id: String,
    pub record_processor_id: String,
    pub credit_phase: CreditPhase,
    pub error: Option<ErrorDetails>,
}

/// A flat `{tag -> value}` map for one completed attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricRecord {
    pub metadata: RecordMetadata,
    pub values: HashMap<String, f64>,
}

impl MetricRecord {
    pub fn is_error(&self) -> bool {
        self.metadata.error.is_some()
    }
}

/// Per-phase health counters published by a worker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerPhaseTaskStats {
    pub in_flight: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Worker health snapshot, published every `worker_health_check_interval`.
///
/// Resolves Open Question 2 in favor of the richer shape: `task_stats` keyed
/// by [`CreditPhase`] rather than a flat task count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerHealth {
    pub worker_id: String,
    pub cpu_percent: f64,
    pub memory_bytes: u64,
    pub task_stats: HashMap<CreditPhase, WorkerPhaseTaskStats>,
}
