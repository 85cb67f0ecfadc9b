//! The finished shape of a profile run, published on `PROFILE_RESULTS`
//! and handed to exporters (spec §4.7).

use std::collections::HashMap;

use aiperf_core::CreditPhase;
use serde::{Deserialize, Serialize};

use crate::aggregate::MetricSummaryStats;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub count: u64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

impl From<MetricSummaryStats> for MetricsSummary {
    fn from(stats: MetricSummaryStats) -> Self {
        Self {
            count: stats.count,
            mean: stats.mean,
            min: stats.min,
            max: stats.max,
            p50: stats.p50,
            p90: stats.p90,
            p95: stats.p95,
            p99: stats.p99,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ErrorDetailsCount {
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileResults {
    pub total_records: u64,
    pub error_records: u64,
    pub errors_by_type: HashMap<String, ErrorDetailsCount>,
    pub metrics: HashMap<CreditPhase, HashMap<String, MetricsSummary>>,
    pub cancelled: bool,
}
