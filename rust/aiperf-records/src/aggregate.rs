//! Running percentile aggregation, keyed by `(CreditPhase, metric)`
//! (spec §4.7): every value seen this run feeds an `hdrhistogram` so the
//! profile summary can report p50/p90/p95/p99 without buffering records.

use std::collections::HashMap;

use aiperf_core::CreditPhase;
use dashmap::DashMap;
use hdrhistogram::Histogram;

/// Integer scaling applied before recording into the histogram, since
/// `hdrhistogram` only stores non-negative integers. Values are
/// nanoseconds or counts already large enough that one unit of precision
/// loss at this scale doesn't move a percentile.
const SCALE: f64 = 1000.0;

#[derive(Debug, Clone, Copy)]
pub struct MetricSummaryStats {
    pub count: u64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

struct Entry {
    histogram: Histogram<u64>,
}

impl Entry {
    fn new() -> Self {
        Self {
            // 5 nines of dynamic range, 3 significant figures; generous
            // enough for both nanosecond latencies and token counts.
            histogram: Histogram::new_with_bounds(1, u64::MAX / 2, 3).expect("valid histogram bounds"),
        }
    }

    fn record(&mut self, value: f64) {
        let scaled = (value.max(0.0) * SCALE).round() as u64;
        let _ = self.histogram.record(scaled.max(1));
    }

    fn summary(&self) -> MetricSummaryStats {
        MetricSummaryStats {
            count: self.histogram.len(),
            mean: self.histogram.mean() / SCALE,
            min: self.histogram.min() as f64 / SCALE,
            max: self.histogram.max() as f64 / SCALE,
            p50: self.histogram.value_at_quantile(0.50) as f64 / SCALE,
            p90: self.histogram.value_at_quantile(0.90) as f64 / SCALE,
            p95: self.histogram.value_at_quantile(0.95) as f64 / SCALE,
            p99: self.histogram.value_at_quantile(0.99) as f64 / SCALE,
        }
    }
}

/// Concurrent store of one histogram per `(phase, metric)` pair. Each
/// entry is updated under `DashMap`'s own per-shard lock, the same
/// pattern the dataset manager uses for its conversation map.
#[derive(Default)]
pub struct MetricAggregator {
    entries: DashMap<(CreditPhase, String), Entry>,
}

impl MetricAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, phase: CreditPhase, metric: &str, value: f64) {
        self.entries
            .entry((phase, metric.to_string()))
            .or_insert_with(Entry::new)
            .record(value);
    }

    /// Snapshot every aggregate as `{phase -> {metric -> summary}}`.
    pub async fn snapshot(&self) -> HashMap<CreditPhase, HashMap<String, MetricSummaryStats>> {
        let mut by_phase: HashMap<CreditPhase, HashMap<String, MetricSummaryStats>> = HashMap::new();
        for entry in self.entries.iter() {
            let (phase, metric) = entry.key();
            by_phase
                .entry(*phase)
                .or_default()
                .insert(metric.clone(), entry.value().summary());
        }
        by_phase
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn percentiles_reflect_recorded_values() {
        let aggregator = MetricAggregator::new();
        for v in 1..=100 {
            aggregator.record(CreditPhase::Profiling, "request_latency_ns", v as f64).await;
        }
        let snapshot = aggregator.snapshot().await;
        let stats = snapshot[&CreditPhase::Profiling]["request_latency_ns"];
        assert_eq!(stats.count, 100);
        assert!((stats.p50 - 50.0).abs() <= 2.0);
        assert!((stats.max - 100.0).abs() <= 1.0);
    }

    #[tokio::test]
    async fn phases_are_kept_independent() {
        let aggregator = MetricAggregator::new();
        aggregator.record(CreditPhase::Warmup, "request_latency_ns", 10.0).await;
        aggregator.record(CreditPhase::Profiling, "request_latency_ns", 1000.0).await;
        let snapshot = aggregator.snapshot().await;
        assert!(snapshot[&CreditPhase::Warmup]["request_latency_ns"].max < 100.0);
        assert!(snapshot[&CreditPhase::Profiling]["request_latency_ns"].max > 100.0);
    }
}
