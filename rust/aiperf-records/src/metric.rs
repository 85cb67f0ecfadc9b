//! Metric definitions: `_extract_value(record) -> value | None` plus a
//! declared `required_metrics` list other metrics in the same evaluation
//! pass can depend on (spec §4.7).

use std::collections::HashMap;

use aiperf_core::ParsedResponseData;
use aiperf_core::ParsedResponseRecord;

pub type MetricKey = &'static str;

/// One registered metric. `extract_value` sees the record plus every
/// value already computed for it this pass (in dependency order), so a
/// metric can build on another's output without recomputing it.
pub trait MetricDefinition: Send + Sync {
    fn key(&self) -> MetricKey;

    fn required_metrics(&self) -> &'static [MetricKey] {
        &[]
    }

    fn extract_value(&self, record: &ParsedResponseRecord, computed: &HashMap<MetricKey, f64>) -> Option<f64>;
}

pub struct TimeToFirstTokenMetric;
impl MetricDefinition for TimeToFirstTokenMetric {
    fn key(&self) -> MetricKey {
        "time_to_first_token_ns"
    }
    fn extract_value(&self, record: &ParsedResponseRecord, _computed: &HashMap<MetricKey, f64>) -> Option<f64> {
        record.ttft_ns().map(|v| v as f64)
    }
}

pub struct InterTokenLatencyMetric;
impl MetricDefinition for InterTokenLatencyMetric {
    fn key(&self) -> MetricKey {
        "inter_token_latency_ns"
    }
    fn extract_value(&self, record: &ParsedResponseRecord, _computed: &HashMap<MetricKey, f64>) -> Option<f64> {
        record.mean_itl_ns()
    }
}

pub struct RequestLatencyMetric;
impl MetricDefinition for RequestLatencyMetric {
    fn key(&self) -> MetricKey {
        "request_latency_ns"
    }
    fn extract_value(&self, record: &ParsedResponseRecord, _computed: &HashMap<MetricKey, f64>) -> Option<f64> {
        let last = record.last_response_perf_ns?;
        Some(last.saturating_sub(record.start_perf_ns) as f64)
    }
}

pub struct OutputTokenCountMetric;
impl MetricDefinition for OutputTokenCountMetric {
    fn key(&self) -> MetricKey {
        "output_token_count"
    }
    fn extract_value(&self, record: &ParsedResponseRecord, _computed: &HashMap<MetricKey, f64>) -> Option<f64> {
        record.output_token_count.map(|v| v as f64)
    }
}

pub struct InputTokenCountMetric;
impl MetricDefinition for InputTokenCountMetric {
    fn key(&self) -> MetricKey {
        "input_token_count"
    }
    fn extract_value(&self, record: &ParsedResponseRecord, _computed: &HashMap<MetricKey, f64>) -> Option<f64> {
        record.input_token_count.map(|v| v as f64)
    }
}

/// Depends on `output_token_count` and `request_latency_ns`; only
/// reachable if both evaluated successfully this pass.
pub struct OutputTokenThroughputMetric;
impl MetricDefinition for OutputTokenThroughputMetric {
    fn key(&self) -> MetricKey {
        "output_token_throughput_per_sec"
    }
    fn required_metrics(&self) -> &'static [MetricKey] {
        &["output_token_count", "request_latency_ns"]
    }
    fn extract_value(&self, _record: &ParsedResponseRecord, computed: &HashMap<MetricKey, f64>) -> Option<f64> {
        let tokens = *computed.get("output_token_count")?;
        let latency_ns = *computed.get("request_latency_ns")?;
        if latency_ns <= 0.0 {
            return None;
        }
        Some(tokens / (latency_ns / 1_000_000_000.0))
    }
}

/// Non-empty-text-response count, used to distinguish embeddings traffic
/// from chat traffic in a mixed summary (reserved for future use; every
/// metric currently shipped evaluates chat records).
pub fn is_text_response(record: &ParsedResponseRecord) -> bool {
    record
        .responses
        .iter()
        .any(|r| matches!(r.data, ParsedResponseData::Text { .. }))
}

/// The built-in metric set (spec §4.7's examples plus the derived
/// throughput metric from DESIGN NOTES' dependency-order requirement).
pub fn default_metrics() -> Vec<Box<dyn MetricDefinition>> {
    vec![
        Box::new(TimeToFirstTokenMetric),
        Box::new(InterTokenLatencyMetric),
        Box::new(RequestLatencyMetric),
        Box::new(OutputTokenCountMetric),
        Box::new(InputTokenCountMetric),
        Box::new(OutputTokenThroughputMetric),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use aiperf_core::{perf_ns, wall_ns, CreditPhase, ParsedResponse, PerfNs};

    fn sample_record() -> ParsedResponseRecord {
        let start = PerfNs(0);
        ParsedResponseRecord {
            x_request_id: "r".into(),
            x_correlation_id: "c".into(),
            worker_id: "w".into(),
            model: "llama".into(),
            conversation_id: "conv".into(),
            turn_index: 0,
            credit_phase: CreditPhase::Profiling,
            timestamp_ns: wall_ns(),
            start_perf_ns: start,
            first_response_perf_ns: Some(PerfNs(20_000_000)),
            last_response_perf_ns: Some(PerfNs(40_000_000)),
            responses: vec![
                ParsedResponse {
                    perf_ns: PerfNs(20_000_000),
                    data: ParsedResponseData::Text { text: "hi".into(), reasoning: None },
                },
                ParsedResponse {
                    perf_ns: PerfNs(40_000_000),
                    data: ParsedResponseData::Text { text: "there".into(), reasoning: None },
                },
            ],
            input_token_count: Some(3),
            output_token_count: Some(2),
            error: None,
        }
    }

    #[test]
    fn request_latency_and_throughput_compose_in_dependency_order() {
        let _ = perf_ns();
        let record = sample_record();
        let latency = RequestLatencyMetric.extract_value(&record, &HashMap::new()).unwrap();
        assert_eq!(latency, 40_000_000.0);

        let mut computed = HashMap::new();
        computed.insert("output_token_count", 2.0);
        computed.insert("request_latency_ns", latency);
        let throughput = OutputTokenThroughputMetric.extract_value(&record, &computed).unwrap();
        assert!((throughput - 50.0).abs() < 1e-6);
    }

    #[test]
    fn throughput_is_none_without_its_dependencies() {
        let record = sample_record();
        let throughput = OutputTokenThroughputMetric.extract_value(&record, &HashMap::new());
        assert!(throughput.is_none());
    }
}
