//! The metric registry: orders [`MetricDefinition`]s so every metric
//! runs after the metrics it declares via `required_metrics` (spec §4.7).

use std::collections::{HashMap, HashSet, VecDeque};

use aiperf_core::{AiperfError, AiperfResult, ParsedResponseRecord};

use crate::metric::{MetricDefinition, MetricKey};

/// Holds the registered metrics in a fixed, dependency-respecting
/// evaluation order computed once at construction (Kahn's algorithm).
pub struct MetricRegistry {
    ordered: Vec<Box<dyn MetricDefinition>>,
}

impl MetricRegistry {
    pub fn new(metrics: Vec<Box<dyn MetricDefinition>>) -> AiperfResult<Self> {
        let ordered = topological_sort(metrics)?;
        Ok(Self { ordered })
    }

    /// Evaluates every metric against `record` in dependency order,
    /// skipping (not failing) a metric whose dependencies didn't resolve.
    pub fn evaluate(&self, record: &ParsedResponseRecord) -> HashMap<String, f64> {
        let mut computed: HashMap<MetricKey, f64> = HashMap::new();
        for metric in &self.ordered {
            if let Some(value) = metric.extract_value(record, &computed) {
                computed.insert(metric.key(), value);
            }
        }
        computed.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }
}

fn topological_sort(metrics: Vec<Box<dyn MetricDefinition>>) -> AiperfResult<Vec<Box<dyn MetricDefinition>>> {
    let keys: HashSet<MetricKey> = metrics.iter().map(|m| m.key()).collect();

    let mut indegree: HashMap<MetricKey, usize> = HashMap::new();
    let mut dependents: HashMap<MetricKey, Vec<MetricKey>> = HashMap::new();
    for metric in &metrics {
        indegree.entry(metric.key()).or_insert(0);
        for dep in metric.required_metrics() {
            if !keys.contains(dep) {
                return Err(AiperfError::Configuration(format!(
                    "metric {:?} requires unregistered metric {:?}",
                    metric.key(),
                    dep
                )));
            }
            *indegree.entry(metric.key()).or_insert(0) += 1;
            dependents.entry(dep).or_default().push(metric.key());
        }
    }

    let mut by_key: HashMap<MetricKey, Box<dyn MetricDefinition>> =
        metrics.into_iter().map(|m| (m.key(), m)).collect();

    let mut ready: VecDeque<MetricKey> = indegree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(key, _)| *key)
        .collect();
    let mut order = Vec::new();

    while let Some(key) = ready.pop_front() {
        order.push(key);
        if let Some(children) = dependents.get(&key) {
            for child in children {
                let degree = indegree.get_mut(child).unwrap();
                *degree -= 1;
                if *degree == 0 {
                    ready.push_back(*child);
                }
            }
        }
    }

    if order.len() != indegree.len() {
        return Err(AiperfError::Configuration(
            "metric registry has a dependency cycle".into(),
        ));
    }

    Ok(order
        .into_iter()
        .map(|key| by_key.remove(key).expect("key present by construction"))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::default_metrics;

    #[test]
    fn throughput_is_ordered_after_its_dependencies() {
        let registry = MetricRegistry::new(default_metrics()).unwrap();
        let positions: HashMap<MetricKey, usize> = registry
            .ordered
            .iter()
            .enumerate()
            .map(|(i, m)| (m.key(), i))
            .collect();
        let throughput = positions["output_token_throughput_per_sec"];
        assert!(throughput > positions["output_token_count"]);
        assert!(throughput > positions["request_latency_ns"]);
    }

    #[test]
    fn unregistered_dependency_is_rejected() {
        struct Bogus;
        impl MetricDefinition for Bogus {
            fn key(&self) -> MetricKey {
                "bogus"
            }
            fn required_metrics(&self) -> &'static [MetricKey] {
                &["does_not_exist"]
            }
            fn extract_value(&self, _: &ParsedResponseRecord, _: &HashMap<MetricKey, f64>) -> Option<f64> {
                None
            }
        }
        let result = MetricRegistry::new(vec![Box::new(Bogus)]);
        assert!(result.is_err());
    }
}
