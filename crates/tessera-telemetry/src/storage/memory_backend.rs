// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! In-memory metrics store.

use super::backend::MetricsBackend;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tessera_core::telemetry::{Metric, MetricId, MetricsError, MetricsResult};

/// Thread-safe map of metrics kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    storage: RwLock<BTreeMap<MetricId, Metric>>,
}

impl InMemoryBackend {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<MetricId, Metric>> {
        self.storage.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<MetricId, Metric>> {
        self.storage.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Metrics of one namespace, sorted by name.
    pub fn metrics_in_namespace(&self, namespace: &str) -> Vec<Metric> {
        self.read()
            .values()
            .filter(|metric| metric.id.namespace == namespace)
            .cloned()
            .collect()
    }
}

impl MetricsBackend for InMemoryBackend {
    fn put_metric(&self, metric: Metric) -> MetricsResult<()> {
        self.write().insert(metric.id.clone(), metric);
        Ok(())
    }

    fn get_metric(&self, id: &MetricId) -> MetricsResult<Metric> {
        self.read()
            .get(id)
            .cloned()
            .ok_or_else(|| MetricsError::MetricNotFound(id.clone()))
    }

    fn contains_metric(&self, id: &MetricId) -> bool {
        self.read().contains_key(id)
    }

    fn list_all_metrics(&self) -> Vec<Metric> {
        self.read().values().cloned().collect()
    }

    fn clear_all(&self) {
        self.write().clear();
    }

    fn metric_count(&self) -> usize {
        self.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::telemetry::MetricValue;

    #[test]
    fn histogram_samples_land_in_their_bucket() {
        let backend = InMemoryBackend::new();
        let id = MetricId::new("frame", "update_ms");
        backend
            .put_metric(Metric::histogram(id.clone(), "Update", "ms", vec![1.0, 4.0]))
            .expect("put");

        for sample in [0.5, 1.0, 3.0, 9.0] {
            backend.record_histogram_sample(&id, sample).expect("observe");
        }

        match backend.get_metric(&id).expect("get").value {
            MetricValue::Histogram {
                bucket_counts,
                count,
                sum,
                ..
            } => {
                assert_eq!(bucket_counts, vec![2, 1, 1]);
                assert_eq!(count, 4);
                assert_eq!(sum, 13.5);
            }
            other => panic!("unexpected value {other:?}"),
        }
    }

    #[test]
    fn updating_a_missing_metric_fails() {
        let backend = InMemoryBackend::new();
        let id = MetricId::new("scenes", "missing");
        assert_eq!(
            backend.increment_counter(&id, 1),
            Err(MetricsError::MetricNotFound(id))
        );
    }

    #[test]
    fn namespace_query_filters_by_namespace() {
        let backend = InMemoryBackend::new();
        for (ns, name) in [("scenes", "a"), ("resources", "b"), ("scenes", "c")] {
            backend
                .put_metric(Metric::counter(MetricId::new(ns, name), ""))
                .expect("put");
        }
        let names: Vec<_> = backend
            .metrics_in_namespace("scenes")
            .into_iter()
            .map(|m| m.id.name)
            .collect();
        assert_eq!(names, vec!["a", "c"]);
    }
}
