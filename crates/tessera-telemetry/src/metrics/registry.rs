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

//! Registry for managing metrics.

use crate::storage::{backend::MetricsBackend, memory_backend::InMemoryBackend};
use serde::Serialize;
use std::sync::Arc;
use tessera_core::telemetry::{Metric, MetricId, MetricType, MetricsError, MetricsResult};

/// Point-in-time copy of every metric, ready for serialization.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Metrics sorted by id.
    pub metrics: Vec<Metric>,
}

/// Central registry of renderer statistics.
///
/// Registration hands out handles that update the metric without looking it
/// up by name every time. Registering an existing id with the same type
/// returns a handle to the existing metric.
#[derive(Debug, Clone)]
pub struct MetricsRegistry {
    backend: Arc<dyn MetricsBackend>,
}

impl MetricsRegistry {
    /// Creates a registry with the in-memory backend.
    pub fn new() -> Self {
        Self {
            backend: Arc::new(InMemoryBackend::new()),
        }
    }

    /// Creates a registry on a custom backend.
    pub fn with_backend(backend: Arc<dyn MetricsBackend>) -> Self {
        Self { backend }
    }

    fn register(&self, metric: Metric) -> MetricsResult<MetricId> {
        let id = metric.id.clone();
        match self.backend.get_metric(&id) {
            Ok(existing) if existing.value.metric_type() == metric.value.metric_type() => Ok(id),
            Ok(_) => Err(MetricsError::AlreadyRegistered(id)),
            Err(MetricsError::MetricNotFound(_)) => {
                self.backend.put_metric(metric)?;
                Ok(id)
            }
            Err(e) => Err(e),
        }
    }

    /// Registers a counter.
    pub fn register_counter(
        &self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> MetricsResult<CounterHandle> {
        let id = self.register(Metric::counter(MetricId::new(namespace, name), description))?;
        Ok(CounterHandle::new(id, self.backend.clone()))
    }

    /// Registers a gauge.
    pub fn register_gauge(
        &self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        unit: impl Into<String>,
    ) -> MetricsResult<GaugeHandle> {
        let id = self.register(Metric::gauge(
            MetricId::new(namespace, name),
            description,
            unit,
        ))?;
        Ok(GaugeHandle::new(id, self.backend.clone()))
    }

    /// Registers a histogram with the given bucket upper bounds.
    pub fn register_histogram(
        &self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        unit: impl Into<String>,
        buckets: Vec<f64>,
    ) -> MetricsResult<HistogramHandle> {
        let id = self.register(Metric::histogram(
            MetricId::new(namespace, name),
            description,
            unit,
            buckets,
        ))?;
        Ok(HistogramHandle::new(id, self.backend.clone()))
    }

    /// Looks up a metric.
    pub fn get_metric(&self, id: &MetricId) -> MetricsResult<Metric> {
        self.backend.get_metric(id)
    }

    /// Whether a metric is registered.
    pub fn contains_metric(&self, id: &MetricId) -> bool {
        self.backend.contains_metric(id)
    }

    /// Number of registered metrics.
    pub fn metric_count(&self) -> usize {
        self.backend.metric_count()
    }

    /// Copies every metric.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            metrics: self.backend.list_all_metrics(),
        }
    }

    /// Renders every metric as pretty-printed JSON.
    pub fn snapshot_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.snapshot())
    }

    /// Removes every metric. Existing handles start failing with `MetricNotFound`.
    pub fn clear_all(&self) {
        self.backend.clear_all();
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a counter.
#[derive(Debug, Clone)]
pub struct CounterHandle {
    id: MetricId,
    backend: Arc<dyn MetricsBackend>,
}

impl CounterHandle {
    fn new(id: MetricId, backend: Arc<dyn MetricsBackend>) -> Self {
        Self { id, backend }
    }

    /// Adds one.
    pub fn increment(&self) -> MetricsResult<u64> {
        self.backend.increment_counter(&self.id, 1)
    }

    /// Adds `amount`.
    pub fn increment_by(&self, amount: u64) -> MetricsResult<u64> {
        self.backend.increment_counter(&self.id, amount)
    }

    /// Current count.
    pub fn get(&self) -> MetricsResult<u64> {
        let metric = self.backend.get_metric(&self.id)?;
        metric
            .value
            .as_counter()
            .ok_or_else(|| MetricsError::TypeMismatch {
                expected: MetricType::Counter,
                found: metric.value.metric_type(),
            })
    }

    /// The metric id.
    pub fn id(&self) -> &MetricId {
        &self.id
    }
}

/// Handle to a gauge.
#[derive(Debug, Clone)]
pub struct GaugeHandle {
    id: MetricId,
    backend: Arc<dyn MetricsBackend>,
}

impl GaugeHandle {
    fn new(id: MetricId, backend: Arc<dyn MetricsBackend>) -> Self {
        Self { id, backend }
    }

    /// Sets the value.
    pub fn set(&self, value: f64) -> MetricsResult<()> {
        self.backend.set_gauge(&self.id, value)
    }

    /// Current value.
    pub fn get(&self) -> MetricsResult<f64> {
        let metric = self.backend.get_metric(&self.id)?;
        metric
            .value
            .as_gauge()
            .ok_or_else(|| MetricsError::TypeMismatch {
                expected: MetricType::Gauge,
                found: metric.value.metric_type(),
            })
    }

    /// The metric id.
    pub fn id(&self) -> &MetricId {
        &self.id
    }
}

/// Handle to a histogram.
#[derive(Debug, Clone)]
pub struct HistogramHandle {
    id: MetricId,
    backend: Arc<dyn MetricsBackend>,
}

impl HistogramHandle {
    fn new(id: MetricId, backend: Arc<dyn MetricsBackend>) -> Self {
        Self { id, backend }
    }

    /// Records an observation.
    pub fn observe(&self, value: f64) -> MetricsResult<()> {
        self.backend.record_histogram_sample(&self.id, value)
    }

    /// The full metric, buckets included.
    pub fn get_metric(&self) -> MetricsResult<Metric> {
        self.backend.get_metric(&self.id)
    }

    /// The metric id.
    pub fn id(&self) -> &MetricId {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::telemetry::MetricValue;

    #[test]
    fn counter_registration_and_operations() {
        let registry = MetricsRegistry::new();
        let counter = registry
            .register_counter("scenes", "flushes_applied", "Flushes applied")
            .unwrap();

        assert_eq!(counter.increment().unwrap(), 1);
        assert_eq!(counter.increment_by(5).unwrap(), 6);
        assert_eq!(counter.get().unwrap(), 6);
        assert!(registry.contains_metric(counter.id()));
        assert_eq!(registry.metric_count(), 1);
    }

    #[test]
    fn registering_twice_shares_the_metric() {
        let registry = MetricsRegistry::new();
        let a = registry.register_counter("resources", "uploaded", "").unwrap();
        a.increment().unwrap();
        let b = registry.register_counter("resources", "uploaded", "").unwrap();
        assert_eq!(b.get().unwrap(), 1);
        assert_eq!(registry.metric_count(), 1);
    }

    #[test]
    fn registering_with_another_type_is_refused() {
        let registry = MetricsRegistry::new();
        registry.register_counter("scenes", "count", "").unwrap();
        assert!(matches!(
            registry.register_gauge("scenes", "count", "", "scenes"),
            Err(MetricsError::AlreadyRegistered(_))
        ));
    }

    #[test]
    fn gauge_set_and_get() {
        let registry = MetricsRegistry::new();
        let gauge = registry
            .register_gauge("resources", "cached_bytes", "Cache usage", "bytes")
            .unwrap();
        gauge.set(2048.0).unwrap();
        assert_eq!(gauge.get().unwrap(), 2048.0);
    }

    #[test]
    fn snapshot_serializes_every_metric() {
        let registry = MetricsRegistry::new();
        registry
            .register_counter("scenes", "force_applied", "Force-applied flushes")
            .unwrap()
            .increment()
            .unwrap();
        let histogram = registry
            .register_histogram("frame", "update_ms", "Update time", "ms", vec![1.0, 2.0])
            .unwrap();
        histogram.observe(1.5).unwrap();

        let json = registry.snapshot_json().unwrap();
        assert!(json.contains("force_applied"));
        assert!(json.contains("update_ms"));

        match histogram.get_metric().unwrap().value {
            MetricValue::Histogram { count, .. } => assert_eq!(count, 1),
            other => panic!("unexpected value {other:?}"),
        }
    }
}
