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

//! Abstract definitions for metrics.

use serde::Serialize;
use std::fmt::{self, Display};

/// A structured identifier for a metric: a namespace plus a name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MetricId {
    /// Broad category (e.g. "scenes", "resources").
    pub namespace: String,
    /// Specific name (e.g. "flushes_applied").
    pub name: String,
}

impl MetricId {
    /// Creates a new `MetricId`.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

/// The fundamental type of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MetricType {
    /// Only ever increases.
    Counter,
    /// Goes up and down.
    Gauge,
    /// Distribution of observations.
    Histogram,
}

/// The current value of a metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MetricValue {
    /// Monotonic count.
    Counter(u64),
    /// Last set value.
    Gauge(f64),
    /// Bucketed observations. `bucket_counts` has one extra slot for values above the last bound.
    Histogram {
        /// Upper bounds of the buckets, ascending.
        bucket_bounds: Vec<f64>,
        /// Observations per bucket.
        bucket_counts: Vec<u64>,
        /// Number of observations.
        count: u64,
        /// Sum of observations.
        sum: f64,
    },
}

impl MetricValue {
    /// Returns the [`MetricType`] of this value.
    pub fn metric_type(&self) -> MetricType {
        match self {
            MetricValue::Counter(_) => MetricType::Counter,
            MetricValue::Gauge(_) => MetricType::Gauge,
            MetricValue::Histogram { .. } => MetricType::Histogram,
        }
    }

    /// Returns the count if this is a counter.
    pub fn as_counter(&self) -> Option<u64> {
        match self {
            MetricValue::Counter(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value if this is a gauge.
    pub fn as_gauge(&self) -> Option<f64> {
        match self {
            MetricValue::Gauge(v) => Some(*v),
            _ => None,
        }
    }
}

/// A metric with its descriptive metadata.
#[derive(Debug, Clone, Serialize)]
pub struct Metric {
    /// Identifier.
    pub id: MetricId,
    /// Human-readable description.
    pub description: String,
    /// Unit of measurement.
    pub unit: String,
    /// Current value.
    pub value: MetricValue,
}

impl Metric {
    /// Creates a counter starting at zero.
    pub fn counter(id: MetricId, description: impl Into<String>) -> Self {
        Self {
            id,
            description: description.into(),
            unit: "count".to_string(),
            value: MetricValue::Counter(0),
        }
    }

    /// Creates a gauge starting at zero.
    pub fn gauge(id: MetricId, description: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            id,
            description: description.into(),
            unit: unit.into(),
            value: MetricValue::Gauge(0.0),
        }
    }

    /// Creates an empty histogram with the given bucket bounds.
    pub fn histogram(
        id: MetricId,
        description: impl Into<String>,
        unit: impl Into<String>,
        mut bucket_bounds: Vec<f64>,
    ) -> Self {
        bucket_bounds.sort_by(|a, b| a.total_cmp(b));
        let bucket_counts = vec![0; bucket_bounds.len() + 1];
        Self {
            id,
            description: description.into(),
            unit: unit.into(),
            value: MetricValue::Histogram {
                bucket_bounds,
                bucket_counts,
                count: 0,
                sum: 0.0,
            },
        }
    }
}

/// A specialized `Result` type for metric operations.
pub type MetricsResult<T> = Result<T, MetricsError>;

/// An error within the metrics system.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricsError {
    /// The metric is not registered.
    MetricNotFound(MetricId),
    /// The operation does not fit the metric's type.
    TypeMismatch {
        /// Type the operation needs.
        expected: MetricType,
        /// Type the metric has.
        found: MetricType,
    },
    /// A metric with this id is already registered with another type.
    AlreadyRegistered(MetricId),
}

impl Display for MetricsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricsError::MetricNotFound(id) => write!(f, "Metric not found: {id}"),
            MetricsError::TypeMismatch { expected, found } => {
                write!(f, "Type mismatch: expected {expected:?}, found {found:?}")
            }
            MetricsError::AlreadyRegistered(id) => {
                write!(f, "Metric {id} is already registered with a different type")
            }
        }
    }
}

impl std::error::Error for MetricsError {}
