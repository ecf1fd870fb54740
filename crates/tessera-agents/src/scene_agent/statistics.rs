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

//! Renderer statistics kept in a [`MetricsRegistry`].

use tessera_core::telemetry::MetricsResult;
use tessera_telemetry::{CounterHandle, GaugeHandle, HistogramHandle, MetricsRegistry};

const NAMESPACE: &str = "renderer";
const UPDATE_MS_BUCKETS: [f64; 6] = [0.5, 1.0, 2.0, 4.0, 8.0, 16.0];

/// Handles to every statistic the scene update agent maintains.
#[derive(Debug, Clone)]
pub struct RendererStatistics {
    registry: MetricsRegistry,
    /// Flushes applied, forced ones included.
    pub flushes_applied: CounterHandle,
    /// Flushes applied with resources missing.
    pub flushes_force_applied: CounterHandle,
    /// Frames in which a scene's flushes waited for resources.
    pub flushes_blocked: CounterHandle,
    /// Updates refused for an index gap.
    pub flushes_rejected: CounterHandle,
    /// Client resources uploaded.
    pub resources_uploaded: CounterHandle,
    /// Client resources that failed to upload.
    pub resources_broken: CounterHandle,
    /// Device objects released by upload passes.
    pub resources_unloaded: CounterHandle,
    /// Stream textures refreshed from the compositor.
    pub stream_texture_updates: CounterHandle,
    /// Remote scenes unsubscribed for exceeding the pending flush limit.
    pub force_unsubscribes: CounterHandle,
    /// Scenes mapped with resources missing.
    pub force_maps: CounterHandle,
    /// Scenes known to the agent.
    pub scenes: GaugeHandle,
    /// Bytes held by the VRAM cache.
    pub cached_bytes: GaugeHandle,
    /// Duration of a frame update.
    pub update_duration_ms: HistogramHandle,
}

impl RendererStatistics {
    /// Registers the statistics in `registry`.
    pub fn register(registry: &MetricsRegistry) -> MetricsResult<Self> {
        let counter = |name: &str, description: &str| {
            registry.register_counter(NAMESPACE, name, description)
        };
        Ok(Self {
            registry: registry.clone(),
            flushes_applied: counter("flushes_applied", "Flushes applied")?,
            flushes_force_applied: counter("flushes_force_applied", "Flushes applied with resources missing")?,
            flushes_blocked: counter("flushes_blocked", "Frames a scene waited for resources")?,
            flushes_rejected: counter("flushes_rejected", "Updates refused for an index gap")?,
            resources_uploaded: counter("resources_uploaded", "Client resources uploaded")?,
            resources_broken: counter("resources_broken", "Client resources failed to upload")?,
            resources_unloaded: counter("resources_unloaded", "Device objects released")?,
            stream_texture_updates: counter("stream_texture_updates", "Stream textures refreshed")?,
            force_unsubscribes: counter("force_unsubscribes", "Remote scenes force-unsubscribed")?,
            force_maps: counter("force_maps", "Scenes mapped with resources missing")?,
            scenes: registry.register_gauge(NAMESPACE, "scenes", "Scenes known", "scenes")?,
            cached_bytes: registry.register_gauge(NAMESPACE, "cached_bytes", "VRAM cache usage", "bytes")?,
            update_duration_ms: registry.register_histogram(
                NAMESPACE,
                "update_duration_ms",
                "Duration of a frame update",
                "ms",
                UPDATE_MS_BUCKETS.to_vec(),
            )?,
        })
    }

    /// The registry the statistics live in.
    pub fn registry(&self) -> &MetricsRegistry {
        &self.registry
    }

    /// Adds `amount` to a counter. Failures are logged, never fatal.
    pub fn bump(counter: &CounterHandle, amount: u64) {
        if amount == 0 {
            return;
        }
        if let Err(e) = counter.increment_by(amount) {
            log::warn!("RendererStatistics: cannot update {}: {e}", counter.id());
        }
    }

    /// Sets a gauge. Failures are logged, never fatal.
    pub fn set(gauge: &GaugeHandle, value: f64) {
        if let Err(e) = gauge.set(value) {
            log::warn!("RendererStatistics: cannot update {}: {e}", gauge.id());
        }
    }
}
