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

//! Renderer configuration.

use crate::utils::timer::{FrameSection, FrameTimer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Per-section frame budgets in microseconds. `u64::MAX` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameBudgetConfig {
    /// Client resource upload and unload pass.
    pub resources_upload_us: u64,
    /// Application of flush actions.
    pub scene_actions_apply_us: u64,
    /// Scene-local resource actions.
    pub scene_resources_upload_us: u64,
}

impl Default for FrameBudgetConfig {
    fn default() -> Self {
        Self {
            resources_upload_us: u64::MAX,
            scene_actions_apply_us: u64::MAX,
            scene_resources_upload_us: u64::MAX,
        }
    }
}

impl FrameBudgetConfig {
    /// Writes these budgets into a frame timer.
    pub fn apply_to(&self, timer: &mut FrameTimer) {
        let to_duration = |us: u64| {
            if us == u64::MAX {
                Duration::MAX
            } else {
                Duration::from_micros(us)
            }
        };
        timer.set_section_budget(FrameSection::ResourcesUpload, to_duration(self.resources_upload_us));
        timer.set_section_budget(
            FrameSection::SceneActionsApply,
            to_duration(self.scene_actions_apply_us),
        );
        timer.set_section_budget(
            FrameSection::SceneResourcesUpload,
            to_duration(self.scene_resources_upload_us),
        );
    }
}

/// Configuration of one scene update engine instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Pending flush count above which the oldest flush is applied regardless of
    /// resource readiness, and mapping completes regardless of missing resources.
    pub max_pending_flushes_to_force_apply: usize,
    /// Pending flush count above which a remote scene is unsubscribed.
    pub max_pending_flushes_to_force_unsubscribe: usize,
    /// Time a scene may spend in `MappingAndUploading` before mapping is forced. 0 disables.
    pub max_mapping_wait_ms: u64,
    /// Number of actions applied per chunk when a flush is applied partially.
    pub scene_action_chunk_size: usize,
    /// GPU memory kept for unreferenced but uploaded resources.
    pub resource_cache_size_bytes: u64,
    /// How many missing resources a diagnostic lists before summarizing.
    pub missing_resources_log_limit: usize,
    /// Per-section frame budgets.
    pub frame_budgets: FrameBudgetConfig,
    /// Wake-up interval of an idle upload thread.
    pub upload_queue_poll_ms: u64,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            max_pending_flushes_to_force_apply: 100,
            max_pending_flushes_to_force_unsubscribe: 200,
            max_mapping_wait_ms: 10_000,
            scene_action_chunk_size: 100,
            resource_cache_size_bytes: 0,
            missing_resources_log_limit: 10,
            frame_budgets: FrameBudgetConfig::default(),
            upload_queue_poll_ms: 5,
        }
    }
}

/// A configuration that cannot be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The force-unsubscribe threshold must be above the force-apply threshold.
    ThresholdOrder {
        /// Configured force-apply threshold.
        force_apply: usize,
        /// Configured force-unsubscribe threshold.
        force_unsubscribe: usize,
    },
    /// Partial application needs at least one action per chunk.
    EmptyActionChunk,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ThresholdOrder {
                force_apply,
                force_unsubscribe,
            } => write!(
                f,
                "max_pending_flushes_to_force_unsubscribe ({force_unsubscribe}) must exceed \
                 max_pending_flushes_to_force_apply ({force_apply})"
            ),
            ConfigError::EmptyActionChunk => f.write_str("scene_action_chunk_size must be at least 1"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl RendererConfig {
    /// Parses a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    /// Saves the configuration as pretty-printed JSON.
    pub fn to_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_pending_flushes_to_force_unsubscribe <= self.max_pending_flushes_to_force_apply {
            return Err(ConfigError::ThresholdOrder {
                force_apply: self.max_pending_flushes_to_force_apply,
                force_unsubscribe: self.max_pending_flushes_to_force_unsubscribe,
            });
        }
        if self.scene_action_chunk_size == 0 {
            return Err(ConfigError::EmptyActionChunk);
        }
        Ok(())
    }

    /// Maximum time in `MappingAndUploading` before mapping is forced.
    pub fn max_mapping_wait(&self) -> Option<Duration> {
        (self.max_mapping_wait_ms > 0).then(|| Duration::from_millis(self.max_mapping_wait_ms))
    }
}
