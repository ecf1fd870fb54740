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

use super::{SceneResourceAction, SceneVersionTag};
use crate::resource::{ResourceContentHash, ResourceData};
use std::time::Instant;

/// One opaque scene-mutating action.
///
/// The payload is interpreted only by the [`RendererScene`](super::RendererScene)
/// implementation; the update engine just moves it around in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneAction {
    /// Implementation-defined action discriminant.
    pub kind: u32,
    /// Serialized action arguments.
    pub payload: Vec<u8>,
}

impl SceneAction {
    /// Creates an action from its kind and payload.
    pub fn new(kind: u32, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }
}

/// Preallocation hint shipped with a scene or a flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SceneSizeHint {
    /// Expected number of scene graph nodes.
    pub nodes: usize,
    /// Expected number of distinct client resources.
    pub resources: usize,
}

/// Timing metadata of a flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushTimeInfo {
    /// When the flush arrived on the renderer side. Filled in on receipt when absent.
    pub arrival: Option<Instant>,
    /// When the content of this flush stops being valid. `None` disables monitoring.
    pub expiration: Option<Instant>,
}

/// An incremental update of one scene, as delivered by the scene update feed.
#[derive(Debug, Clone, Default)]
pub struct SceneUpdate {
    /// Per-scene flush counter, strictly increasing by one.
    pub flush_index: u64,
    /// Scene-mutating actions, applied in order.
    pub actions: Vec<SceneAction>,
    /// Client resources newly referenced by this flush.
    pub resources_added: Vec<ResourceContentHash>,
    /// Client resources no longer referenced after this flush.
    pub resources_removed: Vec<ResourceContentHash>,
    /// Payloads of client resources, possibly arriving ahead of or after their reference.
    pub resource_data: Vec<ResourceData>,
    /// Allocation and release of scene-local GPU resources.
    pub scene_resource_actions: Vec<SceneResourceAction>,
    /// Preallocation hint.
    pub size_hint: SceneSizeHint,
    /// Arrival and expiration timestamps.
    pub time_info: FlushTimeInfo,
    /// Optional tag reported in `SceneFlushed` once applied.
    pub version_tag: Option<SceneVersionTag>,
}

impl SceneUpdate {
    /// Creates an empty update with the given flush index.
    pub fn new(flush_index: u64) -> Self {
        Self {
            flush_index,
            ..Default::default()
        }
    }

    /// Whether applying this update changes scene content.
    pub fn has_scene_changes(&self) -> bool {
        !self.actions.is_empty()
    }
}
