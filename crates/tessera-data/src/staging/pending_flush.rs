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

use super::ClientResourceChanges;
use tessera_core::scene::{FlushTimeInfo, SceneAction, SceneResourceAction, SceneVersionTag};

/// A received flush waiting to be applied.
///
/// Resource bookkeeping (`resources`, `scene_resource_actions`) is cumulative
/// over every pending flush up to and including this one.
#[derive(Debug, Clone)]
pub struct PendingFlush {
    /// Per-scene flush counter.
    pub flush_index: u64,
    /// Scene actions of this flush only.
    pub actions: Vec<SceneAction>,
    /// Number of leading `actions` already applied.
    pub applied_actions: usize,
    /// Cumulative client resource changes.
    pub resources: ClientResourceChanges,
    /// Cumulative, consolidated scene resource actions.
    pub scene_resource_actions: Vec<SceneResourceAction>,
    /// Arrival and expiration.
    pub time_info: FlushTimeInfo,
    /// Optional version tag.
    pub version_tag: Option<SceneVersionTag>,
    /// Whether the flush itself changes anything.
    pub non_empty: bool,
}

impl PendingFlush {
    /// Actions that still have to be applied.
    pub fn remaining_actions(&self) -> &[SceneAction] {
        &self.actions[self.applied_actions.min(self.actions.len())..]
    }

    /// Whether every action was applied.
    pub fn is_fully_applied(&self) -> bool {
        self.applied_actions >= self.actions.len()
    }

    /// Whether the flush mutates scene content.
    pub fn has_scene_changes(&self) -> bool {
        !self.actions.is_empty()
    }
}
