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

use super::{
    consolidate_resources_in_use, consolidate_scene_resource_actions, ClientResourceChanges,
    PendingFlush,
};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::Instant;
use tessera_core::event::FlushRejectReason;
use tessera_core::resource::{ResourceContentHash, ResourceData};
use tessera_core::scene::{SceneResourceAction, SceneSizeHint, SceneUpdate, SceneVersionTag};

/// Per-scene staging area, alive as long as the scene is subscribed.
#[derive(Debug, Default)]
pub struct StagingInfo {
    pending_flushes: VecDeque<PendingFlush>,
    non_empty_pending: usize,
    resources_in_use: BTreeSet<ResourceContentHash>,
    resources_to_upload_once_mapping: BTreeMap<ResourceContentHash, ResourceData>,
    arrived_resource_data: Vec<ResourceData>,
    scene_resource_actions: Vec<SceneResourceAction>,
    size_hint: SceneSizeHint,
    last_applied_version_tag: Option<SceneVersionTag>,
    last_flush_index: Option<u64>,
}

impl StagingInfo {
    /// Creates an empty staging area sized after the hint.
    pub fn new(size_hint: SceneSizeHint) -> Self {
        Self {
            arrived_resource_data: Vec::with_capacity(size_hint.resources),
            size_hint,
            ..Default::default()
        }
    }

    /// The preallocation hint of the scene.
    pub fn size_hint(&self) -> SceneSizeHint {
        self.size_hint
    }

    /// Checks that `flush_index` directly follows the last received flush.
    pub fn check_flush_index(&self, flush_index: u64) -> Result<(), FlushRejectReason> {
        match self.last_flush_index {
            Some(last) if flush_index != last.wrapping_add(1) => Err(FlushRejectReason::IndexGap {
                expected: last.wrapping_add(1),
                received: flush_index,
            }),
            _ => Ok(()),
        }
    }

    /// Consolidates an incoming update into a new pending flush.
    ///
    /// Returns the client resources that this flush newly needs; a mapped scene
    /// must reference them right away.
    pub fn stage(&mut self, update: SceneUpdate) -> Vec<ResourceContentHash> {
        let previous = self.pending_flushes.back();
        let mut resources = previous.map(|p| p.resources.clone()).unwrap_or_default();
        let mut scene_resource_actions = previous
            .map(|p| p.scene_resource_actions.clone())
            .unwrap_or_default();

        let non_empty = !update.actions.is_empty()
            || !update.resources_added.is_empty()
            || !update.resources_removed.is_empty()
            || !update.scene_resource_actions.is_empty();

        let newly_needed = resources.consolidate(&update.resources_added, &update.resources_removed);
        consolidate_scene_resource_actions(update.scene_resource_actions, &mut scene_resource_actions);

        let mut time_info = update.time_info;
        time_info.arrival.get_or_insert_with(Instant::now);

        self.arrived_resource_data.extend(update.resource_data);
        self.last_flush_index = Some(update.flush_index);
        if non_empty {
            self.non_empty_pending += 1;
        }
        self.pending_flushes.push_back(PendingFlush {
            flush_index: update.flush_index,
            actions: update.actions,
            applied_actions: 0,
            resources,
            scene_resource_actions,
            time_info,
            version_tag: update.version_tag,
            non_empty,
        });

        newly_needed
    }

    /// Number of flushes not fully applied.
    pub fn pending_flush_count(&self) -> usize {
        self.pending_flushes.len()
    }

    /// Number of pending flushes that change anything. Backpressure limits count these.
    pub fn non_empty_pending_flush_count(&self) -> usize {
        self.non_empty_pending
    }

    /// Whether any flush is waiting.
    pub fn has_pending_flushes(&self) -> bool {
        !self.pending_flushes.is_empty()
    }

    /// Pending flushes, oldest first.
    pub fn pending_flushes(&self) -> impl Iterator<Item = &PendingFlush> {
        self.pending_flushes.iter()
    }

    /// The oldest pending flush.
    pub fn front_mut(&mut self) -> Option<&mut PendingFlush> {
        self.pending_flushes.front_mut()
    }

    /// Removes the oldest pending flush.
    pub fn pop_front(&mut self) -> Option<PendingFlush> {
        let flush = self.pending_flushes.pop_front()?;
        if flush.non_empty {
            self.non_empty_pending = self.non_empty_pending.saturating_sub(1);
        }
        Some(flush)
    }

    /// Resources the whole pending window newly needs.
    pub fn resources_needed_by_pending(&self) -> &[ResourceContentHash] {
        self.pending_flushes
            .back()
            .map(|p| p.resources.needed.as_slice())
            .unwrap_or(&[])
    }

    /// Earliest expiration among pending flushes.
    pub fn earliest_pending_expiration(&self) -> Option<Instant> {
        self.pending_flushes
            .iter()
            .filter_map(|p| p.time_info.expiration)
            .min()
    }

    /// Closes an applied window: folds its resource changes into the resources in
    /// use and queues its scene resource actions for execution.
    ///
    /// Returns the window's resource changes; the caller unreferences
    /// `unneeded` and `pending_unneeded` if the scene is mapped.
    pub fn complete_window(&mut self, last_applied: PendingFlush) -> ClientResourceChanges {
        consolidate_resources_in_use(
            &mut self.resources_in_use,
            &last_applied.resources.needed,
            &last_applied.resources.unneeded,
        );
        consolidate_scene_resource_actions(
            last_applied.scene_resource_actions,
            &mut self.scene_resource_actions,
        );
        last_applied.resources
    }

    /// Client resources referenced by the applied content.
    pub fn resources_in_use(&self) -> &BTreeSet<ResourceContentHash> {
        &self.resources_in_use
    }

    /// Takes resource payloads received since the last call.
    pub fn take_arrived_resource_data(&mut self) -> Vec<ResourceData> {
        std::mem::take(&mut self.arrived_resource_data)
    }

    /// Keeps payloads until the scene gets mapped, dropping those no longer used.
    pub fn stash_for_mapping(&mut self, data: Vec<ResourceData>) {
        for resource in data {
            self.resources_to_upload_once_mapping
                .insert(resource.hash, resource);
        }
        let needed = self.resources_needed_by_pending().to_vec();
        let in_use = &self.resources_in_use;
        self.resources_to_upload_once_mapping
            .retain(|hash, _| in_use.contains(hash) || needed.contains(hash));
    }

    /// Takes the payloads kept for mapping.
    pub fn take_resources_for_mapping(&mut self) -> Vec<ResourceData> {
        std::mem::take(&mut self.resources_to_upload_once_mapping)
            .into_values()
            .collect()
    }

    /// Number of payloads kept for mapping.
    pub fn resources_for_mapping_count(&self) -> usize {
        self.resources_to_upload_once_mapping.len()
    }

    /// Scene resource actions of applied flushes not yet executed.
    pub fn scene_resource_actions(&self) -> &[SceneResourceAction] {
        &self.scene_resource_actions
    }

    /// Queues scene resource actions for execution, consolidating with the queue.
    pub fn queue_scene_resource_actions(&mut self, actions: Vec<SceneResourceAction>) {
        consolidate_scene_resource_actions(actions, &mut self.scene_resource_actions);
    }

    /// Takes every queued scene resource action.
    pub fn take_scene_resource_actions(&mut self) -> Vec<SceneResourceAction> {
        std::mem::take(&mut self.scene_resource_actions)
    }

    /// Puts back actions that could not be executed this frame, ahead of newer ones.
    pub fn requeue_scene_resource_actions_front(&mut self, mut remaining: Vec<SceneResourceAction>) {
        let newer = std::mem::take(&mut self.scene_resource_actions);
        consolidate_scene_resource_actions(newer, &mut remaining);
        self.scene_resource_actions = remaining;
    }

    /// Drops queued scene resource actions, e.g. when the scene is unmapped.
    pub fn clear_scene_resource_actions(&mut self) {
        self.scene_resource_actions.clear();
    }

    /// Version tag of the most recently applied flush.
    pub fn last_applied_version_tag(&self) -> Option<SceneVersionTag> {
        self.last_applied_version_tag
    }

    /// Records the version tag of an applied flush.
    pub fn set_last_applied_version_tag(&mut self, tag: SceneVersionTag) {
        self.last_applied_version_tag = Some(tag);
    }
}
