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

use std::cmp::Reverse;
use ahash::AHashMap;
use std::collections::{BTreeSet, VecDeque};
use tessera_core::renderer::DeviceResourceHandle;
use tessera_core::resource::{
    PendingStage, ResourceContentHash, ResourceData, ResourceKind, ResourceStatus,
};
use tessera_core::scene::SceneId;

/// Book-keeping of one client resource.
#[derive(Debug, Clone)]
pub struct ResourceEntry {
    /// Current status.
    pub status: ResourceStatus,
    /// Category, known once data was provided.
    pub kind: Option<ResourceKind>,
    /// Payload, held until the upload completes.
    pub data: Option<ResourceData>,
    /// Device object, once uploaded.
    pub device_handle: Option<DeviceResourceHandle>,
    /// Scenes referencing the resource.
    pub scene_usage: BTreeSet<SceneId>,
    /// Payload size.
    pub byte_size: u64,
    /// Whether the asynchronous backend is working on it.
    pub upload_in_flight: bool,
}

impl Default for ResourceEntry {
    fn default() -> Self {
        Self {
            status: ResourceStatus::Unreferenced,
            kind: None,
            data: None,
            device_handle: None,
            scene_usage: BTreeSet::new(),
            byte_size: 0,
            upload_in_flight: false,
        }
    }
}

impl ResourceEntry {
    /// Number of scenes referencing the resource.
    pub fn ref_count(&self) -> usize {
        self.scene_usage.len()
    }
}

/// Status table of every client resource known to one display.
///
/// The registry never touches a device; it tells its owner what to upload and
/// what to unload.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    entries: AHashMap<ResourceContentHash, ResourceEntry>,
    scene_resources: AHashMap<SceneId, BTreeSet<ResourceContentHash>>,
    scene_priorities: AHashMap<SceneId, i32>,
    provided: Vec<ResourceContentHash>,
    unused: VecDeque<ResourceContentHash>,
}

impl ResourceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Status of a resource. Unknown resources are `Unreferenced`.
    pub fn status(&self, hash: &ResourceContentHash) -> ResourceStatus {
        self.entries
            .get(hash)
            .map(|entry| entry.status)
            .unwrap_or(ResourceStatus::Unreferenced)
    }

    /// The entry of a resource.
    pub fn entry(&self, hash: &ResourceContentHash) -> Option<&ResourceEntry> {
        self.entries.get(hash)
    }

    /// Number of scenes referencing a resource.
    pub fn ref_count(&self, hash: &ResourceContentHash) -> usize {
        self.entries.get(hash).map_or(0, ResourceEntry::ref_count)
    }

    /// Number of known entries, cached ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry knows no resource.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resources referenced by a scene.
    pub fn scene_resources(&self, scene: SceneId) -> impl Iterator<Item = &ResourceContentHash> {
        self.scene_resources.get(&scene).into_iter().flatten()
    }

    /// Adds `scene` to the users of a resource. Referencing twice is a no-op.
    ///
    /// Returns whether the reference is new.
    pub fn add_ref(&mut self, hash: ResourceContentHash, scene: SceneId) -> bool {
        let entry = self.entries.entry(hash).or_default();
        if !entry.scene_usage.insert(scene) {
            return false;
        }
        self.scene_resources.entry(scene).or_default().insert(hash);

        if entry.status == ResourceStatus::Unreferenced {
            entry.status = if entry.device_handle.is_some() {
                ResourceStatus::Uploaded
            } else if entry.upload_in_flight {
                ResourceStatus::Pending(PendingStage::ScheduledForUpload)
            } else if entry.data.is_some() {
                self.provided.push(hash);
                ResourceStatus::Pending(PendingStage::Provided)
            } else {
                ResourceStatus::Pending(PendingStage::AwaitingData)
            };
            self.unused.retain(|h| *h != hash);
        }
        true
    }

    /// Removes `scene` from the users of a resource.
    ///
    /// Returns whether nobody references the resource anymore. Such resources
    /// are handled by the next [`collect_unloads`](Self::collect_unloads).
    pub fn remove_ref(&mut self, hash: ResourceContentHash, scene: SceneId) -> bool {
        let Some(entry) = self.entries.get_mut(&hash) else {
            return false;
        };
        if !entry.scene_usage.remove(&scene) {
            return false;
        }
        if let Some(resources) = self.scene_resources.get_mut(&scene) {
            resources.remove(&hash);
            if resources.is_empty() {
                self.scene_resources.remove(&scene);
            }
        }
        if !entry.scene_usage.is_empty() {
            return false;
        }
        entry.status = ResourceStatus::Unreferenced;
        self.provided.retain(|h| *h != hash);
        self.unused.push_back(hash);
        true
    }

    /// Drops every reference held by `scene`. Returns the resources left unreferenced.
    pub fn remove_scene(&mut self, scene: SceneId) -> Vec<ResourceContentHash> {
        self.scene_priorities.remove(&scene);
        let hashes: Vec<_> = self
            .scene_resources
            .get(&scene)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        hashes
            .into_iter()
            .filter(|hash| self.remove_ref(*hash, scene))
            .collect()
    }

    /// Stores the payload of a resource waiting for it.
    ///
    /// Returns `false` when nobody waits for this payload.
    pub fn provide_data(&mut self, data: ResourceData) -> bool {
        let hash = data.hash;
        let Some(entry) = self.entries.get_mut(&hash) else {
            return false;
        };
        if entry.status != ResourceStatus::Pending(PendingStage::AwaitingData) {
            return false;
        }
        entry.kind = Some(data.kind);
        entry.byte_size = data.byte_size();
        entry.data = Some(data);
        entry.status = ResourceStatus::Pending(PendingStage::Provided);
        self.provided.push(hash);
        true
    }

    /// Payload of a resource, while held.
    pub fn data(&self, hash: &ResourceContentHash) -> Option<&ResourceData> {
        self.entries.get(hash).and_then(|e| e.data.as_ref())
    }

    /// Sets the upload priority of a scene's resources. Higher goes first.
    pub fn set_scene_priority(&mut self, scene: SceneId, priority: i32) {
        self.scene_priorities.insert(scene, priority);
    }

    fn priority_of(&self, hash: &ResourceContentHash) -> i32 {
        self.entries
            .get(hash)
            .and_then(|entry| {
                entry
                    .scene_usage
                    .iter()
                    .map(|scene| self.scene_priorities.get(scene).copied().unwrap_or(0))
                    .max()
            })
            .unwrap_or(0)
    }

    /// Provided resources in upload order: highest referencing scene priority
    /// first, then provision order.
    pub fn uploads_by_priority(&self) -> Vec<ResourceContentHash> {
        let mut uploads = self.provided.clone();
        uploads.sort_by_cached_key(|hash| Reverse(self.priority_of(hash)));
        uploads
    }

    /// Records that a resource was handed to the asynchronous backend.
    pub fn mark_scheduled(&mut self, hash: ResourceContentHash) {
        self.provided.retain(|h| *h != hash);
        if let Some(entry) = self.entries.get_mut(&hash) {
            entry.upload_in_flight = true;
            entry.data = None;
            entry.status = ResourceStatus::Pending(PendingStage::ScheduledForUpload);
        }
    }

    /// Records a successful upload.
    ///
    /// Returns `false` if the resource got unreferenced meanwhile; its device
    /// object has to be released right away and the entry is gone.
    pub fn set_uploaded(&mut self, hash: ResourceContentHash, handle: DeviceResourceHandle) -> bool {
        self.provided.retain(|h| *h != hash);
        let Some(entry) = self.entries.get_mut(&hash) else {
            return false;
        };
        entry.upload_in_flight = false;
        entry.data = None;
        if entry.scene_usage.is_empty() {
            self.entries.remove(&hash);
            return false;
        }
        entry.device_handle = Some(handle);
        entry.status = ResourceStatus::Uploaded;
        true
    }

    /// Records a failed upload. The resource stays `Broken` while referenced.
    pub fn set_broken(&mut self, hash: ResourceContentHash) {
        self.provided.retain(|h| *h != hash);
        let Some(entry) = self.entries.get_mut(&hash) else {
            return;
        };
        entry.upload_in_flight = false;
        entry.data = None;
        if entry.scene_usage.is_empty() {
            self.entries.remove(&hash);
        } else {
            entry.status = ResourceStatus::Broken;
        }
    }

    /// Forgets unreferenced resources, keeping uploaded ones cached up to
    /// `cache_size_bytes`, oldest evicted first.
    ///
    /// Returns the device objects to unload.
    pub fn collect_unloads(
        &mut self,
        cache_size_bytes: u64,
    ) -> Vec<(ResourceContentHash, DeviceResourceHandle)> {
        let mut cached = VecDeque::new();
        let mut cached_bytes = 0u64;
        for hash in self.unused.drain(..) {
            let Some(entry) = self.entries.get(&hash) else {
                continue;
            };
            if !entry.scene_usage.is_empty() || cached.contains(&hash) {
                continue;
            }
            match entry.device_handle {
                Some(_) => {
                    cached_bytes += entry.byte_size;
                    cached.push_back(hash);
                }
                // Completion decides its fate.
                None if entry.upload_in_flight => {}
                None => {
                    self.entries.remove(&hash);
                }
            }
        }

        let mut unloads = Vec::new();
        while cached_bytes > cache_size_bytes {
            let Some(hash) = cached.pop_front() else {
                break;
            };
            if let Some(entry) = self.entries.remove(&hash) {
                cached_bytes = cached_bytes.saturating_sub(entry.byte_size);
                if let Some(handle) = entry.device_handle {
                    unloads.push((hash, handle));
                }
            }
        }
        self.unused = cached;
        unloads
    }

    /// Bytes held by unreferenced, uploaded resources.
    pub fn cached_bytes(&self) -> u64 {
        self.unused
            .iter()
            .filter_map(|hash| self.entries.get(hash))
            .filter(|entry| entry.scene_usage.is_empty() && entry.device_handle.is_some())
            .map(|entry| entry.byte_size)
            .sum()
    }

    /// Takes every device object out of the registry, e.g. when the display goes away.
    pub fn drain_device_handles(&mut self) -> Vec<DeviceResourceHandle> {
        self.provided.clear();
        self.unused.clear();
        self.scene_resources.clear();
        self.entries
            .drain()
            .filter_map(|(_, entry)| entry.device_handle)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: SceneId = SceneId(1);
    const B: SceneId = SceneId(2);

    fn buffer(byte: u8, len: usize) -> ResourceData {
        ResourceData::new(ResourceKind::Buffer, vec![byte; len])
    }

    #[test]
    fn referenced_resource_waits_for_data_then_for_upload() {
        let mut registry = ResourceRegistry::new();
        let data = buffer(1, 4);
        assert!(registry.add_ref(data.hash, A));
        assert_eq!(
            registry.status(&data.hash),
            ResourceStatus::Pending(PendingStage::AwaitingData)
        );

        assert!(registry.provide_data(data.clone()));
        assert_eq!(registry.uploads_by_priority(), vec![data.hash]);

        assert!(registry.set_uploaded(data.hash, DeviceResourceHandle(7)));
        assert_eq!(registry.status(&data.hash), ResourceStatus::Uploaded);
        assert!(registry.data(&data.hash).is_none());
        assert!(registry.uploads_by_priority().is_empty());
    }

    #[test]
    fn data_for_unreferenced_resources_is_refused() {
        let mut registry = ResourceRegistry::new();
        assert!(!registry.provide_data(buffer(1, 4)));
        assert!(registry.is_empty());
    }

    #[test]
    fn reference_count_is_per_scene() {
        let mut registry = ResourceRegistry::new();
        let hash = buffer(1, 4).hash;
        assert!(registry.add_ref(hash, A));
        assert!(!registry.add_ref(hash, A));
        assert!(registry.add_ref(hash, B));
        assert_eq!(registry.ref_count(&hash), 2);

        assert!(!registry.remove_ref(hash, A));
        assert!(!registry.remove_ref(hash, A));
        assert!(registry.remove_ref(hash, B));
        assert_eq!(registry.status(&hash), ResourceStatus::Unreferenced);
    }

    #[test]
    fn removing_a_scene_releases_only_what_it_alone_used() {
        let mut registry = ResourceRegistry::new();
        let hashes: Vec<_> = (0..64u8).map(|i| buffer(i, 8).hash).collect();
        for (i, hash) in hashes.iter().enumerate() {
            registry.add_ref(*hash, A);
            if i % 2 == 0 {
                registry.add_ref(*hash, B);
            }
        }
        assert_eq!(registry.len(), 64);

        let mut released = registry.remove_scene(A);
        released.sort();
        let mut expected: Vec<_> = hashes.iter().skip(1).step_by(2).copied().collect();
        expected.sort();
        assert_eq!(released, expected);
        assert!(hashes
            .iter()
            .step_by(2)
            .all(|hash| registry.ref_count(hash) == 1));
        assert_eq!(registry.scene_resources(A).count(), 0);
    }

    #[test]
    fn unreferenced_resources_unload_on_collection_not_before() {
        let mut registry = ResourceRegistry::new();
        let data = buffer(1, 4);
        registry.add_ref(data.hash, A);
        registry.provide_data(data.clone());
        registry.set_uploaded(data.hash, DeviceResourceHandle(3));

        registry.remove_ref(data.hash, A);
        // Re-referenced within the same frame: nothing to unload.
        registry.add_ref(data.hash, A);
        assert!(registry.collect_unloads(0).is_empty());
        assert_eq!(registry.status(&data.hash), ResourceStatus::Uploaded);

        registry.remove_ref(data.hash, A);
        assert_eq!(
            registry.collect_unloads(0),
            vec![(data.hash, DeviceResourceHandle(3))]
        );
        assert!(registry.entry(&data.hash).is_none());
    }

    #[test]
    fn cache_keeps_recent_resources_within_budget() {
        let mut registry = ResourceRegistry::new();
        let old = buffer(1, 8);
        let new = buffer(2, 8);
        for (data, handle) in [(&old, 1), (&new, 2)] {
            registry.add_ref(data.hash, A);
            registry.provide_data(data.clone());
            registry.set_uploaded(data.hash, DeviceResourceHandle(handle));
        }
        registry.remove_ref(old.hash, A);
        registry.remove_ref(new.hash, A);

        let unloads = registry.collect_unloads(8);
        assert_eq!(unloads, vec![(old.hash, DeviceResourceHandle(1))]);
        assert_eq!(registry.cached_bytes(), 8);

        // A cached resource comes back without another upload.
        registry.add_ref(new.hash, B);
        assert_eq!(registry.status(&new.hash), ResourceStatus::Uploaded);
        assert_eq!(registry.cached_bytes(), 0);
    }

    #[test]
    fn completion_after_unreference_asks_for_immediate_release() {
        let mut registry = ResourceRegistry::new();
        let shader = ResourceData::new(ResourceKind::Shader, b"void main() {}".to_vec());
        registry.add_ref(shader.hash, A);
        registry.provide_data(shader.clone());
        registry.mark_scheduled(shader.hash);
        registry.remove_ref(shader.hash, A);
        assert!(registry.collect_unloads(0).is_empty());

        assert!(!registry.set_uploaded(shader.hash, DeviceResourceHandle(9)));
        assert!(registry.is_empty());
    }

    #[test]
    fn broken_resources_stay_broken_while_referenced() {
        let mut registry = ResourceRegistry::new();
        let data = buffer(4, 2);
        registry.add_ref(data.hash, A);
        registry.provide_data(data.clone());
        registry.set_broken(data.hash);
        assert_eq!(registry.status(&data.hash), ResourceStatus::Broken);
        assert!(!registry.provide_data(data.clone()));
        assert!(registry.uploads_by_priority().is_empty());

        registry.remove_ref(data.hash, A);
        assert!(registry.collect_unloads(0).is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn uploads_follow_scene_priority() {
        let mut registry = ResourceRegistry::new();
        let low = buffer(1, 1);
        let high = buffer(2, 1);
        registry.add_ref(low.hash, A);
        registry.add_ref(high.hash, B);
        registry.provide_data(low.clone());
        registry.provide_data(high.clone());
        assert_eq!(registry.uploads_by_priority(), vec![low.hash, high.hash]);

        registry.set_scene_priority(B, 5);
        assert_eq!(registry.uploads_by_priority(), vec![high.hash, low.hash]);
    }

    #[test]
    fn removing_a_scene_releases_its_references_only() {
        let mut registry = ResourceRegistry::new();
        let shared = buffer(1, 1);
        let own = buffer(2, 1);
        registry.add_ref(shared.hash, A);
        registry.add_ref(shared.hash, B);
        registry.add_ref(own.hash, A);

        assert_eq!(registry.remove_scene(A), vec![own.hash]);
        assert_eq!(registry.ref_count(&shared.hash), 1);
        assert_eq!(registry.scene_resources(A).count(), 0);
    }
}
