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

//! Client resources and scene resources of one display.

use super::EmbeddedCompositingManager;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tessera_core::renderer::{
    AsyncUploadBackend, DeviceResourceHandle, GraphicsDevice, StreamSourceId,
};
use tessera_core::resource::{ResourceContentHash, ResourceData, ResourceStatus};
use tessera_core::scene::{SceneId, SceneResourceAction, SceneResourceDesc, SceneResourceHandle};
use tessera_core::{FrameSection, FrameTimer};
use tessera_data::resources::ResourceRegistry;
use tessera_lanes::upload_lane::{ResourceUploadLane, UploadPassReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SceneResourceBacking {
    Device(DeviceResourceHandle),
    Stream {
        source: StreamSourceId,
        texture: DeviceResourceHandle,
    },
}

impl SceneResourceBacking {
    fn handle(self) -> DeviceResourceHandle {
        match self {
            SceneResourceBacking::Device(handle) => handle,
            SceneResourceBacking::Stream { texture, .. } => texture,
        }
    }
}

/// Owns the device and upload backend of a display and everything uploaded to them.
///
/// Client resources are shared by content hash across scenes and uploaded at
/// most once. A resource whose last reference goes away is unloaded by the
/// next [`upload_and_unload_pending_resources`](Self::upload_and_unload_pending_resources),
/// so a re-reference within the same frame costs nothing.
#[derive(Debug)]
pub struct ResourceManager {
    device: Arc<dyn GraphicsDevice>,
    upload_backend: Box<dyn AsyncUploadBackend>,
    registry: ResourceRegistry,
    lane: ResourceUploadLane,
    scene_resources: BTreeMap<(SceneId, SceneResourceHandle), SceneResourceBacking>,
}

impl ResourceManager {
    /// Creates a manager keeping up to `cache_size_bytes` of unreferenced uploads.
    pub fn new(
        device: Arc<dyn GraphicsDevice>,
        upload_backend: Box<dyn AsyncUploadBackend>,
        cache_size_bytes: u64,
    ) -> Self {
        Self {
            device,
            upload_backend,
            registry: ResourceRegistry::new(),
            lane: ResourceUploadLane::new(cache_size_bytes),
            scene_resources: BTreeMap::new(),
        }
    }

    /// The display's device.
    pub fn device(&self) -> &Arc<dyn GraphicsDevice> {
        &self.device
    }

    /// The resource status table.
    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// Status of a client resource.
    pub fn resource_status(&self, hash: &ResourceContentHash) -> ResourceStatus {
        self.registry.status(hash)
    }

    /// Number of scenes referencing a client resource.
    pub fn ref_count(&self, hash: &ResourceContentHash) -> usize {
        self.registry.ref_count(hash)
    }

    /// Device object of an uploaded client resource.
    pub fn device_handle(&self, hash: &ResourceContentHash) -> Option<DeviceResourceHandle> {
        self.registry.entry(hash).and_then(|entry| entry.device_handle)
    }

    /// Adds `scene` to the users of each resource.
    pub fn reference_resources_for_scene(&mut self, scene: SceneId, hashes: &[ResourceContentHash]) {
        for hash in hashes {
            if self.registry.add_ref(*hash, scene) {
                log::trace!("ResourceManager: {scene} references {hash}");
            }
        }
    }

    /// Removes `scene` from the users of each resource.
    pub fn unreference_resources_for_scene(&mut self, scene: SceneId, hashes: &[ResourceContentHash]) {
        for hash in hashes {
            if self.registry.remove_ref(*hash, scene) {
                log::trace!("ResourceManager: {hash} no longer referenced");
            }
        }
    }

    /// Drops every client resource reference held by `scene`.
    pub fn unreference_all_resources_for_scene(&mut self, scene: SceneId) {
        let released = self.registry.remove_scene(scene);
        log::debug!(
            "ResourceManager: {scene} released, {} resources left unreferenced",
            released.len()
        );
    }

    /// Hands over the payload of a resource. Returns `false` if nobody waits for it.
    pub fn provide_resource_data(&mut self, data: ResourceData) -> bool {
        self.registry.provide_data(data)
    }

    /// Upload priority of the resources referenced by `scene`.
    pub fn set_scene_priority(&mut self, scene: SceneId, priority: i32) {
        self.registry.set_scene_priority(scene, priority);
    }

    /// The resources among `hashes` that are not uploaded.
    pub fn missing_resources<'a>(
        &self,
        hashes: impl IntoIterator<Item = &'a ResourceContentHash>,
    ) -> Vec<ResourceContentHash> {
        hashes
            .into_iter()
            .filter(|hash| !self.registry.status(hash).is_uploaded())
            .copied()
            .collect()
    }

    /// Uploads submitted to the asynchronous backend and not completed yet.
    pub fn uploads_in_flight(&self) -> usize {
        self.upload_backend.in_flight()
    }

    /// Bytes held by the VRAM cache.
    pub fn cached_bytes(&self) -> u64 {
        self.registry.cached_bytes()
    }

    /// Runs one upload/unload pass.
    ///
    /// Resources only used by scenes for which `is_budgeted` returns `false`
    /// ignore the upload budget.
    pub fn upload_and_unload_pending_resources(
        &mut self,
        timer: &FrameTimer,
        is_budgeted: &dyn Fn(SceneId) -> bool,
    ) -> UploadPassReport {
        let report = self.lane.run(
            &mut self.registry,
            self.device.as_ref(),
            self.upload_backend.as_mut(),
            timer,
            is_budgeted,
        );
        if !report.uploaded.is_empty() || report.unloaded > 0 {
            log::debug!(
                "ResourceManager: {} uploaded, {} scheduled, {} unloaded",
                report.uploaded.len(),
                report.scheduled.len(),
                report.unloaded
            );
        }
        report
    }

    /// Executes scene resource actions of `scene` in order.
    ///
    /// When `budgeted`, execution stops once the scene resource budget is
    /// exceeded; the actions not executed are returned.
    pub fn execute_scene_resource_actions(
        &mut self,
        scene: SceneId,
        actions: Vec<SceneResourceAction>,
        compositing: &mut EmbeddedCompositingManager,
        timer: &FrameTimer,
        budgeted: bool,
    ) -> Vec<SceneResourceAction> {
        let mut actions = actions.into_iter();
        let mut executed = 0usize;
        while let Some(action) = actions.next() {
            if executed > 0
                && budgeted
                && timer.is_time_budget_exceeded(FrameSection::SceneResourcesUpload)
            {
                let mut remaining = vec![action];
                remaining.extend(actions);
                log::debug!(
                    "ResourceManager: {scene} scene resource budget exceeded, {} actions deferred",
                    remaining.len()
                );
                return remaining;
            }
            self.execute_scene_resource_action(scene, action, compositing);
            executed += 1;
        }
        Vec::new()
    }

    fn execute_scene_resource_action(
        &mut self,
        scene: SceneId,
        action: SceneResourceAction,
        compositing: &mut EmbeddedCompositingManager,
    ) {
        match action {
            SceneResourceAction::Create { handle, desc } => {
                if self.scene_resources.contains_key(&(scene, handle)) {
                    log::warn!("ResourceManager: {scene} {handle:?} already exists");
                    return;
                }
                let backing = match desc {
                    SceneResourceDesc::StreamTexture { source } => compositing
                        .ref_stream(source, self.device.as_ref())
                        .map(|texture| SceneResourceBacking::Stream { source, texture }),
                    other => self
                        .device
                        .create_scene_resource(&other)
                        .map(SceneResourceBacking::Device),
                };
                match backing {
                    Ok(backing) => {
                        self.scene_resources.insert((scene, handle), backing);
                    }
                    Err(e) => log::error!("ResourceManager: {scene} failed to create {handle:?}: {e}"),
                }
            }
            SceneResourceAction::Update { handle, data } => {
                match self.scene_resources.get(&(scene, handle)) {
                    Some(SceneResourceBacking::Device(device_handle)) => {
                        if let Err(e) = self.device.write_resource(*device_handle, &data) {
                            log::error!("ResourceManager: {scene} failed to update {handle:?}: {e}");
                        }
                    }
                    Some(SceneResourceBacking::Stream { source, .. }) => {
                        log::warn!("ResourceManager: {scene} {handle:?} is fed by {source}, update ignored");
                    }
                    None => log::warn!("ResourceManager: {scene} updates unknown {handle:?}"),
                }
            }
            SceneResourceAction::Destroy { handle } => {
                match self.scene_resources.remove(&(scene, handle)) {
                    Some(backing) => self.release_scene_resource(scene, backing, compositing),
                    None => log::warn!("ResourceManager: {scene} destroys unknown {handle:?}"),
                }
            }
        }
    }

    fn release_scene_resource(
        &self,
        scene: SceneId,
        backing: SceneResourceBacking,
        compositing: &mut EmbeddedCompositingManager,
    ) {
        match backing {
            SceneResourceBacking::Device(handle) => {
                if let Err(e) = self.device.unload_resource(handle) {
                    log::error!("ResourceManager: {scene} failed to release {handle}: {e}");
                }
            }
            SceneResourceBacking::Stream { source, .. } => {
                compositing.unref_stream(source, self.device.as_ref());
            }
        }
    }

    /// Device object backing a scene resource.
    pub fn scene_resource(
        &self,
        scene: SceneId,
        handle: SceneResourceHandle,
    ) -> Option<DeviceResourceHandle> {
        self.scene_resources
            .get(&(scene, handle))
            .map(|backing| backing.handle())
    }

    /// Number of scene resources alive for `scene`.
    pub fn scene_resource_count(&self, scene: SceneId) -> usize {
        self.scene_resources
            .keys()
            .filter(|(owner, _)| *owner == scene)
            .count()
    }

    /// Scenes with a stream texture fed by `source`.
    pub fn scenes_using_stream(&self, source: StreamSourceId) -> BTreeSet<SceneId> {
        self.scene_resources
            .iter()
            .filter(|(_, backing)| {
                matches!(backing, SceneResourceBacking::Stream { source: s, .. } if *s == source)
            })
            .map(|((scene, _), _)| *scene)
            .collect()
    }

    /// Releases every scene resource of `scene`.
    pub fn unload_all_scene_resources_for_scene(
        &mut self,
        scene: SceneId,
        compositing: &mut EmbeddedCompositingManager,
    ) {
        let owned: Vec<_> = self
            .scene_resources
            .keys()
            .filter(|(owner, _)| *owner == scene)
            .copied()
            .collect();
        for key in owned {
            if let Some(backing) = self.scene_resources.remove(&key) {
                self.release_scene_resource(scene, backing, compositing);
            }
        }
    }

    /// Releases everything on the device, e.g. when the display goes away.
    pub fn release_all(&mut self, compositing: &mut EmbeddedCompositingManager) {
        for ((scene, _), backing) in std::mem::take(&mut self.scene_resources) {
            self.release_scene_resource(scene, backing, compositing);
        }
        for handle in self.registry.drain_device_handles() {
            if let Err(e) = self.device.unload_resource(handle) {
                log::error!("ResourceManager: failed to unload {handle}: {e}");
            }
        }
    }
}

/// Renders a bounded sample of missing resources, e.g. `"a, b +3 more"`.
pub fn format_missing_resources(missing: &[ResourceContentHash], limit: usize) -> String {
    let mut text = missing
        .iter()
        .take(limit)
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    if missing.len() > limit {
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(&format!("+{} more", missing.len() - limit));
    }
    text
}
