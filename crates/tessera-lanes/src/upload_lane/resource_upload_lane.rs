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

//! The per-frame client resource upload and unload pass.

use tessera_core::renderer::{AsyncUploadBackend, DeviceResourceHandle, GraphicsDevice};
use tessera_core::resource::ResourceContentHash;
use tessera_core::scene::SceneId;
use tessera_core::{FrameSection, FrameTimer};
use tessera_data::resources::ResourceRegistry;

/// Outcome of one pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UploadPassReport {
    /// Resources that became `Uploaded`.
    pub uploaded: Vec<ResourceContentHash>,
    /// Resources handed to the asynchronous backend.
    pub scheduled: Vec<ResourceContentHash>,
    /// Resources whose upload failed.
    pub broken: Vec<ResourceContentHash>,
    /// Device objects released.
    pub unloaded: usize,
    /// Provided resources left for the next frame because the budget ran out.
    pub deferred: usize,
}

/// Runs uploads and unloads against a device, bounded by the
/// `ResourcesUpload` frame section.
#[derive(Debug, Clone)]
pub struct ResourceUploadLane {
    cache_size_bytes: u64,
}

impl ResourceUploadLane {
    /// Creates a lane keeping up to `cache_size_bytes` of unreferenced uploads.
    pub fn new(cache_size_bytes: u64) -> Self {
        Self { cache_size_bytes }
    }

    /// Executes one pass.
    ///
    /// `is_budgeted` tells whether a scene's work counts against the frame
    /// budget; a resource used by any unbudgeted scene is never deferred. At
    /// least one upload happens per pass.
    pub fn run(
        &self,
        registry: &mut ResourceRegistry,
        device: &dyn GraphicsDevice,
        backend: &mut dyn AsyncUploadBackend,
        timer: &FrameTimer,
        is_budgeted: &dyn Fn(SceneId) -> bool,
    ) -> UploadPassReport {
        let mut report = UploadPassReport::default();

        // 1. Completions from the upload thread.
        for completion in backend.poll_completed() {
            match completion.result {
                Ok(handle) => {
                    if registry.set_uploaded(completion.hash, handle) {
                        report.uploaded.push(completion.hash);
                    } else {
                        log::debug!(
                            "ResourceUploadLane: {} no longer referenced, releasing its upload",
                            completion.hash
                        );
                        release(device, handle, &mut report);
                    }
                }
                Err(error) => {
                    log::error!("ResourceUploadLane: upload of {} failed: {error}", completion.hash);
                    registry.set_broken(completion.hash);
                    report.broken.push(completion.hash);
                }
            }
        }

        // 2. Unloads, keeping what fits in the cache.
        for (hash, handle) in registry.collect_unloads(self.cache_size_bytes) {
            log::trace!("ResourceUploadLane: unloading {hash}");
            release(device, handle, &mut report);
        }

        // 3. Uploads in priority order.
        let uploads = registry.uploads_by_priority();
        let total = uploads.len();
        for (done, hash) in uploads.into_iter().enumerate() {
            let budgeted = registry
                .entry(&hash)
                .is_some_and(|entry| entry.scene_usage.iter().all(|scene| is_budgeted(*scene)));
            if done > 0 && budgeted && timer.is_time_budget_exceeded(FrameSection::ResourcesUpload) {
                report.deferred = total - done;
                log::debug!(
                    "ResourceUploadLane: budget exceeded, {} uploads deferred",
                    report.deferred
                );
                break;
            }
            let Some(data) = registry.data(&hash).cloned() else {
                continue;
            };

            if data.kind.uploads_asynchronously() {
                match backend.submit(data) {
                    Ok(()) => {
                        registry.mark_scheduled(hash);
                        report.scheduled.push(hash);
                    }
                    Err(error) => {
                        log::error!("ResourceUploadLane: cannot schedule {hash}: {error}");
                        registry.set_broken(hash);
                        report.broken.push(hash);
                    }
                }
                continue;
            }

            match device.upload_resource(&data) {
                Ok(handle) => {
                    registry.set_uploaded(hash, handle);
                    report.uploaded.push(hash);
                }
                Err(error) => {
                    log::error!("ResourceUploadLane: upload of {hash} failed: {error}");
                    registry.set_broken(hash);
                    report.broken.push(hash);
                }
            }
        }

        report
    }
}

fn release(
    device: &dyn GraphicsDevice,
    handle: DeviceResourceHandle,
    report: &mut UploadPassReport,
) {
    match device.unload_resource(handle) {
        Ok(()) => report.unloaded += 1,
        Err(error) => log::error!("ResourceUploadLane: failed to unload {handle}: {error}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tessera_core::renderer::{
        DeviceError, RenderContext, TextureDesc, UploadCompletion, UploadError,
    };
    use tessera_core::resource::{ResourceData, ResourceKind, ResourceStatus};
    use tessera_core::scene::SceneResourceDesc;

    #[derive(Debug, Default)]
    struct NullContext(AtomicBool);

    impl RenderContext for NullContext {
        fn enable(&self) -> Result<(), DeviceError> {
            self.0.store(true, Ordering::SeqCst);
            Ok(())
        }
        fn disable(&self) -> Result<(), DeviceError> {
            self.0.store(false, Ordering::SeqCst);
            Ok(())
        }
        fn is_enabled(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[derive(Debug, Default)]
    struct CountingDevice {
        context: NullContext,
        next: AtomicU64,
        live: Mutex<Vec<DeviceResourceHandle>>,
        reject_empty: bool,
    }

    impl GraphicsDevice for CountingDevice {
        fn context(&self) -> &dyn RenderContext {
            &self.context
        }
        fn upload_resource(&self, resource: &ResourceData) -> Result<DeviceResourceHandle, UploadError> {
            if self.reject_empty && resource.data.is_empty() {
                return Err(UploadError::InvalidContent {
                    hash: resource.hash,
                    details: "empty".into(),
                });
            }
            let handle = DeviceResourceHandle(self.next.fetch_add(1, Ordering::SeqCst) + 1);
            self.live.lock().expect("lock").push(handle);
            Ok(handle)
        }
        fn unload_resource(&self, handle: DeviceResourceHandle) -> Result<(), DeviceError> {
            let mut live = self.live.lock().expect("lock");
            let pos = live
                .iter()
                .position(|h| *h == handle)
                .ok_or(DeviceError::InvalidHandle(handle))?;
            live.remove(pos);
            Ok(())
        }
        fn create_texture(&self, _: &TextureDesc, _: Option<&[u8]>) -> Result<DeviceResourceHandle, DeviceError> {
            Err(DeviceError::ContextUnavailable {
                reason: "not needed".into(),
            })
        }
        fn write_resource(&self, handle: DeviceResourceHandle, _: &[u8]) -> Result<(), DeviceError> {
            Err(DeviceError::InvalidHandle(handle))
        }
        fn create_scene_resource(&self, _: &SceneResourceDesc) -> Result<DeviceResourceHandle, DeviceError> {
            Err(DeviceError::ContextUnavailable {
                reason: "not needed".into(),
            })
        }
        fn resident_object_count(&self) -> usize {
            self.live.lock().expect("lock").len()
        }
    }

    /// Completes every submission on the next poll with a fixed handle base.
    #[derive(Debug, Default)]
    struct ImmediateBackend {
        submitted: Vec<ResourceContentHash>,
    }

    impl AsyncUploadBackend for ImmediateBackend {
        fn submit(&mut self, resource: ResourceData) -> Result<(), UploadError> {
            self.submitted.push(resource.hash);
            Ok(())
        }
        fn poll_completed(&mut self) -> Vec<UploadCompletion> {
            self.submitted
                .drain(..)
                .enumerate()
                .map(|(i, hash)| UploadCompletion {
                    hash,
                    result: Ok(DeviceResourceHandle(1000 + i as u64)),
                })
                .collect()
        }
        fn in_flight(&self) -> usize {
            self.submitted.len()
        }
    }

    const A: SceneId = SceneId(1);

    fn always(_: SceneId) -> bool {
        true
    }

    #[test]
    fn buffers_upload_synchronously_shaders_go_to_the_backend() {
        let device = CountingDevice::default();
        let mut backend = ImmediateBackend::default();
        let mut registry = ResourceRegistry::new();
        let buffer = ResourceData::new(ResourceKind::Buffer, vec![1u8; 4]);
        let shader = ResourceData::new(ResourceKind::Shader, b"main".to_vec());
        for data in [&buffer, &shader] {
            registry.add_ref(data.hash, A);
            registry.provide_data(data.clone());
        }

        let lane = ResourceUploadLane::new(0);
        let report = lane.run(&mut registry, &device, &mut backend, &FrameTimer::new(), &always);
        assert_eq!(report.uploaded, vec![buffer.hash]);
        assert_eq!(report.scheduled, vec![shader.hash]);
        assert_eq!(
            registry.status(&shader.hash),
            ResourceStatus::Pending(tessera_core::resource::PendingStage::ScheduledForUpload)
        );

        let report = lane.run(&mut registry, &device, &mut backend, &FrameTimer::new(), &always);
        assert_eq!(report.uploaded, vec![shader.hash]);
        assert_eq!(registry.status(&shader.hash), ResourceStatus::Uploaded);
    }

    #[test]
    fn failed_upload_marks_resource_broken_without_retry() {
        let device = CountingDevice {
            reject_empty: true,
            ..Default::default()
        };
        let mut backend = ImmediateBackend::default();
        let mut registry = ResourceRegistry::new();
        let empty = ResourceData::new(ResourceKind::Texture, Vec::new());
        registry.add_ref(empty.hash, A);
        registry.provide_data(empty.clone());

        let lane = ResourceUploadLane::new(0);
        let report = lane.run(&mut registry, &device, &mut backend, &FrameTimer::new(), &always);
        assert_eq!(report.broken, vec![empty.hash]);
        let report = lane.run(&mut registry, &device, &mut backend, &FrameTimer::new(), &always);
        assert!(report.broken.is_empty() && report.uploaded.is_empty());
        assert_eq!(registry.status(&empty.hash), ResourceStatus::Broken);
    }

    #[test]
    fn exhausted_budget_defers_all_but_one_upload() {
        let device = CountingDevice::default();
        let mut backend = ImmediateBackend::default();
        let mut registry = ResourceRegistry::new();
        for byte in 0..3u8 {
            let data = ResourceData::new(ResourceKind::Buffer, vec![byte]);
            registry.add_ref(data.hash, A);
            registry.provide_data(data);
        }
        let mut timer = FrameTimer::new();
        timer.set_section_budget(FrameSection::ResourcesUpload, Duration::ZERO);
        std::thread::sleep(Duration::from_millis(1));

        let lane = ResourceUploadLane::new(0);
        let report = lane.run(&mut registry, &device, &mut backend, &timer, &always);
        assert_eq!(report.uploaded.len(), 1);
        assert_eq!(report.deferred, 2);

        // Local scenes are never deferred.
        let report = lane.run(&mut registry, &device, &mut backend, &timer, &|_| false);
        assert_eq!(report.uploaded.len(), 2);
    }

    #[test]
    fn unreferenced_uploads_are_released_on_the_next_pass() {
        let device = CountingDevice::default();
        let mut backend = ImmediateBackend::default();
        let mut registry = ResourceRegistry::new();
        let data = ResourceData::new(ResourceKind::Buffer, vec![5u8; 8]);
        registry.add_ref(data.hash, A);
        registry.provide_data(data.clone());

        let lane = ResourceUploadLane::new(0);
        lane.run(&mut registry, &device, &mut backend, &FrameTimer::new(), &always);
        assert_eq!(device.resident_object_count(), 1);

        registry.remove_ref(data.hash, A);
        assert_eq!(device.resident_object_count(), 1);
        let report = lane.run(&mut registry, &device, &mut backend, &FrameTimer::new(), &always);
        assert_eq!(report.unloaded, 1);
        assert_eq!(device.resident_object_count(), 0);
    }

    #[test]
    fn completion_for_a_dropped_shader_is_released_immediately() {
        let device = CountingDevice::default();
        let mut backend = ImmediateBackend::default();
        let mut registry = ResourceRegistry::new();
        let shader = ResourceData::new(ResourceKind::Shader, b"frag".to_vec());
        registry.add_ref(shader.hash, A);
        registry.provide_data(shader.clone());

        let lane = ResourceUploadLane::new(0);
        lane.run(&mut registry, &device, &mut backend, &FrameTimer::new(), &always);
        registry.remove_ref(shader.hash, A);
        // The backend handle lives outside the counting device.
        device.live.lock().expect("lock").push(DeviceResourceHandle(1000));

        let report = lane.run(&mut registry, &device, &mut backend, &FrameTimer::new(), &always);
        assert!(report.uploaded.is_empty());
        assert_eq!(report.unloaded, 1);
        assert!(registry.is_empty());
    }
}
