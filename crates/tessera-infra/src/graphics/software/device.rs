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

//! Host-memory implementation of [`GraphicsDevice`].

use super::SoftwareContext;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tessera_core::renderer::{
    DeviceError, DeviceResourceHandle, GraphicsDevice, RenderContext, TextureDesc, UploadError,
};
use tessera_core::resource::{ResourceData, ResourceKind};
use tessera_core::scene::SceneResourceDesc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObjectKind {
    Shader,
    Buffer,
    Texture,
}

#[derive(Debug)]
struct DeviceObject {
    kind: ObjectKind,
    bytes: Vec<u8>,
    capacity: u64,
}

/// The object table shared by every context of one device.
///
/// Objects created through the upload context are visible to the main context
/// under the same handle, and either side may release them.
#[derive(Debug)]
pub struct ObjectNamespace {
    objects: Mutex<HashMap<DeviceResourceHandle, DeviceObject>>,
    next_id: AtomicU64,
    allocated_bytes: AtomicU64,
    memory_limit: Option<u64>,
}

impl ObjectNamespace {
    fn new(memory_limit: Option<u64>) -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            allocated_bytes: AtomicU64::new(0),
            memory_limit,
        }
    }

    fn objects(&self) -> MutexGuard<'_, HashMap<DeviceResourceHandle, DeviceObject>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn allocate(&self, kind: ObjectKind, bytes: Vec<u8>, capacity: u64) -> Result<DeviceResourceHandle, DeviceError> {
        let mut objects = self.objects();
        let allocated = self.allocated_bytes.load(Ordering::Relaxed);
        if let Some(limit) = self.memory_limit {
            if allocated.saturating_add(capacity) > limit {
                return Err(DeviceError::OutOfMemory { requested: capacity });
            }
        }
        let handle = DeviceResourceHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        objects.insert(
            handle,
            DeviceObject {
                kind,
                bytes,
                capacity,
            },
        );
        self.allocated_bytes.fetch_add(capacity, Ordering::Relaxed);
        Ok(handle)
    }

    /// Validates and stores a client resource.
    ///
    /// Shaders must be non-empty UTF-8 source; textures must carry texels.
    pub fn compile(&self, resource: &ResourceData) -> Result<DeviceResourceHandle, UploadError> {
        let kind = match resource.kind {
            ResourceKind::Shader => {
                if resource.data.is_empty() || std::str::from_utf8(&resource.data).is_err() {
                    return Err(UploadError::InvalidContent {
                        hash: resource.hash,
                        details: "shader source is empty or not UTF-8".to_string(),
                    });
                }
                ObjectKind::Shader
            }
            ResourceKind::Texture => {
                if resource.data.is_empty() {
                    return Err(UploadError::InvalidContent {
                        hash: resource.hash,
                        details: "texture has no texels".to_string(),
                    });
                }
                ObjectKind::Texture
            }
            ResourceKind::Buffer => ObjectKind::Buffer,
        };
        Ok(self.allocate(kind, resource.data.to_vec(), resource.byte_size())?)
    }

    /// Releases an object.
    pub fn release(&self, handle: DeviceResourceHandle) -> Result<(), DeviceError> {
        let removed = self
            .objects()
            .remove(&handle)
            .ok_or(DeviceError::InvalidHandle(handle))?;
        self.allocated_bytes
            .fetch_sub(removed.capacity, Ordering::Relaxed);
        Ok(())
    }

    /// Overwrites an object's content. Textures are resized to fit, buffers are not.
    pub fn write(&self, handle: DeviceResourceHandle, data: &[u8]) -> Result<(), DeviceError> {
        let mut objects = self.objects();
        let object = objects
            .get_mut(&handle)
            .ok_or(DeviceError::InvalidHandle(handle))?;
        let size = data.len() as u64;
        match object.kind {
            ObjectKind::Texture => {
                if size != object.capacity {
                    if size > object.capacity {
                        self.allocated_bytes
                            .fetch_add(size - object.capacity, Ordering::Relaxed);
                    } else {
                        self.allocated_bytes
                            .fetch_sub(object.capacity - size, Ordering::Relaxed);
                    }
                    object.capacity = size;
                }
            }
            ObjectKind::Buffer | ObjectKind::Shader => {
                if size > object.capacity {
                    return Err(DeviceError::SizeMismatch {
                        expected: object.capacity,
                        actual: size,
                    });
                }
            }
        }
        object.bytes.clear();
        object.bytes.extend_from_slice(data);
        Ok(())
    }

    /// Content of an object, for inspection.
    pub fn read(&self, handle: DeviceResourceHandle) -> Option<Vec<u8>> {
        self.objects().get(&handle).map(|o| o.bytes.clone())
    }

    /// Whether the handle names a live object.
    pub fn contains(&self, handle: DeviceResourceHandle) -> bool {
        self.objects().contains_key(&handle)
    }

    /// Number of live objects.
    pub fn object_count(&self) -> usize {
        self.objects().len()
    }

    /// Bytes held by live objects.
    pub fn allocated_bytes(&self) -> u64 {
        self.allocated_bytes.load(Ordering::Relaxed)
    }
}

/// The main-thread device of a headless display.
///
/// Every call requires the main context to be current on the calling thread.
#[derive(Debug)]
pub struct SoftwareDevice {
    context: SoftwareContext,
    namespace: Arc<ObjectNamespace>,
}

impl SoftwareDevice {
    /// Creates a device without a memory limit.
    pub fn new() -> Self {
        Self::with_memory_limit(None)
    }

    /// Creates a device that refuses allocations beyond `limit` bytes.
    pub fn with_memory_limit(limit: Option<u64>) -> Self {
        Self {
            context: SoftwareContext::new("main"),
            namespace: Arc::new(ObjectNamespace::new(limit)),
        }
    }

    /// The object table, shared with upload contexts.
    pub fn namespace(&self) -> Arc<ObjectNamespace> {
        Arc::clone(&self.namespace)
    }
}

impl Default for SoftwareDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsDevice for SoftwareDevice {
    fn context(&self) -> &dyn RenderContext {
        &self.context
    }

    fn upload_resource(&self, resource: &ResourceData) -> Result<DeviceResourceHandle, UploadError> {
        self.context.ensure_current()?;
        let handle = self.namespace.compile(resource)?;
        log::trace!("SoftwareDevice: uploaded {} as {handle}", resource.hash);
        Ok(handle)
    }

    fn unload_resource(&self, handle: DeviceResourceHandle) -> Result<(), DeviceError> {
        self.context.ensure_current()?;
        self.namespace.release(handle)
    }

    fn create_texture(
        &self,
        desc: &TextureDesc,
        data: Option<&[u8]>,
    ) -> Result<DeviceResourceHandle, DeviceError> {
        self.context.ensure_current()?;
        let size = desc.byte_size();
        let bytes = match data {
            Some(texels) if texels.len() as u64 != size => {
                return Err(DeviceError::SizeMismatch {
                    expected: size,
                    actual: texels.len() as u64,
                });
            }
            Some(texels) => texels.to_vec(),
            None => vec![0; size as usize],
        };
        self.namespace.allocate(ObjectKind::Texture, bytes, size)
    }

    fn write_resource(&self, handle: DeviceResourceHandle, data: &[u8]) -> Result<(), DeviceError> {
        self.context.ensure_current()?;
        self.namespace.write(handle, data)
    }

    fn create_scene_resource(
        &self,
        desc: &SceneResourceDesc,
    ) -> Result<DeviceResourceHandle, DeviceError> {
        self.context.ensure_current()?;
        let kind = match desc {
            SceneResourceDesc::DataBuffer { .. } => ObjectKind::Buffer,
            SceneResourceDesc::RenderBuffer { .. }
            | SceneResourceDesc::TextureBuffer { .. }
            | SceneResourceDesc::StreamTexture { .. } => ObjectKind::Texture,
        };
        let size = desc.byte_size();
        self.namespace.allocate(kind, vec![0; size as usize], size)
    }

    fn resident_object_count(&self) -> usize {
        self.namespace.object_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled_device() -> SoftwareDevice {
        let device = SoftwareDevice::new();
        device.context().enable().expect("enable main context");
        device
    }

    #[test]
    fn calls_without_a_current_context_fail() {
        let device = SoftwareDevice::new();
        let resource = ResourceData::new(ResourceKind::Buffer, vec![1u8, 2, 3]);
        assert!(matches!(
            device.upload_resource(&resource),
            Err(UploadError::Device(DeviceError::ContextUnavailable { .. }))
        ));
    }

    #[test]
    fn invalid_shader_source_is_reported_as_invalid_content() {
        let device = enabled_device();
        let shader = ResourceData::new(ResourceKind::Shader, vec![0xffu8, 0xfe]);
        assert!(matches!(
            device.upload_resource(&shader),
            Err(UploadError::InvalidContent { .. })
        ));
        assert_eq!(device.resident_object_count(), 0);
    }

    #[test]
    fn upload_and_unload_track_memory() {
        let device = enabled_device();
        let resource = ResourceData::new(ResourceKind::Buffer, vec![0u8; 64]);
        let handle = device.upload_resource(&resource).expect("upload");
        assert_eq!(device.namespace().allocated_bytes(), 64);

        device.unload_resource(handle).expect("unload");
        assert_eq!(device.namespace().allocated_bytes(), 0);
        assert_eq!(
            device.unload_resource(handle),
            Err(DeviceError::InvalidHandle(handle))
        );
    }

    #[test]
    fn memory_limit_refuses_large_allocations() {
        let device = SoftwareDevice::with_memory_limit(Some(16));
        device.context().enable().expect("enable");
        let result = device.create_texture(&TextureDesc { width: 4, height: 4 }, None);
        assert_eq!(result, Err(DeviceError::OutOfMemory { requested: 64 }));
    }

    #[test]
    fn textures_grow_on_write_but_buffers_do_not() {
        let device = enabled_device();
        let texture = device
            .create_texture(&TextureDesc { width: 1, height: 1 }, None)
            .expect("texture");
        device.write_resource(texture, &[9u8; 16]).expect("write");
        assert_eq!(device.namespace().read(texture), Some(vec![9u8; 16]));

        let buffer = device
            .create_scene_resource(&SceneResourceDesc::DataBuffer { byte_size: 4 })
            .expect("buffer");
        assert_eq!(
            device.write_resource(buffer, &[0u8; 8]),
            Err(DeviceError::SizeMismatch {
                expected: 4,
                actual: 8
            })
        );
    }
}
