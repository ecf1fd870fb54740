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

use crate::renderer::{DeviceError, DeviceResourceHandle, TextureDesc, UploadError};
use crate::resource::ResourceData;
use crate::scene::SceneResourceDesc;
use std::fmt::Debug;

/// A GPU execution context that can be made current on one thread at a time.
///
/// The main context and the upload context of a display are independent:
/// enabling one never waits on the other.
pub trait RenderContext: Send + Sync + Debug {
    /// Makes the context current on the calling thread.
    fn enable(&self) -> Result<(), DeviceError>;

    /// Releases the context from the calling thread.
    fn disable(&self) -> Result<(), DeviceError>;

    /// Whether the context is current on some thread.
    fn is_enabled(&self) -> bool;
}

/// The main-thread graphics device of a display.
pub trait GraphicsDevice: Send + Sync + Debug {
    /// The main render context of the device.
    fn context(&self) -> &dyn RenderContext;

    /// Uploads a client resource synchronously.
    fn upload_resource(&self, resource: &ResourceData) -> Result<DeviceResourceHandle, UploadError>;

    /// Releases any object previously created by this device or its upload context.
    fn unload_resource(&self, handle: DeviceResourceHandle) -> Result<(), DeviceError>;

    /// Allocates a texture, optionally with initial texels.
    fn create_texture(
        &self,
        desc: &TextureDesc,
        data: Option<&[u8]>,
    ) -> Result<DeviceResourceHandle, DeviceError>;

    /// Overwrites texel or buffer content of an existing object.
    fn write_resource(&self, handle: DeviceResourceHandle, data: &[u8]) -> Result<(), DeviceError>;

    /// Allocates a scene-local resource that is not a stream texture.
    fn create_scene_resource(
        &self,
        desc: &SceneResourceDesc,
    ) -> Result<DeviceResourceHandle, DeviceError>;

    /// Number of live objects, for diagnostics.
    fn resident_object_count(&self) -> usize;
}
