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

use crate::renderer::StreamSourceId;
use std::sync::Arc;

/// The family of a scene-local GPU resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SceneResourceKind {
    /// A render target attachment.
    RenderBuffer,
    /// A vertex or index buffer owned by the scene.
    DataBuffer,
    /// A texture whose texels are written by the scene.
    TextureBuffer,
    /// A texture whose content comes from the embedded compositor.
    StreamTexture,
}

/// Handle of a scene-local resource, unique within its scene and kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SceneResourceHandle {
    /// Resource family.
    pub kind: SceneResourceKind,
    /// Scene-assigned index.
    pub index: u32,
}

impl SceneResourceHandle {
    /// Creates a handle.
    pub const fn new(kind: SceneResourceKind, index: u32) -> Self {
        Self { kind, index }
    }
}

/// Creation parameters of a scene-local resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneResourceDesc {
    /// Render target attachment of the given size.
    RenderBuffer {
        /// Width in pixels.
        width: u32,
        /// Height in pixels.
        height: u32,
    },
    /// Data buffer with the given capacity.
    DataBuffer {
        /// Capacity in bytes.
        byte_size: u64,
    },
    /// Texture buffer of the given size.
    TextureBuffer {
        /// Width in texels.
        width: u32,
        /// Height in texels.
        height: u32,
    },
    /// Stream texture sampling a compositor surface.
    StreamTexture {
        /// Compositor surface backing the texture.
        source: StreamSourceId,
    },
}

impl SceneResourceDesc {
    /// The resource family this descriptor creates.
    pub fn kind(&self) -> SceneResourceKind {
        match self {
            SceneResourceDesc::RenderBuffer { .. } => SceneResourceKind::RenderBuffer,
            SceneResourceDesc::DataBuffer { .. } => SceneResourceKind::DataBuffer,
            SceneResourceDesc::TextureBuffer { .. } => SceneResourceKind::TextureBuffer,
            SceneResourceDesc::StreamTexture { .. } => SceneResourceKind::StreamTexture,
        }
    }

    /// Approximate GPU memory footprint.
    pub fn byte_size(&self) -> u64 {
        match self {
            SceneResourceDesc::RenderBuffer { width, height }
            | SceneResourceDesc::TextureBuffer { width, height } => {
                u64::from(*width) * u64::from(*height) * 4
            }
            SceneResourceDesc::DataBuffer { byte_size } => *byte_size,
            SceneResourceDesc::StreamTexture { .. } => 4,
        }
    }
}

/// Allocation, update, or release of a scene-local GPU resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneResourceAction {
    /// Allocates the resource.
    Create {
        /// Resource to allocate.
        handle: SceneResourceHandle,
        /// Allocation parameters.
        desc: SceneResourceDesc,
    },
    /// Replaces the content of a data or texture buffer.
    Update {
        /// Resource to update.
        handle: SceneResourceHandle,
        /// New content.
        data: Arc<[u8]>,
    },
    /// Releases the resource.
    Destroy {
        /// Resource to release.
        handle: SceneResourceHandle,
    },
}

impl SceneResourceAction {
    /// The resource this action targets.
    pub fn handle(&self) -> SceneResourceHandle {
        match self {
            SceneResourceAction::Create { handle, .. }
            | SceneResourceAction::Update { handle, .. }
            | SceneResourceAction::Destroy { handle } => *handle,
        }
    }

    /// Whether this is a `Create` action.
    pub fn is_create(&self) -> bool {
        matches!(self, SceneResourceAction::Create { .. })
    }

    /// Whether this is an `Update` action.
    pub fn is_update(&self) -> bool {
        matches!(self, SceneResourceAction::Update { .. })
    }

    /// Whether this is a `Destroy` action.
    pub fn is_destroy(&self) -> bool {
        matches!(self, SceneResourceAction::Destroy { .. })
    }
}
