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

use crate::renderer::{
    AsyncUploadBackend, DisplayError, DisplayId, EmbeddedCompositor, GraphicsDevice,
};
use std::sync::Arc;

/// Parameters for creating a display.
#[derive(Debug, Clone)]
pub struct DisplayConfig {
    /// Framebuffer width.
    pub width: u32,
    /// Framebuffer height.
    pub height: u32,
    /// Whether the compositor should be started for this display.
    pub embedded_compositing: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            embedded_compositing: true,
        }
    }
}

/// The owning aggregate of one display's backend objects.
///
/// Everything in here is created together and destroyed together. The upload
/// backend shares the device's object namespace through a non-owning reference.
#[derive(Debug)]
pub struct RenderBackend {
    /// Main-thread device.
    pub device: Arc<dyn GraphicsDevice>,
    /// Upload context running on its own thread.
    pub upload_backend: Box<dyn AsyncUploadBackend>,
    /// Embedded compositor.
    pub compositor: Box<dyn EmbeddedCompositor>,
}

/// Creates platform-specific render backends.
pub trait PlatformFactory {
    /// Creates the backend aggregate for a display.
    fn create_render_backend(
        &self,
        display: DisplayId,
        config: &DisplayConfig,
    ) -> Result<RenderBackend, DisplayError>;
}
