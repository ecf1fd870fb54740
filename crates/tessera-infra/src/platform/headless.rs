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

//! Factory for headless displays.

use crate::compositor::{HeadlessCompositor, SurfaceScript};
use crate::graphics::software::{SoftwareContext, SoftwareDevice};
use crate::upload::{ThreadedUploadBackend, UploadThreadSettings};
use std::sync::Arc;
use std::time::Duration;
use tessera_core::renderer::{
    DisplayConfig, DisplayError, DisplayId, GraphicsDevice, PlatformFactory, RenderBackend,
    RenderContext,
};

/// Knobs of the headless platform.
#[derive(Debug, Clone, Default)]
pub struct HeadlessSettings {
    /// Upload thread tuning.
    pub upload: UploadThreadSettings,
    /// Device memory limit in bytes; `None` is unlimited.
    pub memory_limit: Option<u64>,
    /// Simulates a platform whose upload context cannot be created.
    pub fail_upload_context: bool,
}

impl HeadlessSettings {
    /// Settings with the upload thread waking up every `poll_ms` milliseconds.
    pub fn with_upload_poll_ms(poll_ms: u64) -> Self {
        Self {
            upload: UploadThreadSettings {
                poll_interval: Duration::from_millis(poll_ms.max(1)),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// Creates displays backed by a [`SoftwareDevice`], a [`ThreadedUploadBackend`]
/// and a [`HeadlessCompositor`].
#[derive(Debug, Clone, Default)]
pub struct HeadlessPlatform {
    settings: HeadlessSettings,
    surfaces: SurfaceScript,
}

impl HeadlessPlatform {
    /// Creates a platform with the given settings.
    pub fn new(settings: HeadlessSettings) -> Self {
        Self {
            settings,
            surfaces: SurfaceScript::new(),
        }
    }

    /// Scripting handle for the compositor surfaces of every display.
    pub fn surfaces(&self) -> SurfaceScript {
        self.surfaces.clone()
    }
}

impl PlatformFactory for HeadlessPlatform {
    fn create_render_backend(
        &self,
        display: DisplayId,
        config: &DisplayConfig,
    ) -> Result<RenderBackend, DisplayError> {
        log::info!(
            "HeadlessPlatform: creating display {} ({}x{})",
            display.0,
            config.width,
            config.height
        );

        // 1. Device with its main context, current on the calling thread.
        let device = SoftwareDevice::with_memory_limit(self.settings.memory_limit);
        device
            .context()
            .enable()
            .map_err(|e| DisplayError::ContextCreation {
                display,
                details: e.to_string(),
            })?;

        // 2. Upload context sharing the device's objects, on its own thread.
        let upload_context = Arc::new(SoftwareContext::new(format!("upload-{}", display.0)));
        if self.settings.fail_upload_context {
            // Held here, so the upload thread cannot make it current.
            upload_context
                .enable()
                .map_err(|e| DisplayError::ContextCreation {
                    display,
                    details: e.to_string(),
                })?;
        }
        let upload_backend = ThreadedUploadBackend::spawn_with_context(
            display,
            device.namespace(),
            upload_context,
            self.settings.upload,
        )?;

        // 3. Compositor.
        let compositor = if config.embedded_compositing {
            HeadlessCompositor::new(self.surfaces.clone())
        } else {
            HeadlessCompositor::disconnected()
        };

        Ok(RenderBackend {
            device: Arc::new(device),
            upload_backend: Box::new(upload_backend),
            compositor: Box::new(compositor),
        })
    }
}
