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

//! Stream textures backed by embedded compositor surfaces.

use std::collections::BTreeMap;
use tessera_core::renderer::{
    DeviceError, DeviceResourceHandle, EmbeddedCompositor, GraphicsDevice, StreamSourceId,
    TextureDesc,
};

const PLACEHOLDER: TextureDesc = TextureDesc {
    width: 1,
    height: 1,
};

#[derive(Debug, Clone, Copy)]
struct StreamTextureSourceInfo {
    texture: DeviceResourceHandle,
    ref_count: usize,
    content_available: bool,
    // Set on creation: content committed before the first reference was never dispatched.
    needs_upload: bool,
}

/// What changed on the compositor side since the last dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSourceChanges {
    /// Surfaces created by compositor clients.
    pub new_sources: Vec<StreamSourceId>,
    /// Surfaces destroyed by compositor clients.
    pub obsolete_sources: Vec<StreamSourceId>,
    /// Referenced sources whose content availability flipped.
    pub availability_changed: Vec<StreamSourceId>,
}

/// Reference-counts stream textures and refreshes them from the compositor.
///
/// The first reference to a source creates a 1x1 placeholder texture; the
/// compositor content replaces it on the next upload pass. The last
/// unreference destroys the texture.
#[derive(Debug)]
pub struct EmbeddedCompositingManager {
    compositor: Box<dyn EmbeddedCompositor>,
    streams: BTreeMap<StreamSourceId, StreamTextureSourceInfo>,
}

impl EmbeddedCompositingManager {
    /// Wraps the compositor of a display.
    pub fn new(compositor: Box<dyn EmbeddedCompositor>) -> Self {
        Self {
            compositor,
            streams: BTreeMap::new(),
        }
    }

    /// Adds a reference to `source`, creating its texture on the first one.
    pub fn ref_stream(
        &mut self,
        source: StreamSourceId,
        device: &dyn GraphicsDevice,
    ) -> Result<DeviceResourceHandle, DeviceError> {
        if let Some(info) = self.streams.get_mut(&source) {
            info.ref_count += 1;
            return Ok(info.texture);
        }
        let texture = device.create_texture(&PLACEHOLDER, None)?;
        let content_available = self.compositor.is_content_available_for_stream_texture(source);
        self.streams.insert(
            source,
            StreamTextureSourceInfo {
                texture,
                ref_count: 1,
                content_available,
                needs_upload: content_available,
            },
        );
        log::debug!("EmbeddedCompositingManager: created texture {texture} for {source}");
        Ok(texture)
    }

    /// Drops a reference to `source`. Returns whether its texture was destroyed.
    pub fn unref_stream(&mut self, source: StreamSourceId, device: &dyn GraphicsDevice) -> bool {
        let Some(info) = self.streams.get_mut(&source) else {
            log::warn!("EmbeddedCompositingManager: unref of unreferenced {source}");
            return false;
        };
        info.ref_count -= 1;
        if info.ref_count > 0 {
            return false;
        }
        let texture = info.texture;
        self.streams.remove(&source);
        if let Err(e) = device.unload_resource(texture) {
            log::error!("EmbeddedCompositingManager: failed to destroy texture of {source}: {e}");
        }
        log::debug!("EmbeddedCompositingManager: destroyed texture {texture} of {source}");
        true
    }

    /// Texture of a referenced source.
    pub fn stream_texture(&self, source: StreamSourceId) -> Option<DeviceResourceHandle> {
        self.streams.get(&source).map(|info| info.texture)
    }

    /// Number of references to `source`.
    pub fn ref_count(&self, source: StreamSourceId) -> usize {
        self.streams.get(&source).map_or(0, |info| info.ref_count)
    }

    /// Number of referenced sources.
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Content availability of a referenced source, as of the last dispatch.
    pub fn is_content_available(&self, source: StreamSourceId) -> bool {
        self.streams
            .get(&source)
            .is_some_and(|info| info.content_available)
    }

    /// Collects source lifecycle changes and availability flips of referenced sources.
    pub fn dispatch_state_changes(&mut self) -> StreamSourceChanges {
        let new_sources = self.compositor.dispatch_new_stream_texture_source_ids();
        let obsolete_sources = self.compositor.dispatch_obsolete_stream_texture_source_ids();

        let mut availability_changed = Vec::new();
        for (source, info) in self.streams.iter_mut() {
            let available = self.compositor.is_content_available_for_stream_texture(*source);
            if available != info.content_available {
                info.content_available = available;
                availability_changed.push(*source);
            }
        }

        StreamSourceChanges {
            new_sources,
            obsolete_sources,
            availability_changed,
        }
    }

    /// Uploads the content of referenced sources whose content changed.
    ///
    /// Returns the sources whose texture now holds new content.
    pub fn upload_resources_and_get_updates(
        &mut self,
        device: &dyn GraphicsDevice,
    ) -> Vec<StreamSourceId> {
        let mut sources = self.compositor.dispatch_updated_stream_texture_source_ids();
        let fresh: Vec<_> = self
            .streams
            .iter()
            .filter(|(source, info)| info.needs_upload && !sources.contains(source))
            .map(|(source, _)| *source)
            .collect();
        sources.extend(fresh);

        let mut updated = Vec::new();
        for source in sources {
            let Some(info) = self.streams.get_mut(&source) else {
                log::trace!("EmbeddedCompositingManager: {source} updated but not referenced");
                continue;
            };
            info.needs_upload = false;
            match self
                .compositor
                .upload_compositing_content_for_stream_texture(source, info.texture, device)
            {
                Ok(()) => updated.push(source),
                Err(e) => log::warn!("EmbeddedCompositingManager: {source} not refreshed: {e}"),
            }
        }
        updated.sort();
        updated
    }

    /// Destroys every stream texture, e.g. when the display goes away.
    pub fn release_all(&mut self, device: &dyn GraphicsDevice) {
        for (source, info) in std::mem::take(&mut self.streams) {
            if let Err(e) = device.unload_resource(info.texture) {
                log::error!("EmbeddedCompositingManager: failed to destroy texture of {source}: {e}");
            }
        }
    }
}
