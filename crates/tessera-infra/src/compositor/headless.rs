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

//! A compositor whose surfaces are scripted instead of coming from clients.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tessera_core::renderer::{
    CompositorError, DeviceResourceHandle, EmbeddedCompositor, GraphicsDevice, StreamSourceId,
};

#[derive(Debug, Default)]
struct SurfaceTable {
    // Latest committed buffer per surface.
    surfaces: BTreeMap<StreamSourceId, Option<Vec<u8>>>,
    new_ids: Vec<StreamSourceId>,
    obsolete_ids: Vec<StreamSourceId>,
    updated_ids: Vec<StreamSourceId>,
}

/// Handle used by tests and tools to play the role of compositor clients.
///
/// Clones share the same surfaces, and every [`HeadlessCompositor`] created
/// from the handle sees them.
#[derive(Debug, Clone, Default)]
pub struct SurfaceScript {
    table: Arc<Mutex<SurfaceTable>>,
}

impl SurfaceScript {
    /// Creates an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, SurfaceTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A client created a surface. It has no content until its first commit.
    pub fn create_surface(&self, source: StreamSourceId) {
        let mut table = self.table();
        if table.surfaces.insert(source, None).is_none() {
            table.obsolete_ids.retain(|id| *id != source);
            table.new_ids.push(source);
        }
    }

    /// A client attached and committed a buffer of RGBA8 texels.
    pub fn commit(&self, source: StreamSourceId, texels: Vec<u8>) {
        let mut table = self.table();
        if let Some(content) = table.surfaces.get_mut(&source) {
            *content = Some(texels);
            if !table.updated_ids.contains(&source) {
                table.updated_ids.push(source);
            }
        } else {
            log::warn!("SurfaceScript: commit to unknown surface {source}");
        }
    }

    /// A client destroyed its surface.
    pub fn destroy_surface(&self, source: StreamSourceId) {
        let mut table = self.table();
        if table.surfaces.remove(&source).is_some() {
            table.new_ids.retain(|id| *id != source);
            table.updated_ids.retain(|id| *id != source);
            table.obsolete_ids.push(source);
        }
    }

    /// Number of live surfaces.
    pub fn surface_count(&self) -> usize {
        self.table().surfaces.len()
    }
}

/// In-process compositor backed by a [`SurfaceScript`].
#[derive(Debug, Default)]
pub struct HeadlessCompositor {
    script: SurfaceScript,
}

impl HeadlessCompositor {
    /// Creates a compositor serving the surfaces of `script`.
    pub fn new(script: SurfaceScript) -> Self {
        Self { script }
    }

    /// A compositor without clients, for displays that disable embedded compositing.
    pub fn disconnected() -> Self {
        Self::default()
    }
}

impl EmbeddedCompositor for HeadlessCompositor {
    fn dispatch_new_stream_texture_source_ids(&mut self) -> Vec<StreamSourceId> {
        std::mem::take(&mut self.script.table().new_ids)
    }

    fn dispatch_obsolete_stream_texture_source_ids(&mut self) -> Vec<StreamSourceId> {
        std::mem::take(&mut self.script.table().obsolete_ids)
    }

    fn dispatch_updated_stream_texture_source_ids(&mut self) -> Vec<StreamSourceId> {
        std::mem::take(&mut self.script.table().updated_ids)
    }

    fn is_content_available_for_stream_texture(&self, source: StreamSourceId) -> bool {
        self.script
            .table()
            .surfaces
            .get(&source)
            .is_some_and(Option::is_some)
    }

    fn upload_compositing_content_for_stream_texture(
        &mut self,
        source: StreamSourceId,
        target: DeviceResourceHandle,
        device: &dyn GraphicsDevice,
    ) -> Result<(), CompositorError> {
        let texels = {
            let table = self.script.table();
            match table.surfaces.get(&source) {
                None => return Err(CompositorError::UnknownSource(source)),
                Some(None) => return Err(CompositorError::NoContent(source)),
                Some(Some(texels)) => texels.clone(),
            }
        };
        device.write_resource(target, &texels)?;
        log::trace!("HeadlessCompositor: {source} -> {target} ({} bytes)", texels.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::software::SoftwareDevice;
    use tessera_core::renderer::{RenderContext, TextureDesc};

    const X: StreamSourceId = StreamSourceId(7);

    #[test]
    fn dispatch_reports_each_change_once() {
        let script = SurfaceScript::new();
        let mut compositor = HeadlessCompositor::new(script.clone());

        script.create_surface(X);
        script.commit(X, vec![1, 2, 3, 4]);
        assert_eq!(compositor.dispatch_new_stream_texture_source_ids(), vec![X]);
        assert_eq!(compositor.dispatch_updated_stream_texture_source_ids(), vec![X]);
        assert!(compositor.dispatch_new_stream_texture_source_ids().is_empty());
        assert!(compositor.is_content_available_for_stream_texture(X));

        script.destroy_surface(X);
        assert_eq!(compositor.dispatch_obsolete_stream_texture_source_ids(), vec![X]);
        assert!(!compositor.is_content_available_for_stream_texture(X));
    }

    #[test]
    fn surface_created_and_destroyed_between_dispatches_is_only_obsolete() {
        let script = SurfaceScript::new();
        let mut compositor = HeadlessCompositor::new(script.clone());
        script.create_surface(X);
        script.destroy_surface(X);
        assert!(compositor.dispatch_new_stream_texture_source_ids().is_empty());
        assert_eq!(compositor.dispatch_obsolete_stream_texture_source_ids(), vec![X]);
    }

    #[test]
    fn content_is_written_into_the_target_texture() {
        let script = SurfaceScript::new();
        let mut compositor = HeadlessCompositor::new(script.clone());
        let device = SoftwareDevice::new();
        device.context().enable().expect("enable");
        let target = device
            .create_texture(&TextureDesc { width: 1, height: 1 }, None)
            .expect("texture");

        script.create_surface(X);
        assert_eq!(
            compositor.upload_compositing_content_for_stream_texture(X, target, &device),
            Err(CompositorError::NoContent(X))
        );

        script.commit(X, vec![5; 8]);
        compositor
            .upload_compositing_content_for_stream_texture(X, target, &device)
            .expect("upload");
        assert_eq!(device.namespace().read(target), Some(vec![5; 8]));
    }

    #[test]
    fn disconnected_compositor_never_reports_sources() {
        let mut compositor = HeadlessCompositor::disconnected();
        assert!(compositor.dispatch_new_stream_texture_source_ids().is_empty());
        assert_eq!(
            compositor.upload_compositing_content_for_stream_texture(
                X,
                DeviceResourceHandle(1),
                &SoftwareDevice::new()
            ),
            Err(CompositorError::UnknownSource(X))
        );
    }
}
