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

use crate::renderer::{CompositorError, DeviceResourceHandle, GraphicsDevice, StreamSourceId};
use std::fmt::Debug;

/// The embedded compositor collaborator, reduced to its lifecycle contract.
///
/// Each `dispatch_*` call returns the ids accumulated since the previous call
/// of the same method and clears them.
pub trait EmbeddedCompositor: Send + Debug {
    /// Sources that became available since the last dispatch.
    fn dispatch_new_stream_texture_source_ids(&mut self) -> Vec<StreamSourceId>;

    /// Sources that disappeared since the last dispatch.
    fn dispatch_obsolete_stream_texture_source_ids(&mut self) -> Vec<StreamSourceId>;

    /// Sources that committed new content since the last dispatch.
    fn dispatch_updated_stream_texture_source_ids(&mut self) -> Vec<StreamSourceId>;

    /// Whether the source currently has content to sample.
    fn is_content_available_for_stream_texture(&self, source: StreamSourceId) -> bool;

    /// Copies the latest content of `source` into `target`.
    fn upload_compositing_content_for_stream_texture(
        &mut self,
        source: StreamSourceId,
        target: DeviceResourceHandle,
        device: &dyn GraphicsDevice,
    ) -> Result<(), CompositorError>;
}
