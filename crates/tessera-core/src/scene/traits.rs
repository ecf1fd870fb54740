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

use super::{SceneAction, SceneId, SceneResourceAction, SceneSizeHint};
use crate::renderer::DeviceResourceHandle;
use std::fmt::Debug;
use std::sync::Arc;

/// Identifier of a data slot declared by a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataSlotId(pub u32);

/// Direction of a data slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotRole {
    /// Publishes a value to other scenes.
    Provider,
    /// Receives a value from a provider scene or an offscreen buffer.
    Consumer,
}

/// What a data slot carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSlotType {
    /// A node transformation.
    Transformation,
    /// A plain data value.
    Value,
    /// A texture, which may also be fed by an offscreen buffer.
    Texture,
}

/// Declaration of a data slot as reported by the scene graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataSlotInfo {
    /// Provider or consumer.
    pub role: SlotRole,
    /// Carried data type.
    pub data_type: DataSlotType,
}

/// A value transported over a data link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSlotValue {
    /// Serialized value or transformation.
    Bytes(Arc<[u8]>),
    /// A GPU texture, e.g. the color attachment of an offscreen buffer.
    Texture(DeviceResourceHandle),
}

/// The renderer-side scene graph of one scene.
///
/// This is the boundary to the scene graph collaborator: the update engine
/// decides *when* actions are applied, the implementation decides *what* they do.
pub trait RendererScene: Send + Debug {
    /// Applies a batch of actions in order.
    fn apply_actions(&mut self, actions: &[SceneAction]);

    /// Returns creation actions for every scene-local resource currently
    /// allocated, used to re-upload the scene when it gets mapped.
    fn collect_scene_resource_actions(&self) -> Vec<SceneResourceAction>;

    /// Whether a running animation needs the scene re-rendered every frame.
    fn has_active_animations(&self) -> bool {
        false
    }

    /// Looks up a declared data slot.
    fn data_slot(&self, _slot: DataSlotId) -> Option<DataSlotInfo> {
        None
    }

    /// Reads the current value of a provider slot.
    fn read_data_slot(&self, _slot: DataSlotId) -> Option<DataSlotValue> {
        None
    }

    /// Writes a linked value into a consumer slot.
    fn write_data_slot(&mut self, _slot: DataSlotId, _value: DataSlotValue) {}
}

/// Creates renderer-side scenes when their initial content arrives.
pub trait SceneFactory: Send {
    /// Creates an empty scene graph for `scene`.
    fn create_scene(&self, scene: SceneId, size_hint: SceneSizeHint) -> Box<dyn RendererScene>;
}
