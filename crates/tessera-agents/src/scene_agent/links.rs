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

//! Glue between the link graph and the renderer scenes.

use super::agent::ReceivedScene;
use ahash::AHashMap;
use std::collections::BTreeSet;
use tessera_core::scene::{DataSlotId, DataSlotInfo, DataSlotValue, SceneId};
use tessera_lanes::link_lane::{LinkSource, LinkableScenes, SceneLinkGraph, ValueTransfer};
use tessera_lanes::scene_lane::SceneStateExecutor;

/// Read-only view of the scenes for link validation.
pub(super) struct LinkView<'a> {
    pub(super) executor: &'a SceneStateExecutor,
    pub(super) scenes: &'a AHashMap<SceneId, ReceivedScene>,
}

impl LinkableScenes for LinkView<'_> {
    fn is_subscribed(&self, scene: SceneId) -> bool {
        self.executor.state(scene).is_subscribed()
    }

    fn slot(&self, scene: SceneId, slot: DataSlotId) -> Option<DataSlotInfo> {
        self.scenes
            .get(&scene)
            .and_then(|received| received.content.data_slot(slot))
    }
}

/// Copies linked values into consumer slots. Returns the consumers written to.
pub(super) fn transfer_linked_values(
    transfers: Vec<ValueTransfer>,
    links: &SceneLinkGraph,
    scenes: &mut AHashMap<SceneId, ReceivedScene>,
) -> BTreeSet<SceneId> {
    let mut written = BTreeSet::new();
    for transfer in transfers {
        let value = match transfer.source {
            LinkSource::Scene { provider, slot } => scenes
                .get(&provider)
                .and_then(|received| received.content.read_data_slot(slot)),
            LinkSource::Buffer(buffer) => links.buffer_texture(buffer).map(DataSlotValue::Texture),
        };
        let Some(value) = value else {
            log::trace!("SceneUpdateAgent: no value to transfer from {:?}", transfer.source);
            continue;
        };
        if let Some(consumer) = scenes.get_mut(&transfer.consumer) {
            consumer.content.write_data_slot(transfer.consumer_slot, value);
            written.insert(transfer.consumer);
        }
    }
    written
}
