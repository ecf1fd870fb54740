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

//! Data links between scenes and offscreen buffers.

use ahash::{AHashMap, AHashSet};
use std::collections::BTreeSet;
use tessera_core::renderer::{DeviceResourceHandle, OffscreenBufferId};
use tessera_core::scene::{DataSlotId, DataSlotInfo, DataSlotType, SceneId, SlotRole};
use thiserror::Error;

/// What the link graph needs to know about scenes to validate a link.
pub trait LinkableScenes {
    /// Whether the scene is subscribed (content present).
    fn is_subscribed(&self, scene: SceneId) -> bool;
    /// Declaration of a data slot, if the scene has it.
    fn slot(&self, scene: SceneId, slot: DataSlotId) -> Option<DataSlotInfo>;
}

/// Why a link operation was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    /// A scene is not subscribed.
    #[error("{0} is not subscribed")]
    NotSubscribed(SceneId),
    /// A scene does not declare the slot.
    #[error("{scene} has no data slot {slot:?}")]
    UnknownSlot {
        /// Scene concerned.
        scene: SceneId,
        /// Missing slot.
        slot: DataSlotId,
    },
    /// The provider slot is not a provider or the consumer slot not a consumer.
    #[error("slot roles do not match")]
    RoleMismatch,
    /// Provider and consumer carry different data.
    #[error("slot types {provider:?} and {consumer:?} do not match")]
    TypeMismatch {
        /// Provider slot type.
        provider: DataSlotType,
        /// Consumer slot type.
        consumer: DataSlotType,
    },
    /// The consumer slot already has a link.
    #[error("{scene} slot {slot:?} is already linked")]
    ConsumerSlotTaken {
        /// Consumer scene.
        scene: SceneId,
        /// Consumer slot.
        slot: DataSlotId,
    },
    /// The link would make a scene depend on itself.
    #[error("linking {provider} to {consumer} creates a dependency cycle")]
    Cycle {
        /// Provider scene.
        provider: SceneId,
        /// Consumer scene.
        consumer: SceneId,
    },
    /// The consumer slot has no link.
    #[error("{scene} slot {slot:?} is not linked")]
    NotLinked {
        /// Consumer scene.
        scene: SceneId,
        /// Consumer slot.
        slot: DataSlotId,
    },
    /// Unknown offscreen buffer.
    #[error("offscreen buffer {0:?} does not exist")]
    UnknownBuffer(OffscreenBufferId),
    /// Offscreen buffer id already taken.
    #[error("offscreen buffer {0:?} already exists")]
    BufferExists(OffscreenBufferId),
}

/// Where a consumer slot gets its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkSource {
    /// A provider slot of another scene.
    Scene {
        /// Provider scene.
        provider: SceneId,
        /// Provider slot.
        slot: DataSlotId,
    },
    /// The color texture of an offscreen buffer.
    Buffer(OffscreenBufferId),
}

/// A value that has to be copied into a consumer slot this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueTransfer {
    /// Origin of the value.
    pub source: LinkSource,
    /// Consumer scene.
    pub consumer: SceneId,
    /// Consumer slot.
    pub consumer_slot: DataSlotId,
}

#[derive(Debug, Clone)]
struct OffscreenBuffer {
    texture: DeviceResourceHandle,
    interruptible: bool,
}

/// Data links, offscreen buffers and scene assignments of one display.
#[derive(Debug, Default)]
pub struct SceneLinkGraph {
    links: AHashMap<(SceneId, DataSlotId), LinkSource>,
    new_links: AHashSet<(SceneId, DataSlotId)>,
    buffers: AHashMap<OffscreenBufferId, OffscreenBuffer>,
    assignments: AHashMap<SceneId, OffscreenBufferId>,
}

impl SceneLinkGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Source linked to a consumer slot.
    pub fn link_source(&self, consumer: SceneId, slot: DataSlotId) -> Option<LinkSource> {
        self.links.get(&(consumer, slot)).copied()
    }

    /// Number of links, buffer links included.
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Links `provider`'s slot to `consumer`'s slot.
    pub fn create_data_link(
        &mut self,
        scenes: &dyn LinkableScenes,
        provider: SceneId,
        provider_slot: DataSlotId,
        consumer: SceneId,
        consumer_slot: DataSlotId,
    ) -> Result<(), LinkError> {
        for scene in [provider, consumer] {
            if !scenes.is_subscribed(scene) {
                return Err(LinkError::NotSubscribed(scene));
            }
        }
        let provider_info = scenes
            .slot(provider, provider_slot)
            .ok_or(LinkError::UnknownSlot {
                scene: provider,
                slot: provider_slot,
            })?;
        let consumer_info = scenes
            .slot(consumer, consumer_slot)
            .ok_or(LinkError::UnknownSlot {
                scene: consumer,
                slot: consumer_slot,
            })?;
        if provider_info.role != SlotRole::Provider || consumer_info.role != SlotRole::Consumer {
            return Err(LinkError::RoleMismatch);
        }
        if provider_info.data_type != consumer_info.data_type {
            return Err(LinkError::TypeMismatch {
                provider: provider_info.data_type,
                consumer: consumer_info.data_type,
            });
        }
        self.check_slot_free(consumer, consumer_slot)?;
        if provider == consumer || self.depends_on(provider, consumer) {
            return Err(LinkError::Cycle { provider, consumer });
        }

        self.links.insert(
            (consumer, consumer_slot),
            LinkSource::Scene {
                provider,
                slot: provider_slot,
            },
        );
        self.new_links.insert((consumer, consumer_slot));
        log::info!(
            "SceneLinkGraph: linked {provider} {provider_slot:?} -> {consumer} {consumer_slot:?}"
        );
        Ok(())
    }

    /// Removes the link feeding a consumer slot.
    pub fn remove_data_link(&mut self, consumer: SceneId, slot: DataSlotId) -> Result<LinkSource, LinkError> {
        self.new_links.remove(&(consumer, slot));
        self.links
            .remove(&(consumer, slot))
            .ok_or(LinkError::NotLinked {
                scene: consumer,
                slot,
            })
    }

    /// Drops every link the scene takes part in and its buffer assignment.
    ///
    /// Returns the consumer scenes that lost an input, the scene itself excluded.
    pub fn remove_scene(&mut self, scene: SceneId) -> BTreeSet<SceneId> {
        self.assignments.remove(&scene);
        let mut affected = BTreeSet::new();
        self.links.retain(|(consumer, _), source| {
            let involved = *consumer == scene
                || matches!(source, LinkSource::Scene { provider, .. } if *provider == scene);
            if involved && *consumer != scene {
                affected.insert(*consumer);
            }
            !involved
        });
        self.new_links.retain(|(consumer, _)| *consumer != scene);
        affected
    }

    /// Registers an offscreen buffer whose color texture is `texture`.
    pub fn create_offscreen_buffer(
        &mut self,
        buffer: OffscreenBufferId,
        texture: DeviceResourceHandle,
        interruptible: bool,
    ) -> Result<(), LinkError> {
        if self.buffers.contains_key(&buffer) {
            return Err(LinkError::BufferExists(buffer));
        }
        self.buffers.insert(
            buffer,
            OffscreenBuffer {
                texture,
                interruptible,
            },
        );
        Ok(())
    }

    /// Removes an offscreen buffer, its links and its assignments.
    ///
    /// Returns the buffer texture and the consumer scenes that lost an input.
    pub fn destroy_offscreen_buffer(
        &mut self,
        buffer: OffscreenBufferId,
    ) -> Result<(DeviceResourceHandle, BTreeSet<SceneId>), LinkError> {
        let removed = self
            .buffers
            .remove(&buffer)
            .ok_or(LinkError::UnknownBuffer(buffer))?;
        self.assignments.retain(|_, assigned| *assigned != buffer);
        let mut affected = BTreeSet::new();
        self.links.retain(|(consumer, _), source| {
            let involved = *source == LinkSource::Buffer(buffer);
            if involved {
                affected.insert(*consumer);
            }
            !involved
        });
        Ok((removed.texture, affected))
    }

    /// Color texture of an offscreen buffer.
    pub fn buffer_texture(&self, buffer: OffscreenBufferId) -> Option<DeviceResourceHandle> {
        self.buffers.get(&buffer).map(|b| b.texture)
    }

    /// Number of offscreen buffers.
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Ids of every offscreen buffer, sorted.
    pub fn buffers(&self) -> Vec<OffscreenBufferId> {
        let mut ids: Vec<_> = self.buffers.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Renders the scene into `buffer`, or into the framebuffer for `None`.
    pub fn assign_scene(&mut self, scene: SceneId, buffer: Option<OffscreenBufferId>) -> Result<(), LinkError> {
        match buffer {
            Some(id) if !self.buffers.contains_key(&id) => Err(LinkError::UnknownBuffer(id)),
            Some(id) => {
                let reader = self
                    .links
                    .iter()
                    .filter(|(_, source)| **source == LinkSource::Buffer(id))
                    .map(|((consumer, _), _)| *consumer)
                    .find(|c| *c == scene || self.depends_on(scene, *c));
                if let Some(consumer) = reader {
                    return Err(LinkError::Cycle {
                        provider: scene,
                        consumer,
                    });
                }
                self.assignments.insert(scene, id);
                Ok(())
            }
            None => {
                self.assignments.remove(&scene);
                Ok(())
            }
        }
    }

    /// Buffer the scene renders into, `None` for the framebuffer.
    pub fn assigned_buffer(&self, scene: SceneId) -> Option<OffscreenBufferId> {
        self.assignments.get(&scene).copied()
    }

    /// Whether the scene renders into an interruptible buffer.
    pub fn is_interruptible(&self, scene: SceneId) -> bool {
        self.assigned_buffer(scene)
            .and_then(|id| self.buffers.get(&id))
            .is_some_and(|b| b.interruptible)
    }

    /// Feeds a consumer texture slot from an offscreen buffer.
    pub fn link_offscreen_buffer(
        &mut self,
        scenes: &dyn LinkableScenes,
        buffer: OffscreenBufferId,
        consumer: SceneId,
        consumer_slot: DataSlotId,
    ) -> Result<(), LinkError> {
        if !self.buffers.contains_key(&buffer) {
            return Err(LinkError::UnknownBuffer(buffer));
        }
        if !scenes.is_subscribed(consumer) {
            return Err(LinkError::NotSubscribed(consumer));
        }
        let info = scenes
            .slot(consumer, consumer_slot)
            .ok_or(LinkError::UnknownSlot {
                scene: consumer,
                slot: consumer_slot,
            })?;
        if info.role != SlotRole::Consumer {
            return Err(LinkError::RoleMismatch);
        }
        if info.data_type != DataSlotType::Texture {
            return Err(LinkError::TypeMismatch {
                provider: DataSlotType::Texture,
                consumer: info.data_type,
            });
        }
        self.check_slot_free(consumer, consumer_slot)?;
        let producers: Vec<SceneId> = self
            .assignments
            .iter()
            .filter(|(_, assigned)| **assigned == buffer)
            .map(|(scene, _)| *scene)
            .collect();
        if let Some(provider) = producers
            .into_iter()
            .find(|p| *p == consumer || self.depends_on(*p, consumer))
        {
            return Err(LinkError::Cycle { provider, consumer });
        }

        self.links
            .insert((consumer, consumer_slot), LinkSource::Buffer(buffer));
        self.new_links.insert((consumer, consumer_slot));
        Ok(())
    }

    fn check_slot_free(&self, consumer: SceneId, slot: DataSlotId) -> Result<(), LinkError> {
        if self.links.contains_key(&(consumer, slot)) {
            return Err(LinkError::ConsumerSlotTaken {
                scene: consumer,
                slot,
            });
        }
        Ok(())
    }

    /// Scenes whose output `scene` reads directly.
    fn inputs_of(&self, scene: SceneId) -> impl Iterator<Item = SceneId> + '_ {
        self.links
            .iter()
            .filter(move |((consumer, _), _)| *consumer == scene)
            .flat_map(move |(_, source)| -> Vec<SceneId> {
                match source {
                    LinkSource::Scene { provider, .. } => vec![*provider],
                    LinkSource::Buffer(buffer) => self
                        .assignments
                        .iter()
                        .filter(|(_, assigned)| *assigned == buffer)
                        .map(|(s, _)| *s)
                        .collect(),
                }
            })
    }

    /// Whether `scene` reads, directly or transitively, from `provider`.
    fn depends_on(&self, scene: SceneId, provider: SceneId) -> bool {
        let mut visited = AHashSet::new();
        let mut stack = vec![scene];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            for input in self.inputs_of(current) {
                if input == provider {
                    return true;
                }
                stack.push(input);
            }
        }
        false
    }

    /// Scenes reading directly from `scene`, via a data link or a buffer it renders into.
    fn consumers_of(&self, scene: SceneId) -> Vec<SceneId> {
        let buffer = self.assigned_buffer(scene);
        self.links
            .iter()
            .filter(|(_, source)| match source {
                LinkSource::Scene { provider, .. } => *provider == scene,
                LinkSource::Buffer(id) => Some(*id) == buffer,
            })
            .map(|((consumer, _), _)| *consumer)
            .collect()
    }

    /// Adds every scene transitively consuming a dirty scene to `dirty`.
    pub fn propagate_dirtiness(&self, dirty: &mut BTreeSet<SceneId>) {
        let mut queue: Vec<SceneId> = dirty.iter().copied().collect();
        while let Some(scene) = queue.pop() {
            for consumer in self.consumers_of(scene) {
                if dirty.insert(consumer) {
                    queue.push(consumer);
                }
            }
        }
    }

    /// Values to copy this frame: links whose provider was modified plus links
    /// created since the last call.
    pub fn take_value_transfers(&mut self, modified: &BTreeSet<SceneId>) -> Vec<ValueTransfer> {
        let mut transfers: Vec<ValueTransfer> = self
            .links
            .iter()
            .filter(|(key, source)| {
                self.new_links.contains(*key)
                    || matches!(source, LinkSource::Scene { provider, .. } if modified.contains(provider))
            })
            .map(|((consumer, consumer_slot), source)| ValueTransfer {
                source: *source,
                consumer: *consumer,
                consumer_slot: *consumer_slot,
            })
            .collect();
        transfers.sort_by_key(|t| (t.consumer, t.consumer_slot));
        self.new_links.clear();
        transfers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct StubScenes {
        subscribed: Vec<SceneId>,
        slots: HashMap<(SceneId, DataSlotId), DataSlotInfo>,
    }

    impl StubScenes {
        fn with(mut self, scene: u64, slot: u32, role: SlotRole, data_type: DataSlotType) -> Self {
            let scene = SceneId(scene);
            if !self.subscribed.contains(&scene) {
                self.subscribed.push(scene);
            }
            self.slots
                .insert((scene, DataSlotId(slot)), DataSlotInfo { role, data_type });
            self
        }
    }

    impl LinkableScenes for StubScenes {
        fn is_subscribed(&self, scene: SceneId) -> bool {
            self.subscribed.contains(&scene)
        }
        fn slot(&self, scene: SceneId, slot: DataSlotId) -> Option<DataSlotInfo> {
            self.slots.get(&(scene, slot)).copied()
        }
    }

    const P: DataSlotId = DataSlotId(1);
    const C: DataSlotId = DataSlotId(2);

    fn chain_scenes() -> StubScenes {
        StubScenes::default()
            .with(1, 1, SlotRole::Provider, DataSlotType::Value)
            .with(2, 1, SlotRole::Provider, DataSlotType::Value)
            .with(2, 2, SlotRole::Consumer, DataSlotType::Value)
            .with(3, 1, SlotRole::Provider, DataSlotType::Value)
            .with(3, 2, SlotRole::Consumer, DataSlotType::Value)
            .with(1, 2, SlotRole::Consumer, DataSlotType::Value)
            .with(3, 3, SlotRole::Consumer, DataSlotType::Texture)
    }

    #[test]
    fn link_requires_matching_roles_and_types() {
        let scenes = chain_scenes();
        let mut graph = SceneLinkGraph::new();
        assert_eq!(
            graph.create_data_link(&scenes, SceneId(1), C, SceneId(2), C),
            Err(LinkError::RoleMismatch)
        );
        assert!(matches!(
            graph.create_data_link(&scenes, SceneId(1), P, SceneId(3), DataSlotId(3)),
            Err(LinkError::TypeMismatch { .. })
        ));
        assert_eq!(
            graph.create_data_link(&scenes, SceneId(9), P, SceneId(2), C),
            Err(LinkError::NotSubscribed(SceneId(9)))
        );
        assert!(graph
            .create_data_link(&scenes, SceneId(1), P, SceneId(2), C)
            .is_ok());
    }

    #[test]
    fn consumer_slot_takes_one_link() {
        let scenes = chain_scenes();
        let mut graph = SceneLinkGraph::new();
        graph
            .create_data_link(&scenes, SceneId(1), P, SceneId(2), C)
            .expect("link");
        assert!(matches!(
            graph.create_data_link(&scenes, SceneId(3), P, SceneId(2), C),
            Err(LinkError::ConsumerSlotTaken { .. })
        ));
    }

    #[test]
    fn cycles_are_refused() {
        let scenes = chain_scenes();
        let mut graph = SceneLinkGraph::new();
        graph
            .create_data_link(&scenes, SceneId(1), P, SceneId(2), C)
            .expect("1 -> 2");
        graph
            .create_data_link(&scenes, SceneId(2), P, SceneId(3), C)
            .expect("2 -> 3");
        assert_eq!(
            graph.create_data_link(&scenes, SceneId(3), P, SceneId(1), C),
            Err(LinkError::Cycle {
                provider: SceneId(3),
                consumer: SceneId(1)
            })
        );
    }

    #[test]
    fn dirtiness_propagates_transitively() {
        let scenes = chain_scenes();
        let mut graph = SceneLinkGraph::new();
        graph
            .create_data_link(&scenes, SceneId(1), P, SceneId(2), C)
            .expect("1 -> 2");
        graph
            .create_data_link(&scenes, SceneId(2), P, SceneId(3), C)
            .expect("2 -> 3");

        let mut dirty: BTreeSet<_> = [SceneId(1)].into_iter().collect();
        graph.propagate_dirtiness(&mut dirty);
        assert_eq!(dirty.into_iter().collect::<Vec<_>>(), vec![SceneId(1), SceneId(2), SceneId(3)]);
    }

    #[test]
    fn buffer_links_carry_dirtiness_from_assigned_scenes() {
        let scenes = chain_scenes();
        let mut graph = SceneLinkGraph::new();
        let buffer = OffscreenBufferId(4);
        graph
            .create_offscreen_buffer(buffer, DeviceResourceHandle(40), true)
            .expect("buffer");
        graph.assign_scene(SceneId(1), Some(buffer)).expect("assign");
        graph
            .link_offscreen_buffer(&scenes, buffer, SceneId(3), DataSlotId(3))
            .expect("buffer link");
        assert!(graph.is_interruptible(SceneId(1)));

        let mut dirty: BTreeSet<_> = [SceneId(1)].into_iter().collect();
        graph.propagate_dirtiness(&mut dirty);
        assert!(dirty.contains(&SceneId(3)));

        assert!(graph.create_offscreen_buffer(buffer, DeviceResourceHandle(41), false).is_err());
        let (texture, affected) = graph.destroy_offscreen_buffer(buffer).expect("destroy");
        assert_eq!(texture, DeviceResourceHandle(40));
        assert_eq!(affected.into_iter().collect::<Vec<_>>(), vec![SceneId(3)]);
        assert_eq!(graph.assigned_buffer(SceneId(1)), None);
    }

    #[test]
    fn assigning_a_reader_of_the_buffer_is_refused() {
        let scenes = chain_scenes();
        let mut graph = SceneLinkGraph::new();
        let buffer = OffscreenBufferId(4);
        graph
            .create_offscreen_buffer(buffer, DeviceResourceHandle(40), false)
            .expect("buffer");
        graph
            .link_offscreen_buffer(&scenes, buffer, SceneId(3), DataSlotId(3))
            .expect("buffer link");
        graph
            .create_data_link(&scenes, SceneId(3), P, SceneId(1), C)
            .expect("3 -> 1");

        assert_eq!(
            graph.assign_scene(SceneId(3), Some(buffer)),
            Err(LinkError::Cycle {
                provider: SceneId(3),
                consumer: SceneId(3)
            })
        );
        assert_eq!(
            graph.assign_scene(SceneId(1), Some(buffer)),
            Err(LinkError::Cycle {
                provider: SceneId(1),
                consumer: SceneId(3)
            })
        );
        assert_eq!(graph.assigned_buffer(SceneId(1)), None);
        graph.assign_scene(SceneId(2), Some(buffer)).expect("assign");
        assert_eq!(graph.assigned_buffer(SceneId(2)), Some(buffer));
    }

    #[test]
    fn new_links_and_modified_providers_yield_value_transfers() {
        let scenes = chain_scenes();
        let mut graph = SceneLinkGraph::new();
        graph
            .create_data_link(&scenes, SceneId(1), P, SceneId(2), C)
            .expect("link");

        let none = BTreeSet::new();
        assert_eq!(graph.take_value_transfers(&none).len(), 1);
        assert!(graph.take_value_transfers(&none).is_empty());

        let modified: BTreeSet<_> = [SceneId(1)].into_iter().collect();
        let transfers = graph.take_value_transfers(&modified);
        assert_eq!(
            transfers,
            vec![ValueTransfer {
                source: LinkSource::Scene {
                    provider: SceneId(1),
                    slot: P
                },
                consumer: SceneId(2),
                consumer_slot: C,
            }]
        );
    }

    #[test]
    fn removing_a_scene_drops_its_links() {
        let scenes = chain_scenes();
        let mut graph = SceneLinkGraph::new();
        graph
            .create_data_link(&scenes, SceneId(1), P, SceneId(2), C)
            .expect("1 -> 2");
        graph
            .create_data_link(&scenes, SceneId(2), P, SceneId(3), C)
            .expect("2 -> 3");

        let affected = graph.remove_scene(SceneId(2));
        assert_eq!(affected.into_iter().collect::<Vec<_>>(), vec![SceneId(3)]);
        assert_eq!(graph.link_count(), 0);
        assert!(matches!(
            graph.remove_data_link(SceneId(3), C),
            Err(LinkError::NotLinked { .. })
        ));
    }
}
