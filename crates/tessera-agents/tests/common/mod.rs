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

//! Shared fixtures: a scriptable scene graph and a headless agent harness.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tessera_agents::{SceneUpdateAgent, UpdateRejection};
use tessera_core::agent::Agent;
use tessera_core::renderer::{DisplayConfig, DisplayId};
use tessera_core::resource::{ResourceData, ResourceKind};
use tessera_core::scene::{
    DataSlotId, DataSlotInfo, DataSlotType, DataSlotValue, PublicationMode, RendererScene,
    SceneAction, SceneFactory, SceneId, SceneResourceAction, SceneSizeHint, SceneState,
    SceneUpdate, SlotRole,
};
use tessera_core::{EventBus, RendererConfig, RendererEvent};
use tessera_infra::{HeadlessPlatform, HeadlessSettings, SurfaceScript};

pub const DISPLAY: DisplayId = DisplayId(0);

/// What a stub scene recorded and exposes.
#[derive(Debug, Default)]
pub struct StubState {
    /// Every action applied, in order.
    pub applied: Vec<SceneAction>,
    /// Returned from `collect_scene_resource_actions`.
    pub scene_resources: Vec<SceneResourceAction>,
    pub slots: BTreeMap<DataSlotId, DataSlotInfo>,
    pub values: BTreeMap<DataSlotId, DataSlotValue>,
    pub animating: bool,
}

/// Shared access to the state of every stub scene, created or not.
#[derive(Debug, Clone, Default)]
pub struct StubScenes(Arc<Mutex<HashMap<SceneId, Arc<Mutex<StubState>>>>>);

impl StubScenes {
    pub fn state(&self, scene: SceneId) -> Arc<Mutex<StubState>> {
        let mut scenes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        scenes.entry(scene).or_default().clone()
    }

    pub fn with<R>(&self, scene: SceneId, f: impl FnOnce(&mut StubState) -> R) -> R {
        let state = self.state(scene);
        let mut guard = state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn applied_kinds(&self, scene: SceneId) -> Vec<u32> {
        self.with(scene, |state| state.applied.iter().map(|a| a.kind).collect())
    }

    pub fn declare_slot(&self, scene: SceneId, slot: u32, role: SlotRole, data_type: DataSlotType) {
        self.with(scene, |state| {
            state
                .slots
                .insert(DataSlotId(slot), DataSlotInfo { role, data_type });
        });
    }

    pub fn value(&self, scene: SceneId, slot: u32) -> Option<DataSlotValue> {
        self.with(scene, |state| state.values.get(&DataSlotId(slot)).cloned())
    }
}

/// Applying an action whose kind names a provider slot stores its payload there.
#[derive(Debug)]
pub struct StubScene {
    state: Arc<Mutex<StubState>>,
}

impl StubScene {
    fn lock(&self) -> std::sync::MutexGuard<'_, StubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RendererScene for StubScene {
    fn apply_actions(&mut self, actions: &[SceneAction]) {
        let mut state = self.lock();
        for action in actions {
            let slot = DataSlotId(action.kind);
            if state
                .slots
                .get(&slot)
                .is_some_and(|info| info.role == SlotRole::Provider)
            {
                let value = DataSlotValue::Bytes(action.payload.clone().into());
                state.values.insert(slot, value);
            }
            state.applied.push(action.clone());
        }
    }

    fn collect_scene_resource_actions(&self) -> Vec<SceneResourceAction> {
        self.lock().scene_resources.clone()
    }

    fn has_active_animations(&self) -> bool {
        self.lock().animating
    }

    fn data_slot(&self, slot: DataSlotId) -> Option<DataSlotInfo> {
        self.lock().slots.get(&slot).copied()
    }

    fn read_data_slot(&self, slot: DataSlotId) -> Option<DataSlotValue> {
        self.lock().values.get(&slot).cloned()
    }

    fn write_data_slot(&mut self, slot: DataSlotId, value: DataSlotValue) {
        self.lock().values.insert(slot, value);
    }
}

pub struct StubFactory(pub StubScenes);

impl SceneFactory for StubFactory {
    fn create_scene(&self, scene: SceneId, _size_hint: SceneSizeHint) -> Box<dyn RendererScene> {
        Box::new(StubScene {
            state: self.0.state(scene),
        })
    }
}

/// An agent on a headless platform with helpers for the client side.
pub struct Harness {
    pub bus: EventBus<RendererEvent>,
    pub agent: SceneUpdateAgent,
    pub scenes: StubScenes,
    pub surfaces: SurfaceScript,
    next_flush: HashMap<SceneId, u64>,
}

impl Harness {
    pub fn new(config: RendererConfig) -> Self {
        Self::with_platform(config, HeadlessSettings::with_upload_poll_ms(1))
    }

    pub fn with_platform(config: RendererConfig, settings: HeadlessSettings) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let platform = HeadlessPlatform::new(settings);
        let surfaces = platform.surfaces();
        let scenes = StubScenes::default();
        let bus = EventBus::new();
        let agent = SceneUpdateAgent::new(
            config,
            Box::new(platform),
            Box::new(StubFactory(scenes.clone())),
            bus.sink(),
        )
        .expect("valid config");
        Self {
            bus,
            agent,
            scenes,
            surfaces,
            next_flush: HashMap::new(),
        }
    }

    /// Default config with a display already created.
    pub fn with_display() -> Self {
        Self::with_display_config(RendererConfig::default())
    }

    pub fn with_display_config(config: RendererConfig) -> Self {
        let mut harness = Self::new(config);
        harness
            .agent
            .create_display(DISPLAY, &DisplayConfig::default())
            .expect("display");
        harness.events();
        harness
    }

    pub fn events(&self) -> Vec<RendererEvent> {
        self.bus.drain()
    }

    pub fn frame(&mut self) {
        self.agent.update();
    }

    /// Runs frames until `done` holds, giving the upload thread time to work.
    pub fn run_until(&mut self, done: impl Fn(&SceneUpdateAgent) -> bool) -> bool {
        for _ in 0..500 {
            self.agent.update();
            if done(&self.agent) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    /// Publishes, subscribes and delivers the initial (empty) flush.
    pub fn subscribe(&mut self, scene: SceneId, mode: PublicationMode) {
        self.agent.publish_scene(scene, mode).expect("publish");
        self.agent.request_subscription(scene).expect("request");
        self.agent
            .handle_scene_received(scene, SceneSizeHint::default())
            .expect("receive");
        self.next_flush.insert(scene, 0);
        let update = self.update(scene);
        self.agent
            .handle_scene_update(scene, update)
            .expect("initial flush");
        assert_eq!(self.agent.scene_state(scene), SceneState::Subscribed);
    }

    pub fn map(&mut self, scene: SceneId) {
        self.agent.request_map(scene).expect("request map");
        assert!(
            self.run_until(|agent| agent.scene_state(scene) == SceneState::Mapped),
            "{scene} did not map"
        );
    }

    pub fn show(&mut self, scene: SceneId) {
        self.map(scene);
        self.agent.request_show(scene).expect("request show");
        self.frame();
        assert_eq!(self.agent.scene_state(scene), SceneState::Rendered);
    }

    /// An empty update carrying the scene's next flush index.
    pub fn update(&mut self, scene: SceneId) -> SceneUpdate {
        let index = self.next_flush.entry(scene).or_insert(0);
        let update = SceneUpdate::new(*index);
        *index += 1;
        update
    }

    /// An update with one action of each given kind.
    pub fn update_with_actions(&mut self, scene: SceneId, kinds: &[u32]) -> SceneUpdate {
        let mut update = self.update(scene);
        update.actions = kinds.iter().map(|kind| SceneAction::new(*kind, Vec::new())).collect();
        update
    }

    pub fn flush(&mut self, scene: SceneId, update: SceneUpdate) -> Result<(), UpdateRejection> {
        self.agent.handle_scene_update(scene, update)
    }
}

pub fn buffer_resource(seed: u8) -> ResourceData {
    ResourceData::new(ResourceKind::Buffer, vec![seed; 64])
}

pub fn shader_resource(source: &str) -> ResourceData {
    ResourceData::new(ResourceKind::Shader, source.as_bytes().to_vec())
}
