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

//! Headless demo driving the scene update agent through a scripted client session.

use anyhow::{bail, Result};
use std::collections::BTreeMap;
use std::time::Duration;
use tessera_agents::SceneUpdateAgent;
use tessera_core::agent::Agent;
use tessera_core::renderer::{DisplayConfig, DisplayId, StreamSourceId};
use tessera_core::resource::{ResourceData, ResourceKind};
use tessera_core::scene::{
    DataSlotId, DataSlotInfo, DataSlotType, DataSlotValue, PublicationMode, RendererScene,
    SceneAction, SceneFactory, SceneId, SceneResourceAction, SceneResourceDesc,
    SceneResourceHandle, SceneResourceKind, SceneSizeHint, SceneState, SceneUpdate, SceneVersionTag,
    SlotRole,
};
use tessera_core::{EventBus, RendererConfig, RendererEvent};
use tessera_infra::{HeadlessPlatform, HeadlessSettings};
use tessera_telemetry::init_logging;

const DISPLAY: DisplayId = DisplayId(0);
const HUD: SceneId = SceneId(1);
const WORLD: SceneId = SceneId(2);
const VIDEO: StreamSourceId = StreamSourceId(9);
const SET_VALUE: u32 = 1;
const VALUE_SLOT: DataSlotId = DataSlotId(1);

/// Keeps the last value written to each slot and counts applied actions.
#[derive(Debug)]
struct DemoScene {
    id: SceneId,
    role: SlotRole,
    applied: usize,
    values: BTreeMap<DataSlotId, DataSlotValue>,
}

impl RendererScene for DemoScene {
    fn apply_actions(&mut self, actions: &[SceneAction]) {
        for action in actions {
            if action.kind == SET_VALUE && self.role == SlotRole::Provider {
                self.values
                    .insert(VALUE_SLOT, DataSlotValue::Bytes(action.payload.clone().into()));
            }
        }
        self.applied += actions.len();
        log::debug!("DemoScene: {} applied {} actions so far", self.id, self.applied);
    }

    fn collect_scene_resource_actions(&self) -> Vec<SceneResourceAction> {
        Vec::new()
    }

    fn data_slot(&self, slot: DataSlotId) -> Option<DataSlotInfo> {
        (slot == VALUE_SLOT).then_some(DataSlotInfo {
            role: self.role,
            data_type: DataSlotType::Value,
        })
    }

    fn read_data_slot(&self, slot: DataSlotId) -> Option<DataSlotValue> {
        self.values.get(&slot).cloned()
    }

    fn write_data_slot(&mut self, slot: DataSlotId, value: DataSlotValue) {
        if let DataSlotValue::Bytes(bytes) = &value {
            log::info!("DemoScene: {} received {:?} on {slot:?}", self.id, bytes);
        }
        self.values.insert(slot, value);
    }
}

struct DemoSceneFactory;

impl SceneFactory for DemoSceneFactory {
    fn create_scene(&self, scene: SceneId, _size_hint: SceneSizeHint) -> Box<dyn RendererScene> {
        let role = if scene == HUD {
            SlotRole::Provider
        } else {
            SlotRole::Consumer
        };
        Box::new(DemoScene {
            id: scene,
            role,
            applied: 0,
            values: BTreeMap::new(),
        })
    }
}

/// Client-side bookkeeping: the next flush index of each scene.
#[derive(Default)]
struct Client {
    next_flush: BTreeMap<SceneId, u64>,
}

impl Client {
    fn update(&mut self, scene: SceneId) -> SceneUpdate {
        let index = self.next_flush.entry(scene).or_insert(0);
        let update = SceneUpdate::new(*index);
        *index += 1;
        update
    }
}

fn run_frames(agent: &mut SceneUpdateAgent, bus: &EventBus<RendererEvent>, frames: usize) {
    for _ in 0..frames {
        agent.update();
        for event in bus.drain() {
            log::info!("Sandbox: {event:?}");
        }
        std::thread::sleep(Duration::from_millis(2));
    }
}

fn wait_for(
    agent: &mut SceneUpdateAgent,
    bus: &EventBus<RendererEvent>,
    scene: SceneId,
    state: SceneState,
) -> Result<()> {
    for _ in 0..200 {
        if agent.scene_state(scene) == state {
            return Ok(());
        }
        run_frames(agent, bus, 1);
    }
    bail!("{scene} did not reach {state}, stuck in {}", agent.scene_state(scene))
}

fn main() -> Result<()> {
    init_logging();

    // 1. Configuration, optionally from a JSON file.
    let config = match std::env::args().nth(1) {
        Some(path) => RendererConfig::from_file(&path)?,
        None => RendererConfig::default(),
    };
    let platform =
        HeadlessPlatform::new(HeadlessSettings::with_upload_poll_ms(config.upload_queue_poll_ms));
    let surfaces = platform.surfaces();
    let bus = EventBus::new();
    let mut agent = SceneUpdateAgent::new(
        config,
        Box::new(platform),
        Box::new(DemoSceneFactory),
        bus.sink(),
    )?;
    let mut client = Client::default();

    // 2. Display.
    agent.create_display(DISPLAY, &DisplayConfig::default())?;

    // 3. Publish and subscribe both scenes.
    agent.publish_scene(HUD, PublicationMode::Local)?;
    agent.publish_scene(WORLD, PublicationMode::Remote)?;
    let shader = ResourceData::new(ResourceKind::Shader, "fn main() {}".as_bytes().to_vec());
    let mesh = ResourceData::new(ResourceKind::Buffer, vec![0u8; 256]);
    for scene in [HUD, WORLD] {
        agent.request_subscription(scene)?;
        agent.handle_scene_received(scene, SceneSizeHint::default())?;
        let mut initial = client.update(scene);
        initial.resources_added = vec![shader.hash, mesh.hash];
        initial.resource_data = vec![shader.clone(), mesh.clone()];
        agent.handle_scene_update(scene, initial)?;
    }
    agent.create_data_link(HUD, VALUE_SLOT, WORLD, VALUE_SLOT)?;

    // 4. Map and show.
    for scene in [HUD, WORLD] {
        agent.request_map(scene)?;
    }
    for scene in [HUD, WORLD] {
        wait_for(&mut agent, &bus, scene, SceneState::Mapped)?;
        agent.request_show(scene)?;
    }
    run_frames(&mut agent, &bus, 1);

    // 5. A compositor client starts streaming into the world scene.
    surfaces.create_surface(VIDEO);
    let mut stream = client.update(WORLD);
    stream.scene_resource_actions = vec![SceneResourceAction::Create {
        handle: SceneResourceHandle::new(SceneResourceKind::StreamTexture, 0),
        desc: SceneResourceDesc::StreamTexture { source: VIDEO },
    }];
    agent.handle_scene_update(WORLD, stream)?;

    // 6. Steady state.
    for frame in 0u8..30 {
        let mut tick = client.update(HUD);
        tick.actions = vec![SceneAction::new(SET_VALUE, vec![frame])];
        tick.version_tag = Some(SceneVersionTag(u64::from(frame / 10)));
        agent.handle_scene_update(HUD, tick)?;
        surfaces.commit(VIDEO, vec![frame; 16]);
        run_frames(&mut agent, &bus, 1);
    }

    let status = agent.report_status();
    log::info!(
        "Sandbox: health {:.2}, stalled: {}, {}",
        status.health_score,
        status.is_stalled,
        status.message
    );

    // 7. Tear everything down.
    surfaces.destroy_surface(VIDEO);
    for scene in [HUD, WORLD] {
        agent.unpublish_scene(scene)?;
    }
    run_frames(&mut agent, &bus, 2);
    agent.destroy_display()?;
    for event in bus.drain() {
        log::info!("Sandbox: {event:?}");
    }

    println!("{}", agent.metrics().snapshot_json()?);
    Ok(())
}
