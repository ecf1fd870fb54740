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

mod common;

use common::{buffer_resource, shader_resource, Harness};
use tessera_agents::SceneUpdateAgent;
use tessera_core::renderer::StreamSourceId;
use tessera_core::resource::ResourceStatus;
use tessera_core::scene::{
    PublicationMode, SceneId, SceneResourceAction, SceneResourceDesc, SceneResourceHandle,
    SceneResourceKind,
};
use tessera_core::{RendererConfig, RendererEvent};

const A: SceneId = SceneId(1);
const B: SceneId = SceneId(2);

fn resident_objects(agent: &SceneUpdateAgent) -> usize {
    agent
        .resource_manager()
        .expect("display")
        .device()
        .resident_object_count()
}

#[test]
fn shared_resource_is_uploaded_once_and_unloaded_after_its_last_user() {
    // --- 1. ARRANGE ---
    let mut harness = Harness::with_display();
    harness.subscribe(A, PublicationMode::Remote);
    harness.subscribe(B, PublicationMode::Remote);
    harness.map(A);
    harness.map(B);
    let data = buffer_resource(1);

    let mut from_a = harness.update_with_actions(A, &[1]);
    from_a.resources_added = vec![data.hash];
    from_a.resource_data = vec![data.clone()];
    harness.flush(A, from_a).expect("flush");
    let mut from_b = harness.update_with_actions(B, &[1]);
    from_b.resources_added = vec![data.hash];
    harness.flush(B, from_b).expect("flush");

    // --- 2. ACT ---
    harness.frame();
    let shared_refs = harness.agent.resource_ref_count(&data.hash);
    let shared_objects = resident_objects(&harness.agent);

    harness.agent.unmap_scene(A).expect("unmap A");
    harness.frame();
    let status_with_b = harness.agent.resource_status(&data.hash);

    harness.agent.unmap_scene(B).expect("unmap B");
    harness.frame();

    // --- 3. ASSERT ---
    assert_eq!(shared_refs, 2);
    assert_eq!(shared_objects, 1);
    assert_eq!(status_with_b, ResourceStatus::Uploaded);
    assert_eq!(
        harness.agent.resource_status(&data.hash),
        ResourceStatus::Unreferenced
    );
    assert_eq!(resident_objects(&harness.agent), 0);
    let statistics = harness.agent.statistics();
    assert_eq!(statistics.resources_uploaded.get().ok(), Some(1));
    assert_eq!(statistics.resources_unloaded.get().ok(), Some(1));
}

#[test]
fn remapped_scene_reuploads_from_its_kept_payloads() {
    // --- 1. ARRANGE ---
    let mut harness = Harness::with_display();
    harness.subscribe(A, PublicationMode::Remote);
    harness.map(A);
    let data = buffer_resource(2);
    let mut update = harness.update_with_actions(A, &[1]);
    update.resources_added = vec![data.hash];
    update.resource_data = vec![data.clone()];
    harness.flush(A, update).expect("flush");
    harness.frame();
    harness.agent.unmap_scene(A).expect("unmap");
    harness.frame();
    assert_eq!(
        harness.agent.resource_status(&data.hash),
        ResourceStatus::Unreferenced
    );

    // --- 2. ACT ---
    harness.map(A);

    // --- 3. ASSERT ---
    assert_eq!(harness.agent.resource_status(&data.hash), ResourceStatus::Uploaded);
    assert_eq!(harness.agent.resource_ref_count(&data.hash), 1);
    assert_eq!(
        harness.agent.statistics().resources_uploaded.get().ok(),
        Some(2)
    );
}

#[test]
fn cached_resource_survives_a_remap_without_reupload() {
    // --- 1. ARRANGE ---
    let config = RendererConfig {
        resource_cache_size_bytes: 1024,
        ..RendererConfig::default()
    };
    let mut harness = Harness::with_display_config(config);
    harness.subscribe(A, PublicationMode::Remote);
    harness.map(A);
    let data = buffer_resource(4);
    let mut update = harness.update_with_actions(A, &[1]);
    update.resources_added = vec![data.hash];
    update.resource_data = vec![data.clone()];
    harness.flush(A, update).expect("flush");
    harness.frame();

    // --- 2. ACT ---
    harness.agent.unmap_scene(A).expect("unmap");
    harness.frame();
    let cached = harness
        .agent
        .resource_manager()
        .map(|resources| resources.cached_bytes());
    harness.map(A);

    // --- 3. ASSERT ---
    assert_eq!(cached, Some(64));
    assert_eq!(harness.agent.resource_status(&data.hash), ResourceStatus::Uploaded);
    assert_eq!(
        harness.agent.statistics().resources_uploaded.get().ok(),
        Some(1)
    );
}

#[test]
fn shader_upload_completes_asynchronously() {
    // --- 1. ARRANGE ---
    let mut harness = Harness::with_display();
    harness.subscribe(A, PublicationMode::Remote);
    harness.map(A);
    let shader = shader_resource("fn main() {}");
    let mut update = harness.update_with_actions(A, &[1]);
    update.resources_added = vec![shader.hash];
    update.resource_data = vec![shader.clone()];
    harness.flush(A, update).expect("flush");

    // --- 2. ACT ---
    let applied = harness.run_until(|agent| agent.pending_flush_count(A) == 0);

    // --- 3. ASSERT ---
    assert!(applied, "shader never uploaded");
    assert_eq!(harness.agent.resource_status(&shader.hash), ResourceStatus::Uploaded);
    assert_eq!(harness.scenes.applied_kinds(A), vec![1]);
}

#[test]
fn broken_resource_is_reported_and_never_retried() {
    // --- 1. ARRANGE ---
    let mut harness = Harness::with_display();
    harness.subscribe(A, PublicationMode::Remote);
    harness.map(A);
    let broken = shader_resource("");
    let mut update = harness.update_with_actions(A, &[1]);
    update.resources_added = vec![broken.hash];
    update.resource_data = vec![broken.clone()];
    harness.flush(A, update).expect("flush");

    // --- 2. ACT ---
    let settled = harness.run_until(|agent| {
        agent.resource_status(&broken.hash) == ResourceStatus::Broken
    });

    // --- 3. ASSERT ---
    assert!(settled);
    assert_eq!(
        harness.agent.statistics().resources_broken.get().ok(),
        Some(1)
    );
    assert_eq!(harness.agent.pending_flush_count(A), 1);
}

#[test]
fn stream_texture_is_shared_between_scenes() {
    // --- 1. ARRANGE ---
    let mut harness = Harness::with_display();
    harness.subscribe(A, PublicationMode::Remote);
    harness.subscribe(B, PublicationMode::Remote);
    harness.show(A);
    harness.map(B);
    let source = StreamSourceId(5);
    let handle = SceneResourceHandle::new(SceneResourceKind::StreamTexture, 0);
    for scene in [A, B] {
        let mut update = harness.update(scene);
        update.scene_resource_actions = vec![SceneResourceAction::Create {
            handle,
            desc: SceneResourceDesc::StreamTexture { source },
        }];
        harness.flush(scene, update).expect("flush");
    }
    harness.frame();
    harness.events();

    // --- 2. ACT ---
    harness.surfaces.create_surface(source);
    harness.surfaces.commit(source, vec![5; 16]);
    harness.frame();

    // --- 3. ASSERT ---
    let texture = harness.agent.stream_texture(source);
    assert!(texture.is_some());
    assert_eq!(harness.agent.scene_resource(A, handle), texture);
    assert_eq!(harness.agent.scene_resource(B, handle), texture);
    assert_eq!(
        harness
            .agent
            .compositing_manager()
            .map(|compositing| compositing.ref_count(source)),
        Some(2)
    );
    assert!(harness
        .events()
        .contains(&RendererEvent::StreamSurfaceAvailable { source }));
    assert_eq!(harness.agent.scenes_rerendered_last_frame(), &[A]);
    assert!(
        harness
            .agent
            .statistics()
            .stream_texture_updates
            .get()
            .unwrap_or(0)
            >= 1
    );

    harness.agent.unmap_scene(B).expect("unmap B");
    assert_eq!(harness.agent.stream_texture(source), texture);
    harness.agent.hide_scene(A).expect("hide A");
    harness.agent.unmap_scene(A).expect("unmap A");
    assert_eq!(harness.agent.stream_texture(source), None);
}

#[test]
fn scene_resources_are_recreated_when_the_scene_is_mapped() {
    // --- 1. ARRANGE ---
    let mut harness = Harness::with_display();
    harness.subscribe(A, PublicationMode::Remote);
    let handle = SceneResourceHandle::new(SceneResourceKind::TextureBuffer, 3);
    harness.scenes.with(A, |state| {
        state.scene_resources = vec![SceneResourceAction::Create {
            handle,
            desc: SceneResourceDesc::TextureBuffer {
                width: 4,
                height: 4,
            },
        }];
    });

    // --- 2. ACT ---
    harness.map(A);
    let while_mapped = harness.agent.scene_resource(A, handle);
    let objects_while_mapped = resident_objects(&harness.agent);
    harness.agent.unmap_scene(A).expect("unmap");

    // --- 3. ASSERT ---
    assert!(while_mapped.is_some());
    assert_eq!(objects_while_mapped, 1);
    assert_eq!(harness.agent.scene_resource(A, handle), None);
    assert_eq!(resident_objects(&harness.agent), 0);
}

#[test]
fn local_scene_ignores_the_scene_resource_budget() {
    // --- 1. ARRANGE ---
    let mut config = RendererConfig::default();
    config.frame_budgets.scene_resources_upload_us = 0;
    let mut harness = Harness::with_display_config(config);
    harness.subscribe(A, PublicationMode::Local);
    harness.subscribe(B, PublicationMode::Remote);
    harness.map(A);
    harness.map(B);
    let creates: Vec<SceneResourceAction> = (0..3)
        .map(|index| SceneResourceAction::Create {
            handle: SceneResourceHandle::new(SceneResourceKind::DataBuffer, index),
            desc: SceneResourceDesc::DataBuffer { byte_size: 16 },
        })
        .collect();
    for scene in [A, B] {
        let mut update = harness.update(scene);
        update.scene_resource_actions = creates.clone();
        harness.flush(scene, update).expect("flush");
    }

    // --- 2. ACT ---
    harness.frame();

    // --- 3. ASSERT ---
    let count = |scene| {
        harness
            .agent
            .resource_manager()
            .map_or(0, |resources| resources.scene_resource_count(scene))
    };
    assert_eq!(count(A), 3);
    assert_eq!(count(B), 1);
}
