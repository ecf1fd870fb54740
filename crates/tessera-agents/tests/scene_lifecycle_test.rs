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

use common::Harness;
use tessera_agents::UpdateRejection;
use tessera_core::scene::{PublicationMode, SceneId, SceneState};
use tessera_core::{RendererConfig, RendererEvent};
use tessera_lanes::scene_lane::{SceneTransition, TransitionError};

const A: SceneId = SceneId(1);
const B: SceneId = SceneId(2);

#[test]
fn illegal_requests_are_refused_with_failure_events() {
    // --- 1. ARRANGE ---
    let mut harness = Harness::with_display();
    harness
        .agent
        .publish_scene(A, PublicationMode::Remote)
        .expect("publish");
    harness.events();

    // --- 2. ACT ---
    let map = harness.agent.request_map(A);
    let hide = harness.agent.hide_scene(A);
    let unsubscribe = harness.agent.unsubscribe_scene(A);

    // --- 3. ASSERT ---
    assert_eq!(
        map,
        Err(UpdateRejection::Transition(TransitionError::Illegal {
            scene: A,
            from: SceneState::Published,
            transition: SceneTransition::RequestMap,
        }))
    );
    assert!(hide.is_err());
    assert!(unsubscribe.is_err());
    assert_eq!(harness.agent.scene_state(A), SceneState::Published);
    assert_eq!(
        harness.events(),
        vec![
            RendererEvent::SceneMapFailed { scene: A },
            RendererEvent::SceneHideFailed { scene: A },
            RendererEvent::SceneUnsubscribeFailed { scene: A },
        ]
    );
}

#[test]
fn scene_goes_up_to_rendered_and_back_down_on_unpublish() {
    // --- 1. ARRANGE ---
    let mut harness = Harness::with_display();
    harness.subscribe(A, PublicationMode::Remote);
    harness.show(A);
    let up = harness.events();

    // --- 2. ACT ---
    harness.agent.unpublish_scene(A).expect("unpublish");

    // --- 3. ASSERT ---
    assert_eq!(
        up,
        vec![
            RendererEvent::ScenePublished { scene: A },
            RendererEvent::SceneSubscribed { scene: A },
            RendererEvent::SceneMapped { scene: A },
            RendererEvent::SceneShown { scene: A },
        ]
    );
    assert_eq!(
        harness.events(),
        vec![
            RendererEvent::SceneHiddenIndirect { scene: A },
            RendererEvent::SceneUnmappedIndirect { scene: A },
            RendererEvent::SceneUnsubscribedIndirect { scene: A },
            RendererEvent::SceneUnpublished { scene: A },
        ]
    );
    assert_eq!(harness.agent.scene_state(A), SceneState::Unpublished);
    assert_eq!(harness.agent.pending_flush_count(A), 0);
}

#[test]
fn hide_while_show_is_pending_fails_the_show() {
    // --- 1. ARRANGE ---
    let mut harness = Harness::with_display();
    harness.subscribe(A, PublicationMode::Remote);
    harness.map(A);
    harness.agent.request_show(A).expect("request show");
    harness.events();

    // --- 2. ACT ---
    harness.agent.hide_scene(A).expect("hide");

    // --- 3. ASSERT ---
    assert_eq!(harness.agent.scene_state(A), SceneState::Mapped);
    assert_eq!(
        harness.events(),
        vec![
            RendererEvent::SceneShowFailed { scene: A },
            RendererEvent::SceneHidden { scene: A },
        ]
    );
}

#[test]
fn flushes_before_the_scene_arrives_are_discarded() {
    // --- 1. ARRANGE ---
    let mut harness = Harness::new(RendererConfig::default());
    harness
        .agent
        .publish_scene(A, PublicationMode::Remote)
        .expect("publish");
    harness.agent.request_subscription(A).expect("request");

    // --- 2. ACT ---
    let update = harness.update(A);
    let result = harness.flush(A, update);

    // --- 3. ASSERT ---
    assert_eq!(result, Err(UpdateRejection::NotSubscribed(A)));
    assert_eq!(harness.agent.scene_state(A), SceneState::SubscriptionRequested);
    assert_eq!(harness.agent.pending_flush_count(A), 0);
}

#[test]
fn remote_scene_is_force_unsubscribed_but_local_scene_is_kept() {
    // --- 1. ARRANGE ---
    let config = RendererConfig {
        max_pending_flushes_to_force_apply: 2,
        max_pending_flushes_to_force_unsubscribe: 4,
        ..RendererConfig::default()
    };
    let mut harness = Harness::new(config);
    harness.subscribe(A, PublicationMode::Remote);
    harness.subscribe(B, PublicationMode::Local);
    harness.events();

    // --- 2. ACT ---
    let mut remote_results = Vec::new();
    let mut local_results = Vec::new();
    for kind in 1..=5 {
        let update = harness.update_with_actions(A, &[kind]);
        remote_results.push(harness.flush(A, update));
        let update = harness.update_with_actions(B, &[kind]);
        local_results.push(harness.flush(B, update));
    }
    let unsubscribed_events = harness
        .events()
        .into_iter()
        .filter(|event| *event == RendererEvent::SceneUnsubscribedIndirect { scene: A })
        .count();
    let late = harness.update_with_actions(A, &[6]);
    let late_result = harness.flush(A, late);

    // --- 3. ASSERT ---
    assert!(remote_results[..4].iter().all(Result::is_ok));
    assert_eq!(remote_results[4], Err(UpdateRejection::ForceUnsubscribed(A)));
    assert_eq!(harness.agent.scene_state(A), SceneState::Published);
    assert_eq!(unsubscribed_events, 1);
    assert_eq!(late_result, Err(UpdateRejection::NotSubscribed(A)));
    assert_eq!(harness.agent.pending_flush_count(A), 0);

    assert!(local_results.iter().all(Result::is_ok));
    assert_eq!(harness.agent.scene_state(B), SceneState::Subscribed);
    assert_eq!(harness.agent.pending_flush_count(B), 6);
    assert_eq!(
        harness.agent.statistics().force_unsubscribes.get().ok(),
        Some(1)
    );
}

#[test]
fn force_unsubscribed_scene_can_subscribe_again() {
    // --- 1. ARRANGE ---
    let config = RendererConfig {
        max_pending_flushes_to_force_apply: 1,
        max_pending_flushes_to_force_unsubscribe: 2,
        ..RendererConfig::default()
    };
    let mut harness = Harness::new(config);
    harness.subscribe(A, PublicationMode::Remote);
    for kind in 1..=3 {
        let update = harness.update_with_actions(A, &[kind]);
        let _ = harness.flush(A, update);
    }
    assert_eq!(harness.agent.scene_state(A), SceneState::Published);

    // --- 2. ACT ---
    harness.agent.request_subscription(A).expect("request");
    harness
        .agent
        .handle_scene_received(A, Default::default())
        .expect("receive");
    let result = harness.flush(A, tessera_core::scene::SceneUpdate::new(0));

    // --- 3. ASSERT ---
    assert!(result.is_ok());
    assert_eq!(harness.agent.scene_state(A), SceneState::Subscribed);
    assert_eq!(harness.agent.pending_flush_count(A), 1);
}

#[test]
fn refused_queries_leave_the_scene_alone() {
    // --- 1. ARRANGE ---
    let mut harness = Harness::new(RendererConfig::default());
    harness.subscribe(A, PublicationMode::Remote);

    // --- 2. ACT ---
    let can_map_without_display = harness.agent.can_transition(A, SceneTransition::RequestMap);
    let can_show = harness.agent.can_transition(A, SceneTransition::RequestShow);
    let can_unsubscribe = harness.agent.can_transition(A, SceneTransition::Unsubscribe);

    // --- 3. ASSERT ---
    assert!(!can_map_without_display);
    assert!(!can_show);
    assert!(can_unsubscribe);
    assert_eq!(harness.agent.scene_state(A), SceneState::Subscribed);
}
