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

//! The scene update agent: lifecycles, flushes and resources of one display.

use super::error::UpdateRejection;
use super::links::{transfer_linked_values, LinkView};
use super::statistics::RendererStatistics;
use crate::resource_agent::{format_missing_resources, EmbeddedCompositingManager, ResourceManager};
use ahash::AHashMap;
use std::any::Any;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use tessera_core::agent::{Agent, AgentId, AgentStatus, FrameBudget};
use tessera_core::event::{EventSink, FlushRejectReason, SceneResourceStatus};
use tessera_core::renderer::{
    DeviceResourceHandle, DisplayConfig, DisplayId, OffscreenBufferId, PlatformFactory,
    StreamSourceId, TextureDesc,
};
use tessera_core::resource::{ResourceContentHash, ResourceStatus};
use tessera_core::scene::{
    DataSlotId, PublicationMode, RendererScene, SceneFactory, SceneId, SceneResourceHandle,
    SceneSizeHint, SceneState, SceneUpdate,
};
use tessera_core::{FrameSection, FrameTimer, RendererConfig, RendererEvent, Stopwatch};
use tessera_data::staging::{PendingFlush, StagingInfo};
use tessera_lanes::link_lane::{LinkError, SceneLinkGraph};
use tessera_lanes::scene_lane::{
    SceneExpirationMonitor, SceneStateExecutor, SceneTransition, TeardownStep,
};
use tessera_telemetry::{MetricsRegistry, ScopedMetricTimer};

/// A scene whose content arrived from its client.
#[derive(Debug)]
pub(super) struct ReceivedScene {
    pub(super) content: Box<dyn RendererScene>,
    pub(super) staging: StagingInfo,
}

/// Everything that only exists while a display does.
#[derive(Debug)]
struct DisplayRuntime {
    id: DisplayId,
    resources: ResourceManager,
    compositing: EmbeddedCompositingManager,
}

/// Drives every scene of one display through its lifecycle.
///
/// Client commands (publish, subscribe, flush, map, show...) are handled as
/// they arrive. The work that needs the device happens in [`Agent::update`],
/// once per frame:
///
/// 1. arrived resource payloads are handed over and uploaded,
/// 2. pending flushes are applied once their resources are resident,
/// 3. scene-local resource actions are executed,
/// 4. stream textures are refreshed from the compositor,
/// 5. mapping and showing scenes advance,
/// 6. linked data flows from providers to consumers,
/// 7. the re-rendered scenes are collected and expirations are checked.
pub struct SceneUpdateAgent {
    config: RendererConfig,
    platform: Box<dyn PlatformFactory + Send>,
    scene_factory: Box<dyn SceneFactory>,
    events: EventSink<RendererEvent>,
    executor: SceneStateExecutor,
    expiration: SceneExpirationMonitor,
    links: SceneLinkGraph,
    scenes: AHashMap<SceneId, ReceivedScene>,
    display: Option<DisplayRuntime>,
    priorities: AHashMap<SceneId, i32>,
    timer: FrameTimer,
    mapping_started: AHashMap<SceneId, Instant>,
    modified: BTreeSet<SceneId>,
    rerendered: Vec<SceneId>,
    render_interrupted: bool,
    statistics: RendererStatistics,
    frame_count: u64,
    last_update: Duration,
}

impl SceneUpdateAgent {
    /// Creates an agent without a display.
    pub fn new(
        config: RendererConfig,
        platform: Box<dyn PlatformFactory + Send>,
        scene_factory: Box<dyn SceneFactory>,
        events: EventSink<RendererEvent>,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let statistics = RendererStatistics::register(&MetricsRegistry::new())?;
        let mut timer = FrameTimer::new();
        config.frame_budgets.apply_to(&mut timer);
        log::info!(
            "SceneUpdateAgent: created (force apply after {}, force unsubscribe after {} pending flushes)",
            config.max_pending_flushes_to_force_apply,
            config.max_pending_flushes_to_force_unsubscribe
        );

        Ok(Self {
            executor: SceneStateExecutor::new(events.clone()),
            expiration: SceneExpirationMonitor::new(events.clone()),
            links: SceneLinkGraph::new(),
            scenes: AHashMap::new(),
            display: None,
            priorities: AHashMap::new(),
            timer,
            mapping_started: AHashMap::new(),
            modified: BTreeSet::new(),
            rerendered: Vec::new(),
            render_interrupted: false,
            statistics,
            frame_count: 0,
            last_update: Duration::ZERO,
            config,
            platform,
            scene_factory,
            events,
        })
    }

    // --- Queries ---

    /// Active configuration.
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Counters and gauges of this agent.
    pub fn statistics(&self) -> &RendererStatistics {
        &self.statistics
    }

    /// Registry holding [`statistics`](Self::statistics).
    pub fn metrics(&self) -> &MetricsRegistry {
        self.statistics.registry()
    }

    /// Lifecycle state of a scene, `Unpublished` when unknown.
    pub fn scene_state(&self, scene: SceneId) -> SceneState {
        self.executor.state(scene)
    }

    /// Publication mode given when the scene was published.
    pub fn publication_mode(&self, scene: SceneId) -> Option<PublicationMode> {
        self.executor.publication_mode(scene)
    }

    /// Flushes received for the scene and not applied yet.
    pub fn pending_flush_count(&self, scene: SceneId) -> usize {
        self.scenes
            .get(&scene)
            .map_or(0, |received| received.staging.pending_flush_count())
    }

    /// Display currently driven by this agent.
    pub fn display(&self) -> Option<DisplayId> {
        self.display.as_ref().map(|runtime| runtime.id)
    }

    /// Resource manager of the display.
    pub fn resource_manager(&self) -> Option<&ResourceManager> {
        self.display.as_ref().map(|runtime| &runtime.resources)
    }

    /// Stream texture manager of the display.
    pub fn compositing_manager(&self) -> Option<&EmbeddedCompositingManager> {
        self.display.as_ref().map(|runtime| &runtime.compositing)
    }

    /// Lifecycle of a client resource, `Unreferenced` without a display.
    pub fn resource_status(&self, hash: &ResourceContentHash) -> ResourceStatus {
        self.resource_manager()
            .map_or(ResourceStatus::Unreferenced, |resources| resources.resource_status(hash))
    }

    /// Number of scenes referencing a client resource.
    pub fn resource_ref_count(&self, hash: &ResourceContentHash) -> usize {
        self.resource_manager()
            .map_or(0, |resources| resources.ref_count(hash))
    }

    /// Texture backing a stream source.
    pub fn stream_texture(&self, source: StreamSourceId) -> Option<DeviceResourceHandle> {
        self.compositing_manager()
            .and_then(|compositing| compositing.stream_texture(source))
    }

    /// Device object backing a scene-local resource.
    pub fn scene_resource(
        &self,
        scene: SceneId,
        handle: SceneResourceHandle,
    ) -> Option<DeviceResourceHandle> {
        self.resource_manager()
            .and_then(|resources| resources.scene_resource(scene, handle))
    }

    /// Links and offscreen buffers.
    pub fn link_graph(&self) -> &SceneLinkGraph {
        &self.links
    }

    /// Whether the scene's rendered content is past its expiration.
    pub fn is_scene_expired(&self, scene: SceneId) -> bool {
        self.expiration.is_expired(scene)
    }

    /// Shown scenes whose content changed during the last frame.
    pub fn scenes_rerendered_last_frame(&self) -> &[SceneId] {
        &self.rerendered
    }

    /// Whether rendering into interruptible buffers is suspended.
    pub fn is_render_interrupted(&self) -> bool {
        self.render_interrupted
    }

    /// Whether `transition` can be requested for the scene now.
    pub fn can_transition(&self, scene: SceneId, transition: SceneTransition) -> bool {
        let allowed = self.executor.can_transition(scene, transition)
            && (transition != SceneTransition::RequestMap || self.display.is_some());
        if !allowed {
            log::warn!(
                "SceneUpdateAgent: {scene} cannot take {transition:?} from {}",
                self.executor.state(scene)
            );
        }
        allowed
    }

    // --- Display ---

    /// Creates the display all mapped scenes render to.
    pub fn create_display(
        &mut self,
        display: DisplayId,
        config: &DisplayConfig,
    ) -> Result<(), UpdateRejection> {
        if let Some(existing) = &self.display {
            let existing = existing.id;
            let reason = format!("display {} is already active", existing.0);
            log::error!("SceneUpdateAgent: cannot create display {}: {reason}", display.0);
            self.events.emit(RendererEvent::DisplayCreateFailed { display, reason });
            return Err(UpdateRejection::DisplayExists(existing));
        }

        match self.platform.create_render_backend(display, config) {
            Ok(backend) => {
                let mut resources = ResourceManager::new(
                    backend.device,
                    backend.upload_backend,
                    self.config.resource_cache_size_bytes,
                );
                for (scene, priority) in &self.priorities {
                    resources.set_scene_priority(*scene, *priority);
                }
                self.display = Some(DisplayRuntime {
                    id: display,
                    resources,
                    compositing: EmbeddedCompositingManager::new(backend.compositor),
                });
                log::info!(
                    "SceneUpdateAgent: display {} created ({}x{})",
                    display.0,
                    config.width,
                    config.height
                );
                self.events.emit(RendererEvent::DisplayCreated { display });
                Ok(())
            }
            Err(e) => {
                log::error!("SceneUpdateAgent: failed to create display {}: {e}", display.0);
                self.events.emit(RendererEvent::DisplayCreateFailed {
                    display,
                    reason: e.to_string(),
                });
                Err(e.into())
            }
        }
    }

    /// Destroys the display. Refused while any scene is mapping or mapped.
    pub fn destroy_display(&mut self) -> Result<(), UpdateRejection> {
        let Some(display) = self.display() else {
            log::warn!("SceneUpdateAgent: no display to destroy");
            return Err(UpdateRejection::NoDisplay);
        };
        if self
            .executor
            .any_scene_at_least(SceneState::MappingAndUploading)
        {
            log::warn!(
                "SceneUpdateAgent: display {} still has mapped scenes",
                display.0
            );
            self.events
                .emit(RendererEvent::DisplayDestroyFailed { display });
            return Err(UpdateRejection::DisplayInUse(display));
        }

        for buffer in self.links.buffers() {
            if let Err(e) = self.destroy_offscreen_buffer(buffer) {
                log::error!("SceneUpdateAgent: failed to destroy {buffer:?}: {e}");
            }
        }
        if let Some(mut runtime) = self.display.take() {
            let DisplayRuntime {
                resources,
                compositing,
                ..
            } = &mut runtime;
            resources.release_all(compositing);
        }
        log::info!("SceneUpdateAgent: display {} destroyed", display.0);
        self.events.emit(RendererEvent::DisplayDestroyed { display });
        Ok(())
    }

    // --- Scene lifecycle ---

    /// Announces a scene of a client.
    pub fn publish_scene(
        &mut self,
        scene: SceneId,
        mode: PublicationMode,
    ) -> Result<(), UpdateRejection> {
        self.executor.publish(scene, mode)?;
        Ok(())
    }

    /// Withdraws a scene, tearing down whatever it reached.
    pub fn unpublish_scene(&mut self, scene: SceneId) -> Result<(), UpdateRejection> {
        if self.executor.state(scene) == SceneState::Unpublished {
            self.executor
                .check_transition(scene, SceneTransition::Unpublish)?;
        }
        self.tear_down_to(scene, SceneState::Unpublished);
        self.priorities.remove(&scene);
        Ok(())
    }

    /// Asks the client for the scene content.
    pub fn request_subscription(&mut self, scene: SceneId) -> Result<(), UpdateRejection> {
        self.executor
            .apply(scene, SceneTransition::RequestSubscription)?;
        Ok(())
    }

    /// The client sent the scene; its first flush completes the subscription.
    pub fn handle_scene_received(
        &mut self,
        scene: SceneId,
        size_hint: SceneSizeHint,
    ) -> Result<(), UpdateRejection> {
        self.executor.apply(scene, SceneTransition::ReceiveScene)?;
        let content = self.scene_factory.create_scene(scene, size_hint);
        self.scenes.insert(
            scene,
            ReceivedScene {
                content,
                staging: StagingInfo::new(size_hint),
            },
        );
        Ok(())
    }

    /// Drops the scene content.
    pub fn unsubscribe_scene(&mut self, scene: SceneId) -> Result<(), UpdateRejection> {
        self.executor
            .check_transition(scene, SceneTransition::Unsubscribe)?;
        self.reset_render_interruption();
        self.release_subscription(scene);
        self.executor.apply(scene, SceneTransition::Unsubscribe)?;
        Ok(())
    }

    /// Requests the scene to be mapped to the display.
    pub fn request_map(&mut self, scene: SceneId) -> Result<(), UpdateRejection> {
        if self.display.is_none() {
            log::warn!("SceneUpdateAgent: cannot map {scene} without a display");
            self.events.emit(RendererEvent::SceneMapFailed { scene });
            return Err(UpdateRejection::NoDisplay);
        }
        self.executor.apply(scene, SceneTransition::RequestMap)?;
        Ok(())
    }

    /// Unmaps the scene, releasing its device resources.
    pub fn unmap_scene(&mut self, scene: SceneId) -> Result<(), UpdateRejection> {
        self.executor.check_transition(scene, SceneTransition::Unmap)?;
        self.reset_render_interruption();
        self.release_mapping(scene);
        self.executor.apply(scene, SceneTransition::Unmap)?;
        Ok(())
    }

    /// Requests the scene to be shown.
    pub fn request_show(&mut self, scene: SceneId) -> Result<(), UpdateRejection> {
        self.executor.apply(scene, SceneTransition::RequestShow)?;
        Ok(())
    }

    /// Hides a shown scene or cancels a pending show.
    pub fn hide_scene(&mut self, scene: SceneId) -> Result<(), UpdateRejection> {
        self.executor.check_transition(scene, SceneTransition::Hide)?;
        self.expiration.on_hidden(scene);
        self.executor.apply(scene, SceneTransition::Hide)?;
        Ok(())
    }

    /// Upload priority of the scene's resources; higher goes first.
    pub fn set_scene_priority(&mut self, scene: SceneId, priority: i32) {
        self.priorities.insert(scene, priority);
        if let Some(runtime) = self.display.as_mut() {
            runtime.resources.set_scene_priority(scene, priority);
        }
    }

    /// Suspends or resumes flushes of scenes rendering into interruptible buffers.
    pub fn set_render_interrupted(&mut self, interrupted: bool) {
        if self.render_interrupted != interrupted {
            log::debug!("SceneUpdateAgent: render interrupted = {interrupted}");
        }
        self.render_interrupted = interrupted;
    }

    // --- Flushes ---

    /// Queues a flush sent by the client.
    ///
    /// Flushes must arrive with consecutive indices. A remote scene that
    /// piles up more than `max_pending_flushes_to_force_unsubscribe` flushes
    /// is unsubscribed.
    pub fn handle_scene_update(
        &mut self,
        scene: SceneId,
        update: SceneUpdate,
    ) -> Result<(), UpdateRejection> {
        let state = self.executor.state(scene);
        let Some(received) = self
            .scenes
            .get_mut(&scene)
            .filter(|_| state.accepts_flushes())
        else {
            log::warn!(
                "SceneUpdateAgent: discarding flush {} of {scene} in state {state}",
                update.flush_index
            );
            return Err(UpdateRejection::NotSubscribed(scene));
        };

        // 1. Ordering.
        if let Err(reason) = received.staging.check_flush_index(update.flush_index) {
            let FlushRejectReason::IndexGap { expected, received } = reason;
            log::error!("SceneUpdateAgent: {scene} sent flush {received}, expected {expected}");
            RendererStatistics::bump(&self.statistics.flushes_rejected, 1);
            self.events.emit(RendererEvent::SceneFlushRejected {
                scene,
                flush_index: update.flush_index,
                reason,
            });
            return Err(UpdateRejection::FlushIndexGap {
                scene,
                expected,
                received,
            });
        }

        // 2. Staging.
        let newly_needed = received.staging.stage(update);
        if state.is_mapping_or_mapped() {
            if let Some(runtime) = self.display.as_mut() {
                runtime
                    .resources
                    .reference_resources_for_scene(scene, &newly_needed);
            }
        }
        self.expiration
            .set_pending_expiration(scene, received.staging.earliest_pending_expiration());
        let pending = received.staging.non_empty_pending_flush_count();

        // 3. The first flush completes the subscription.
        if state == SceneState::SubscriptionPending {
            self.executor
                .apply(scene, SceneTransition::ConfirmSubscribed)?;
        }

        // 4. Backpressure.
        if pending > self.config.max_pending_flushes_to_force_unsubscribe {
            match self.executor.publication_mode(scene).unwrap_or_default() {
                PublicationMode::Remote => {
                    log::error!(
                        "SceneUpdateAgent: {scene} has {pending} pending flushes, force-unsubscribing"
                    );
                    RendererStatistics::bump(&self.statistics.force_unsubscribes, 1);
                    self.tear_down_to(scene, SceneState::Published);
                    return Err(UpdateRejection::ForceUnsubscribed(scene));
                }
                PublicationMode::Local => log::error!(
                    "SceneUpdateAgent: local {scene} has {pending} pending flushes, keeping it subscribed"
                ),
            }
        }
        Ok(())
    }

    // --- Links and offscreen buffers ---

    /// Links a provider slot to a consumer slot.
    pub fn create_data_link(
        &mut self,
        provider: SceneId,
        provider_slot: DataSlotId,
        consumer: SceneId,
        consumer_slot: DataSlotId,
    ) -> Result<(), UpdateRejection> {
        let view = LinkView {
            executor: &self.executor,
            scenes: &self.scenes,
        };
        match self
            .links
            .create_data_link(&view, provider, provider_slot, consumer, consumer_slot)
        {
            Ok(()) => {
                log::debug!(
                    "SceneUpdateAgent: linked {provider}/{provider_slot:?} -> {consumer}/{consumer_slot:?}"
                );
                self.modified.insert(consumer);
                self.events.emit(RendererEvent::SceneDataLinked {
                    provider,
                    provider_slot,
                    consumer,
                    consumer_slot,
                });
                Ok(())
            }
            Err(e) => {
                log::warn!("SceneUpdateAgent: cannot link {provider} to {consumer}: {e}");
                self.events.emit(RendererEvent::SceneDataLinkFailed {
                    provider,
                    provider_slot,
                    consumer,
                    consumer_slot,
                });
                Err(e.into())
            }
        }
    }

    /// Removes the link feeding a consumer slot.
    pub fn remove_data_link(
        &mut self,
        consumer: SceneId,
        consumer_slot: DataSlotId,
    ) -> Result<(), UpdateRejection> {
        match self.links.remove_data_link(consumer, consumer_slot) {
            Ok(_) => {
                self.events.emit(RendererEvent::SceneDataUnlinked {
                    consumer,
                    consumer_slot,
                });
                Ok(())
            }
            Err(e) => {
                log::warn!("SceneUpdateAgent: cannot unlink {consumer}/{consumer_slot:?}: {e}");
                self.events.emit(RendererEvent::SceneDataUnlinkFailed {
                    consumer,
                    consumer_slot,
                });
                Err(e.into())
            }
        }
    }

    /// Creates an offscreen buffer with a color texture of the given size.
    pub fn create_offscreen_buffer(
        &mut self,
        buffer: OffscreenBufferId,
        width: u32,
        height: u32,
        interruptible: bool,
    ) -> Result<(), UpdateRejection> {
        let Some(runtime) = self.display.as_ref() else {
            log::warn!("SceneUpdateAgent: cannot create {buffer:?} without a display");
            self.events
                .emit(RendererEvent::OffscreenBufferCreateFailed { buffer });
            return Err(UpdateRejection::NoDisplay);
        };
        if self.links.buffer_texture(buffer).is_some() {
            log::warn!("SceneUpdateAgent: {buffer:?} already exists");
            self.events
                .emit(RendererEvent::OffscreenBufferCreateFailed { buffer });
            return Err(LinkError::BufferExists(buffer).into());
        }

        let device = runtime.resources.device();
        let texture = match device.create_texture(&TextureDesc { width, height }, None) {
            Ok(texture) => texture,
            Err(e) => {
                log::error!("SceneUpdateAgent: texture for {buffer:?} failed: {e}");
                self.events
                    .emit(RendererEvent::OffscreenBufferCreateFailed { buffer });
                return Err(e.into());
            }
        };
        if let Err(e) = self
            .links
            .create_offscreen_buffer(buffer, texture, interruptible)
        {
            if let Err(unload) = device.unload_resource(texture) {
                log::error!("SceneUpdateAgent: leaked texture {texture}: {unload}");
            }
            self.events
                .emit(RendererEvent::OffscreenBufferCreateFailed { buffer });
            return Err(e.into());
        }

        log::info!(
            "SceneUpdateAgent: {buffer:?} created ({width}x{height}, interruptible: {interruptible})"
        );
        self.events
            .emit(RendererEvent::OffscreenBufferCreated { buffer });
        Ok(())
    }

    /// Destroys an offscreen buffer; its scenes fall back to the framebuffer.
    pub fn destroy_offscreen_buffer(
        &mut self,
        buffer: OffscreenBufferId,
    ) -> Result<(), UpdateRejection> {
        match self.links.destroy_offscreen_buffer(buffer) {
            Ok((texture, affected)) => {
                if let Some(runtime) = self.display.as_ref() {
                    if let Err(e) = runtime.resources.device().unload_resource(texture) {
                        log::error!("SceneUpdateAgent: texture of {buffer:?} not released: {e}");
                    }
                }
                self.modified.extend(affected);
                log::info!("SceneUpdateAgent: {buffer:?} destroyed");
                self.events
                    .emit(RendererEvent::OffscreenBufferDestroyed { buffer });
                Ok(())
            }
            Err(e) => {
                log::warn!("SceneUpdateAgent: cannot destroy {buffer:?}: {e}");
                self.events
                    .emit(RendererEvent::OffscreenBufferDestroyFailed { buffer });
                Err(e.into())
            }
        }
    }

    /// Renders a mapped scene into `buffer`, or into the framebuffer for `None`.
    pub fn assign_scene_to_offscreen_buffer(
        &mut self,
        scene: SceneId,
        buffer: Option<OffscreenBufferId>,
    ) -> Result<(), UpdateRejection> {
        if !self.executor.state(scene).is_mapped() {
            log::warn!("SceneUpdateAgent: {scene} must be mapped to be assigned");
            self.events
                .emit(RendererEvent::SceneAssignToOffscreenBufferFailed { scene, buffer });
            return Err(UpdateRejection::NotMapped(scene));
        }
        match self.links.assign_scene(scene, buffer) {
            Ok(()) => {
                self.modified.insert(scene);
                self.events
                    .emit(RendererEvent::SceneAssignedToOffscreenBuffer { scene, buffer });
                Ok(())
            }
            Err(e) => {
                log::warn!("SceneUpdateAgent: cannot assign {scene}: {e}");
                self.events
                    .emit(RendererEvent::SceneAssignToOffscreenBufferFailed { scene, buffer });
                Err(e.into())
            }
        }
    }

    /// Feeds a consumer texture slot from an offscreen buffer.
    pub fn link_offscreen_buffer(
        &mut self,
        buffer: OffscreenBufferId,
        consumer: SceneId,
        consumer_slot: DataSlotId,
    ) -> Result<(), UpdateRejection> {
        let view = LinkView {
            executor: &self.executor,
            scenes: &self.scenes,
        };
        match self
            .links
            .link_offscreen_buffer(&view, buffer, consumer, consumer_slot)
        {
            Ok(()) => {
                self.modified.insert(consumer);
                self.events.emit(RendererEvent::OffscreenBufferLinked {
                    buffer,
                    consumer,
                    consumer_slot,
                });
                Ok(())
            }
            Err(e) => {
                log::warn!("SceneUpdateAgent: cannot link {buffer:?} to {consumer}: {e}");
                self.events.emit(RendererEvent::OffscreenBufferLinkFailed {
                    buffer,
                    consumer,
                    consumer_slot,
                });
                Err(e.into())
            }
        }
    }

    // --- Teardown ---

    fn reset_render_interruption(&mut self) {
        if self.render_interrupted {
            log::debug!("SceneUpdateAgent: render interruption reset");
            self.render_interrupted = false;
        }
    }

    /// Walks the scene down to `target`, releasing what each level owned.
    fn tear_down_to(&mut self, scene: SceneId, target: SceneState) {
        self.reset_render_interruption();
        for step in TeardownStep::plan(self.executor.state(scene), target) {
            match step {
                TeardownStep::Hide | TeardownStep::AbortShow => self.expiration.on_hidden(scene),
                TeardownStep::Unmap | TeardownStep::AbortMap => self.release_mapping(scene),
                TeardownStep::Unsubscribe | TeardownStep::AbortSubscription => {
                    self.release_subscription(scene)
                }
                TeardownStep::Unpublish => {}
            }
            if let Err(e) = self.executor.tear_down(scene, step) {
                log::error!("SceneUpdateAgent: teardown of {scene} stopped: {e}");
                break;
            }
        }
    }

    fn release_mapping(&mut self, scene: SceneId) {
        self.mapping_started.remove(&scene);
        if self.links.assigned_buffer(scene).is_some() {
            if let Err(e) = self.links.assign_scene(scene, None) {
                log::warn!("SceneUpdateAgent: {scene} kept its buffer: {e}");
            }
        }
        if let Some(received) = self.scenes.get_mut(&scene) {
            received.staging.clear_scene_resource_actions();
        }
        if let Some(runtime) = self.display.as_mut() {
            runtime
                .resources
                .unload_all_scene_resources_for_scene(scene, &mut runtime.compositing);
            runtime.resources.unreference_all_resources_for_scene(scene);
        }
        self.modified.remove(&scene);
    }

    fn release_subscription(&mut self, scene: SceneId) {
        self.scenes.remove(&scene);
        self.expiration.stop_monitoring(scene);
        let affected = self.links.remove_scene(scene);
        self.modified.extend(affected);
        self.modified.remove(&scene);
    }

    // --- Frame ---

    fn sorted_scene_ids(&self) -> Vec<SceneId> {
        let mut ids: Vec<SceneId> = self.scenes.keys().copied().collect();
        ids.sort();
        ids
    }

    fn is_budgeted(&self, scene: SceneId) -> bool {
        self.executor.publication_mode(scene) != Some(PublicationMode::Local)
    }

    fn update_resources(&mut self) {
        for scene in self.sorted_scene_ids() {
            let state = self.executor.state(scene);
            let Some(received) = self.scenes.get_mut(&scene) else {
                continue;
            };
            let arrived = received.staging.take_arrived_resource_data();
            if let Some(runtime) = self.display.as_mut().filter(|_| state.is_mapping_or_mapped()) {
                runtime.resources.reference_resources_for_scene(
                    scene,
                    received.staging.resources_needed_by_pending(),
                );
                for data in &arrived {
                    runtime.resources.provide_resource_data(data.clone());
                }
            }
            // Kept for a later remap.
            received.staging.stash_for_mapping(arrived);
        }

        let executor = &self.executor;
        let Some(runtime) = self.display.as_mut() else {
            return;
        };
        let is_budgeted =
            |scene: SceneId| executor.publication_mode(scene) != Some(PublicationMode::Local);
        let report = runtime
            .resources
            .upload_and_unload_pending_resources(&self.timer, &is_budgeted);
        for hash in &report.broken {
            log::error!("SceneUpdateAgent: resource {hash} is broken");
        }
        RendererStatistics::bump(
            &self.statistics.resources_uploaded,
            report.uploaded.len() as u64,
        );
        RendererStatistics::bump(&self.statistics.resources_broken, report.broken.len() as u64);
        RendererStatistics::bump(&self.statistics.resources_unloaded, report.unloaded as u64);
        RendererStatistics::set(
            &self.statistics.cached_bytes,
            runtime.resources.cached_bytes() as f64,
        );
    }

    fn apply_pending_flushes(&mut self) {
        let scene_count = self.executor.scene_count();
        for scene in self.sorted_scene_ids() {
            self.apply_pending_flushes_of(scene, scene_count);
        }
    }

    fn apply_pending_flushes_of(&mut self, scene: SceneId, scene_count: usize) {
        let state = self.executor.state(scene);
        let Some(received) = self.scenes.get_mut(&scene) else {
            return;
        };
        if !received.staging.has_pending_flushes() {
            if received.content.has_active_animations() {
                self.modified.insert(scene);
            } else if state == SceneState::Rendered {
                self.expiration.on_rendered(scene);
            }
            return;
        }

        // 1. Gate on resources.
        let pending = received.staging.non_empty_pending_flush_count();
        // Mapping scenes escalate through force-map instead.
        let force = state.is_mapped() && pending > self.config.max_pending_flushes_to_force_apply;
        if !force
            && state == SceneState::Rendered
            && self.render_interrupted
            && self.links.is_interruptible(scene)
        {
            log::trace!("SceneUpdateAgent: {scene} deferred by render interruption");
            return;
        }
        let missing = match self.display.as_ref() {
            Some(runtime) if state.is_mapped() => runtime
                .resources
                .missing_resources(received.staging.resources_needed_by_pending()),
            // Until mapped, the applied content must not outrun its uploads.
            Some(runtime) if state.is_mapping_or_mapped() => runtime.resources.missing_resources(
                received
                    .staging
                    .resources_in_use()
                    .iter()
                    .chain(received.staging.resources_needed_by_pending()),
            ),
            _ => Vec::new(),
        };
        if !missing.is_empty() && !force {
            log::trace!(
                "SceneUpdateAgent: {scene} waits for {} resources",
                missing.len()
            );
            RendererStatistics::bump(&self.statistics.flushes_blocked, 1);
            return;
        }
        let forced_with_missing = !missing.is_empty();
        if forced_with_missing {
            log::error!(
                "SceneUpdateAgent: force-applying {} flushes of {scene}, missing resources: {}",
                received.staging.pending_flush_count(),
                format_missing_resources(&missing, self.config.missing_resources_log_limit)
            );
            RendererStatistics::bump(
                &self.statistics.flushes_force_applied,
                received.staging.pending_flush_count() as u64,
            );
        }
        if force {
            self.render_interrupted = false;
        }

        // 2. Apply in order, in chunks when other scenes compete for the frame.
        let partial = !force && state != SceneState::Rendered && scene_count > 1;
        let chunk = self.config.scene_action_chunk_size.max(1);
        let mut changed = false;
        let mut budget_hit = false;
        let mut applied: Vec<PendingFlush> = Vec::new();
        while let Some(flush) = received.staging.front_mut() {
            if partial {
                while !flush.is_fully_applied() && !budget_hit {
                    let end = (flush.applied_actions + chunk).min(flush.actions.len());
                    received
                        .content
                        .apply_actions(&flush.actions[flush.applied_actions..end]);
                    flush.applied_actions = end;
                    changed = true;
                    budget_hit = self
                        .timer
                        .is_time_budget_exceeded(FrameSection::SceneActionsApply);
                }
            } else {
                changed |= !flush.remaining_actions().is_empty();
                received.content.apply_actions(flush.remaining_actions());
                flush.applied_actions = flush.actions.len();
            }
            if !flush.is_fully_applied() {
                break;
            }
            if let Some(done) = received.staging.pop_front() {
                applied.push(done);
            }
            if budget_hit {
                break;
            }
        }
        if budget_hit {
            log::debug!(
                "SceneUpdateAgent: {scene} apply budget exceeded, {} flushes left",
                received.staging.pending_flush_count()
            );
        }

        // 3. Report the applied flushes.
        RendererStatistics::bump(&self.statistics.flushes_applied, applied.len() as u64);
        let resource_status = if forced_with_missing {
            SceneResourceStatus::Pending
        } else {
            SceneResourceStatus::Ready
        };
        for flush in &applied {
            self.expiration.on_flush_applied(scene, flush.time_info.expiration);
            if let Some(version_tag) = flush.version_tag {
                if received.staging.last_applied_version_tag() != Some(version_tag) {
                    received.staging.set_last_applied_version_tag(version_tag);
                    self.events.emit(RendererEvent::SceneFlushed {
                        scene,
                        version_tag,
                        resource_status,
                    });
                }
            }
        }
        self.expiration
            .set_pending_expiration(scene, received.staging.earliest_pending_expiration());

        // 4. Once the queue is empty, settle which resources the scene uses.
        if !received.staging.has_pending_flushes() {
            if let Some(last) = applied.pop() {
                let changes = received.staging.complete_window(last);
                match self.display.as_mut() {
                    Some(runtime) if state.is_mapping_or_mapped() => {
                        runtime
                            .resources
                            .unreference_resources_for_scene(scene, &changes.unneeded);
                        runtime
                            .resources
                            .unreference_resources_for_scene(scene, &changes.pending_unneeded);
                    }
                    _ => received.staging.clear_scene_resource_actions(),
                }
            }
        }

        if changed || received.content.has_active_animations() {
            self.modified.insert(scene);
        } else if state == SceneState::Rendered {
            self.expiration.on_rendered(scene);
        }
    }

    fn execute_scene_resource_actions(&mut self) {
        for scene in self.sorted_scene_ids() {
            if !self.executor.state(scene).is_mapping_or_mapped() {
                continue;
            }
            let budgeted = self.is_budgeted(scene);
            let (Some(runtime), Some(received)) =
                (self.display.as_mut(), self.scenes.get_mut(&scene))
            else {
                continue;
            };
            if received.staging.has_pending_flushes()
                || received.staging.scene_resource_actions().is_empty()
            {
                continue;
            }
            let actions = received.staging.take_scene_resource_actions();
            let total = actions.len();
            let remaining = runtime.resources.execute_scene_resource_actions(
                scene,
                actions,
                &mut runtime.compositing,
                &self.timer,
                budgeted,
            );
            if remaining.len() < total {
                self.modified.insert(scene);
            }
            if !remaining.is_empty() {
                received.staging.requeue_scene_resource_actions_front(remaining);
            }
        }
    }

    fn update_embedded_compositing(&mut self) {
        let Some(runtime) = self.display.as_mut() else {
            return;
        };
        let changes = runtime.compositing.dispatch_state_changes();
        for source in &changes.new_sources {
            log::info!("SceneUpdateAgent: stream surface {source} available");
            self.events
                .emit(RendererEvent::StreamSurfaceAvailable { source: *source });
        }
        for source in &changes.obsolete_sources {
            log::info!("SceneUpdateAgent: stream surface {source} gone");
            self.events
                .emit(RendererEvent::StreamSurfaceUnavailable { source: *source });
        }

        let updated = runtime
            .compositing
            .upload_resources_and_get_updates(runtime.resources.device().as_ref());
        RendererStatistics::bump(&self.statistics.stream_texture_updates, updated.len() as u64);
        for source in changes.availability_changed.iter().chain(&updated) {
            self.modified
                .extend(runtime.resources.scenes_using_stream(*source));
        }
    }

    fn update_scene_states(&mut self) {
        if self.display.is_some() {
            for scene in self.executor.scenes_in(SceneState::MapRequested) {
                // Partially applied content is not collected.
                let drained = self
                    .scenes
                    .get(&scene)
                    .is_some_and(|received| !received.staging.has_pending_flushes());
                if drained {
                    self.start_mapping(scene);
                }
            }
        }
        for scene in self.executor.scenes_in(SceneState::MappingAndUploading) {
            self.try_finish_mapping(scene);
        }
        for scene in self.executor.scenes_in(SceneState::RenderRequested) {
            if self
                .executor
                .apply(scene, SceneTransition::ConfirmShown)
                .is_ok()
            {
                self.expiration.on_rendered(scene);
                self.modified.insert(scene);
            }
        }
    }

    fn start_mapping(&mut self, scene: SceneId) {
        if self
            .executor
            .apply(scene, SceneTransition::StartMapping)
            .is_err()
        {
            return;
        }
        self.mapping_started.insert(scene, Instant::now());
        let priority = self.priorities.get(&scene).copied();
        let (Some(runtime), Some(received)) = (self.display.as_mut(), self.scenes.get_mut(&scene))
        else {
            return;
        };

        // 1. Reference everything the scene uses or is about to use.
        if let Some(priority) = priority {
            runtime.resources.set_scene_priority(scene, priority);
        }
        let in_use: Vec<ResourceContentHash> =
            received.staging.resources_in_use().iter().copied().collect();
        runtime.resources.reference_resources_for_scene(scene, &in_use);
        runtime
            .resources
            .reference_resources_for_scene(scene, received.staging.resources_needed_by_pending());

        // 2. Hand over the payloads kept since the scene was last mapped.
        let payloads = received.staging.take_resources_for_mapping();
        for data in &payloads {
            runtime.resources.provide_resource_data(data.clone());
        }
        let provided = payloads.len();
        received.staging.stash_for_mapping(payloads);

        // 3. Recreate the scene-local resources.
        let actions = received.content.collect_scene_resource_actions();
        log::info!(
            "SceneUpdateAgent: mapping {scene} ({} resources in use, {provided} provided, {} scene resources)",
            in_use.len(),
            actions.len()
        );
        received.staging.queue_scene_resource_actions(actions);
    }

    fn try_finish_mapping(&mut self, scene: SceneId) {
        let (Some(runtime), Some(received)) = (self.display.as_ref(), self.scenes.get(&scene))
        else {
            return;
        };
        let missing = runtime.resources.missing_resources(
            received
                .staging
                .resources_in_use()
                .iter()
                .chain(received.staging.resources_needed_by_pending()),
        );
        let ready = missing.is_empty()
            && !received.staging.has_pending_flushes()
            && received.staging.scene_resource_actions().is_empty();

        if !ready {
            let pending = received.staging.non_empty_pending_flush_count();
            let waited = self.mapping_started.get(&scene).map(Instant::elapsed);
            let timed_out = matches!(
                (waited, self.config.max_mapping_wait()),
                (Some(waited), Some(limit)) if waited > limit
            );
            if pending <= self.config.max_pending_flushes_to_force_apply && !timed_out {
                return;
            }
            log::error!(
                "SceneUpdateAgent: force-mapping {scene} after {waited:?} with {pending} pending flushes, missing resources: {}",
                format_missing_resources(&missing, self.config.missing_resources_log_limit)
            );
            RendererStatistics::bump(&self.statistics.force_maps, 1);
        }

        self.mapping_started.remove(&scene);
        if self
            .executor
            .apply(scene, SceneTransition::ConfirmMapped)
            .is_ok()
        {
            self.modified.insert(scene);
        }
    }

    fn propagate_links(&mut self) {
        if self.links.link_count() == 0 {
            return;
        }
        self.links.propagate_dirtiness(&mut self.modified);
        let transfers = self.links.take_value_transfers(&self.modified);
        if transfers.is_empty() {
            return;
        }
        let written = transfer_linked_values(transfers, &self.links, &mut self.scenes);
        self.modified.extend(written);
    }

    fn finish_frame(&mut self) {
        let modified = std::mem::take(&mut self.modified);
        self.rerendered = modified
            .into_iter()
            .filter(|scene| self.executor.state(*scene) == SceneState::Rendered)
            .collect();
        for scene in &self.rerendered {
            self.expiration.on_rendered(*scene);
        }
        self.expiration.check_expired_scenes(Instant::now());
        RendererStatistics::set(&self.statistics.scenes, self.executor.scene_count() as f64);
    }
}

impl Agent for SceneUpdateAgent {
    fn id(&self) -> AgentId {
        AgentId::SceneUpdater
    }

    fn apply_budget(&mut self, budget: FrameBudget) {
        log::debug!("SceneUpdateAgent: applying budget {budget:?}");
        for (section, limit) in [
            (FrameSection::ResourcesUpload, budget.resources_upload),
            (FrameSection::SceneActionsApply, budget.scene_actions_apply),
            (FrameSection::SceneResourcesUpload, budget.scene_resources_upload),
        ] {
            self.timer
                .set_section_budget(section, limit.unwrap_or(Duration::MAX));
        }
    }

    fn update(&mut self) {
        let histogram = self.statistics.update_duration_ms.clone();
        let _scoped = ScopedMetricTimer::new(&histogram);
        let stopwatch = Stopwatch::new();
        self.timer.start_frame();

        if let Some(runtime) = &self.display {
            if let Err(e) = runtime.resources.device().context().enable() {
                log::error!(
                    "SceneUpdateAgent: render context of display {} unavailable: {e}",
                    runtime.id.0
                );
                return;
            }
        }

        // 1. Client resources.
        self.update_resources();
        // 2. Pending flushes.
        self.apply_pending_flushes();
        // 3. Scene-local resources.
        self.execute_scene_resource_actions();
        // 4. Stream textures.
        self.update_embedded_compositing();
        // 5. Mapping and showing.
        self.update_scene_states();
        // 6. Linked data.
        self.propagate_links();
        // 7. Re-render set and expirations.
        self.finish_frame();

        self.frame_count += 1;
        self.last_update = stopwatch.elapsed();
    }

    fn report_status(&self) -> AgentStatus {
        let worst = self
            .scenes
            .values()
            .map(|received| received.staging.non_empty_pending_flush_count())
            .max()
            .unwrap_or(0);
        let limit = self.config.max_pending_flushes_to_force_apply.max(1);
        let mapping_stalled = self.config.max_mapping_wait().is_some_and(|limit| {
            self.mapping_started
                .values()
                .any(|started| started.elapsed() > limit)
        });
        let uploads = self
            .resource_manager()
            .map_or(0, |resources| resources.uploads_in_flight());

        AgentStatus {
            agent_id: self.id(),
            health_score: 1.0 - (worst as f32 / limit as f32).min(1.0),
            is_stalled: worst > limit || mapping_stalled,
            message: format!(
                "{} scenes, worst backlog {worst} flushes, {uploads} uploads in flight, frame {} took {:?}",
                self.executor.scene_count(),
                self.frame_count,
                self.last_update
            ),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
