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

//! Event-driven communication between the update engine and its collaborators.
//!
//! The [`EventBus`] is a generic, thread-safe channel. [`RendererEvent`] is
//! the stream the update engine produces: one event per state change, each
//! carrying enough context to explain the outcome without re-querying
//! internal state.

mod bus;

pub use self::bus::{EventBus, EventSink};

use crate::renderer::{DisplayId, OffscreenBufferId, StreamSourceId};
use crate::scene::{DataSlotId, SceneId, SceneVersionTag};

/// Resource readiness reported together with an applied flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneResourceStatus {
    /// Every resource the flush needs was uploaded.
    Ready,
    /// The flush was force-applied while resources were still missing.
    Pending,
}

/// Why an incoming scene update was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushRejectReason {
    /// The flush index does not follow the previous one.
    IndexGap {
        /// Index the renderer expected.
        expected: u64,
        /// Index that arrived.
        received: u64,
    },
}

/// Events produced by the scene update engine.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RendererEvent {
    /// A client announced a scene.
    ScenePublished { scene: SceneId },
    /// A scene is gone from the renderer.
    SceneUnpublished { scene: SceneId },
    /// The first flush of a subscribed scene arrived.
    SceneSubscribed { scene: SceneId },
    /// A subscription could not be established or was dropped before completing.
    SceneSubscribeFailed { scene: SceneId },
    /// A scene was unsubscribed on request.
    SceneUnsubscribed { scene: SceneId },
    /// A scene was unsubscribed by the renderer itself (unpublish, backpressure).
    SceneUnsubscribedIndirect { scene: SceneId },
    /// An unsubscribe request was illegal in the current state.
    SceneUnsubscribeFailed { scene: SceneId },
    /// Mapping completed.
    SceneMapped { scene: SceneId },
    /// A map request was illegal or mapping was aborted.
    SceneMapFailed { scene: SceneId },
    /// A scene was unmapped on request.
    SceneUnmapped { scene: SceneId },
    /// A scene was unmapped by the renderer itself.
    SceneUnmappedIndirect { scene: SceneId },
    /// An unmap request was illegal in the current state.
    SceneUnmapFailed { scene: SceneId },
    /// A scene is being rendered.
    SceneShown { scene: SceneId },
    /// A show request was illegal or cancelled before the scene was shown.
    SceneShowFailed { scene: SceneId },
    /// A scene is no longer rendered.
    SceneHidden { scene: SceneId },
    /// A scene was hidden by the renderer itself.
    SceneHiddenIndirect { scene: SceneId },
    /// A hide request was illegal in the current state.
    SceneHideFailed { scene: SceneId },
    /// A flush carrying a new version tag was applied.
    SceneFlushed {
        scene: SceneId,
        version_tag: SceneVersionTag,
        resource_status: SceneResourceStatus,
    },
    /// An incoming update was dropped.
    SceneFlushRejected {
        scene: SceneId,
        flush_index: u64,
        reason: FlushRejectReason,
    },
    /// Content applied, rendered, or pending for the scene passed its expiration.
    SceneExpired { scene: SceneId },
    /// A previously expired scene is up to date again.
    SceneRecoveredFromExpiration { scene: SceneId },
    /// A scene-to-scene data link was created.
    SceneDataLinked {
        provider: SceneId,
        provider_slot: DataSlotId,
        consumer: SceneId,
        consumer_slot: DataSlotId,
    },
    /// A scene-to-scene data link was refused.
    SceneDataLinkFailed {
        provider: SceneId,
        provider_slot: DataSlotId,
        consumer: SceneId,
        consumer_slot: DataSlotId,
    },
    /// A consumer slot was unlinked.
    SceneDataUnlinked { consumer: SceneId, consumer_slot: DataSlotId },
    /// Unlinking a consumer slot was refused.
    SceneDataUnlinkFailed { consumer: SceneId, consumer_slot: DataSlotId },
    /// An offscreen buffer was created.
    OffscreenBufferCreated { buffer: OffscreenBufferId },
    /// An offscreen buffer could not be created.
    OffscreenBufferCreateFailed { buffer: OffscreenBufferId },
    /// An offscreen buffer was destroyed.
    OffscreenBufferDestroyed { buffer: OffscreenBufferId },
    /// An offscreen buffer could not be destroyed.
    OffscreenBufferDestroyFailed { buffer: OffscreenBufferId },
    /// An offscreen buffer feeds a consumer texture slot.
    OffscreenBufferLinked {
        buffer: OffscreenBufferId,
        consumer: SceneId,
        consumer_slot: DataSlotId,
    },
    /// Linking an offscreen buffer was refused.
    OffscreenBufferLinkFailed {
        buffer: OffscreenBufferId,
        consumer: SceneId,
        consumer_slot: DataSlotId,
    },
    /// A scene renders into an offscreen buffer, or back into the framebuffer when `buffer` is `None`.
    SceneAssignedToOffscreenBuffer {
        scene: SceneId,
        buffer: Option<OffscreenBufferId>,
    },
    /// Assigning a scene to a render target was refused.
    SceneAssignToOffscreenBufferFailed {
        scene: SceneId,
        buffer: Option<OffscreenBufferId>,
    },
    /// A compositor surface appeared.
    StreamSurfaceAvailable { source: StreamSourceId },
    /// A compositor surface disappeared.
    StreamSurfaceUnavailable { source: StreamSourceId },
    /// The display and its backend were created.
    DisplayCreated { display: DisplayId },
    /// The display or one of its contexts could not be created.
    DisplayCreateFailed { display: DisplayId, reason: String },
    /// The display was torn down.
    DisplayDestroyed { display: DisplayId },
    /// Destroying the display was refused.
    DisplayDestroyFailed { display: DisplayId },
}

impl RendererEvent {
    /// The scene this event is about, if any.
    pub fn scene(&self) -> Option<SceneId> {
        use RendererEvent::*;
        match self {
            ScenePublished { scene }
            | SceneUnpublished { scene }
            | SceneSubscribed { scene }
            | SceneSubscribeFailed { scene }
            | SceneUnsubscribed { scene }
            | SceneUnsubscribedIndirect { scene }
            | SceneUnsubscribeFailed { scene }
            | SceneMapped { scene }
            | SceneMapFailed { scene }
            | SceneUnmapped { scene }
            | SceneUnmappedIndirect { scene }
            | SceneUnmapFailed { scene }
            | SceneShown { scene }
            | SceneShowFailed { scene }
            | SceneHidden { scene }
            | SceneHiddenIndirect { scene }
            | SceneHideFailed { scene }
            | SceneFlushed { scene, .. }
            | SceneFlushRejected { scene, .. }
            | SceneExpired { scene }
            | SceneRecoveredFromExpiration { scene }
            | SceneAssignedToOffscreenBuffer { scene, .. }
            | SceneAssignToOffscreenBufferFailed { scene, .. } => Some(*scene),
            SceneDataLinked { consumer, .. }
            | SceneDataLinkFailed { consumer, .. }
            | SceneDataUnlinked { consumer, .. }
            | SceneDataUnlinkFailed { consumer, .. }
            | OffscreenBufferLinked { consumer, .. }
            | OffscreenBufferLinkFailed { consumer, .. } => Some(*consumer),
            _ => None,
        }
    }
}
