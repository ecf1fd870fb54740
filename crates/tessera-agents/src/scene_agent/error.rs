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

//! Why a request to the scene update agent was refused.

use tessera_core::renderer::{DeviceError, DisplayError, DisplayId};
use tessera_core::scene::SceneId;
use tessera_lanes::link_lane::LinkError;
use tessera_lanes::scene_lane::TransitionError;
use thiserror::Error;

/// A refused request. The matching failure event has been emitted already.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpdateRejection {
    /// The scene lifecycle does not allow the request.
    #[error(transparent)]
    Transition(#[from] TransitionError),
    /// The scene does not accept updates in its current state.
    #[error("{0} is not subscribed, update discarded")]
    NotSubscribed(SceneId),
    /// The update does not directly follow the previous one.
    #[error("{scene}: flush {received} rejected, expected {expected}")]
    FlushIndexGap {
        /// The scene.
        scene: SceneId,
        /// Index that would have been accepted.
        expected: u64,
        /// Index received.
        received: u64,
    },
    /// The update pushed a remote scene past the pending flush limit.
    #[error("{0} was force-unsubscribed")]
    ForceUnsubscribed(SceneId),
    /// The request needs a display and there is none.
    #[error("no display")]
    NoDisplay,
    /// A display exists already.
    #[error("display {0:?} already exists")]
    DisplayExists(DisplayId),
    /// Scenes are still mapped on the display.
    #[error("display {0:?} still has mapped scenes")]
    DisplayInUse(DisplayId),
    /// The platform could not create the display.
    #[error(transparent)]
    Display(#[from] DisplayError),
    /// A data link or offscreen buffer request was invalid.
    #[error(transparent)]
    Link(#[from] LinkError),
    /// The device refused an allocation.
    #[error(transparent)]
    Device(#[from] DeviceError),
    /// The scene must be mapped for this request.
    #[error("{0} is not mapped")]
    NotMapped(SceneId),
}
