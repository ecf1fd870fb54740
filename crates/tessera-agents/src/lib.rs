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

//! # Tessera Agents
//!
//! Stateful owners of the renderer side. Agents hold the device, the upload
//! backend, the compositor, and the renderer scenes, and drive the lanes of
//! `tessera-lanes` in a fixed order once per frame.
//!
//! - [`resource_agent`] owns everything that lives on a device: client
//!   resources, scene resources, and stream textures.
//! - [`scene_agent`] is the orchestrator: it receives scene updates, gates
//!   their application, and walks every scene through its lifecycle.

#![warn(missing_docs)]

pub mod resource_agent;
pub mod scene_agent;

pub use resource_agent::{EmbeddedCompositingManager, ResourceManager};
pub use scene_agent::{RendererStatistics, SceneUpdateAgent, UpdateRejection};
