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

//! # Tessera Core
//!
//! Foundational crate containing the identifiers, events, capability traits,
//! and configuration shared by every layer of the scene update engine.
//!
//! Nothing in here owns a GPU or a thread. Concrete devices, upload backends,
//! and compositors live in `tessera-infra`; the state machines and managers
//! that drive them live in `tessera-lanes` and `tessera-agents`.

#![warn(missing_docs)]

pub mod agent;
pub mod config;
pub mod event;
pub mod renderer;
pub mod resource;
pub mod scene;
pub mod telemetry;
pub mod utils;

pub use config::RendererConfig;
pub use event::{EventBus, RendererEvent};
pub use utils::timer::{FrameSection, FrameTimer, Stopwatch};
