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

//! Device-side bookkeeping of one display.
//!
//! The [`ResourceManager`] reference-counts client resources and executes
//! scene resource actions. The [`EmbeddedCompositingManager`] turns
//! compositor surfaces into textures with a scene-independent lifetime.

mod compositing_manager;
mod resource_manager;

pub use compositing_manager::{EmbeddedCompositingManager, StreamSourceChanges};
pub use resource_manager::{format_missing_resources, ResourceManager};
