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

//! Per-scene staging of not-yet-applied flushes.

mod client_resources;
mod pending_flush;
mod scene_resources;
mod staging_info;

pub use client_resources::{consolidate_resources_in_use, ClientResourceChanges};
pub use pending_flush::PendingFlush;
pub use scene_resources::consolidate_scene_resource_actions;
pub use staging_info::StagingInfo;
