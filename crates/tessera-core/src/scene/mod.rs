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

//! Scene identity, lifecycle states, and the data delivered by a scene update feed.

mod resource_action;
mod traits;
mod update;

pub use resource_action::*;
pub use traits::*;
pub use update::*;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, stable identifier of one scene instance.
///
/// Unique for the lifetime of the renderer process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SceneId(pub u64);

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scene#{}", self.0)
    }
}

/// A user-provided tag attached to a flush, reported back once the flush is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SceneVersionTag(pub u64);

/// Where a scene was published from.
///
/// Local scenes are produced inside the renderer's own process and are never
/// force-unsubscribed; remote scenes arrive over the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PublicationMode {
    /// Published by a client living in the renderer process.
    Local,
    /// Published by a client in another process or on another host.
    #[default]
    Remote,
}

/// The lifecycle position of a scene on the renderer side.
///
/// The variants are declared in lifecycle order, so comparisons like
/// `state >= SceneState::Mapped` read as "mapped or further".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SceneState {
    /// Not known to the renderer. Initial and final state.
    Unpublished,
    /// Announced by a client, no content requested.
    Published,
    /// Content was requested from the client.
    SubscriptionRequested,
    /// Initial scene arrived, waiting for its first flush.
    SubscriptionPending,
    /// Content is being received and applied.
    Subscribed,
    /// Mapping to the display was requested, waiting for pending flushes to drain.
    MapRequested,
    /// Resources are referenced and uploading to the display.
    MappingAndUploading,
    /// All resources are uploaded; the scene can be shown.
    Mapped,
    /// Show was requested, waiting for pending flushes to drain.
    RenderRequested,
    /// The scene is being rendered.
    Rendered,
}

impl SceneState {
    /// Whether the scene accepts incoming flushes.
    pub fn accepts_flushes(self) -> bool {
        self >= SceneState::SubscriptionPending
    }

    /// Whether the scene holds renderer-side content.
    pub fn is_subscribed(self) -> bool {
        self >= SceneState::Subscribed
    }

    /// Whether the scene references resources on a display.
    pub fn is_mapping_or_mapped(self) -> bool {
        self >= SceneState::MappingAndUploading
    }

    /// Whether mapping finished.
    pub fn is_mapped(self) -> bool {
        self >= SceneState::Mapped
    }
}

impl fmt::Display for SceneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SceneState::Unpublished => "Unpublished",
            SceneState::Published => "Published",
            SceneState::SubscriptionRequested => "SubscriptionRequested",
            SceneState::SubscriptionPending => "SubscriptionPending",
            SceneState::Subscribed => "Subscribed",
            SceneState::MapRequested => "MapRequested",
            SceneState::MappingAndUploading => "MappingAndUploading",
            SceneState::Mapped => "Mapped",
            SceneState::RenderRequested => "RenderRequested",
            SceneState::Rendered => "Rendered",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_are_ordered_by_lifecycle() {
        assert!(SceneState::Published < SceneState::Subscribed);
        assert!(SceneState::MappingAndUploading.is_mapping_or_mapped());
        assert!(!SceneState::MapRequested.is_mapping_or_mapped());
        assert!(SceneState::RenderRequested.is_mapped());
        assert!(SceneState::SubscriptionPending.accepts_flushes());
        assert!(!SceneState::SubscriptionRequested.accepts_flushes());
    }

    #[test]
    fn remote_is_the_default_publication_mode() {
        assert_eq!(PublicationMode::default(), PublicationMode::Remote);
    }
}
