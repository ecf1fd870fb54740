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

use std::collections::BTreeSet;
use tessera_core::resource::ResourceContentHash;

/// Cumulative client resource bookkeeping of the pending flushes of one scene.
///
/// Every pending flush carries a copy of these lists as they stand after that
/// flush, so the last pending flush always describes the whole unapplied window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientResourceChanges {
    /// Resources newly referenced relative to the resources in use.
    pub needed: Vec<ResourceContentHash>,
    /// Resources in use that are no longer referenced.
    pub unneeded: Vec<ResourceContentHash>,
    /// Resources newly referenced by an earlier pending flush and dropped again
    /// by a later one. They stay referenced until the window is applied.
    pub pending_unneeded: Vec<ResourceContentHash>,
}

impl ClientResourceChanges {
    /// Merges the resource references of one more flush.
    ///
    /// Returns the resources that must be referenced now, before the flush is
    /// applied; resources already referenced by the window are not returned again.
    pub fn consolidate(
        &mut self,
        added: &[ResourceContentHash],
        removed: &[ResourceContentHash],
    ) -> Vec<ResourceContentHash> {
        let mut newly_needed = Vec::new();
        for hash in added {
            if let Some(pos) = self.unneeded.iter().position(|h| h == hash) {
                // Still in use, the earlier removal is void.
                self.unneeded.swap_remove(pos);
            } else if !self.needed.contains(hash) {
                self.needed.push(*hash);
                newly_needed.push(*hash);
            }
        }

        let mut dropped_needed = Vec::new();
        for hash in removed {
            if let Some(pos) = self.needed.iter().position(|h| h == hash) {
                self.needed.remove(pos);
                dropped_needed.push(*hash);
            } else if !self.unneeded.contains(hash) {
                self.unneeded.push(*hash);
            }
        }

        newly_needed.retain(|hash| match self.pending_unneeded.iter().position(|h| h == hash) {
            Some(pos) => {
                self.pending_unneeded.remove(pos);
                false
            }
            None => true,
        });

        for hash in dropped_needed {
            if !self.pending_unneeded.contains(&hash) {
                self.pending_unneeded.push(hash);
            }
        }

        newly_needed
    }

    /// Whether the window changes any client resource reference.
    pub fn is_empty(&self) -> bool {
        self.needed.is_empty() && self.unneeded.is_empty() && self.pending_unneeded.is_empty()
    }
}

/// Folds an applied window into the set of resources in use.
pub fn consolidate_resources_in_use(
    in_use: &mut BTreeSet<ResourceContentHash>,
    needed: &[ResourceContentHash],
    unneeded: &[ResourceContentHash],
) {
    in_use.extend(needed.iter().copied());
    for hash in unneeded {
        in_use.remove(hash);
    }
}
