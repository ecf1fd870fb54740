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

use tessera_core::scene::SceneResourceAction;

/// Appends `new_actions` to the accumulated `pending` actions, collapsing
/// actions that cancel out before they ever reach the device.
///
/// - an update replaces any earlier update of the same resource,
/// - a destroy drops earlier updates of the resource,
/// - a destroy following a pending create removes both,
/// - a destroy followed by a create is kept as is.
pub fn consolidate_scene_resource_actions(
    new_actions: Vec<SceneResourceAction>,
    pending: &mut Vec<SceneResourceAction>,
) {
    for action in new_actions {
        let handle = action.handle();
        match action {
            SceneResourceAction::Create { .. } => pending.push(action),
            SceneResourceAction::Update { .. } => {
                pending.retain(|a| !(a.is_update() && a.handle() == handle));
                pending.push(action);
            }
            SceneResourceAction::Destroy { .. } => {
                pending.retain(|a| !(a.is_update() && a.handle() == handle));
                match pending
                    .iter()
                    .rposition(|a| a.is_create() && a.handle() == handle)
                {
                    Some(pos) => {
                        pending.remove(pos);
                    }
                    None => pending.push(action),
                }
            }
        }
    }
}
