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

//! Traits for autonomous renderer subsystems (Agents).

use std::any::Any;
use std::time::Duration;

/// Identifies an agent in the host loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentId {
    /// Drives scene lifecycles, flushes, and resources for one display.
    SceneUpdater,
}

/// Per-frame time budgets handed to an agent by the host loop.
///
/// `None` leaves the corresponding section unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameBudget {
    /// Budget for the client resource upload pass.
    pub resources_upload: Option<Duration>,
    /// Budget for applying flush actions.
    pub scene_actions_apply: Option<Duration>,
    /// Budget for scene-local resource actions.
    pub scene_resources_upload: Option<Duration>,
}

/// A snapshot of an agent's health.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentStatus {
    /// Reporting agent.
    pub agent_id: AgentId,
    /// 1.0 when nothing is backed up, approaching 0.0 under pressure.
    pub health_score: f32,
    /// Whether the agent cannot make progress.
    pub is_stalled: bool,
    /// Free-form diagnostic.
    pub message: String,
}

/// The foundational interface of a renderer subsystem driven by a host loop.
pub trait Agent: Send {
    /// Returns the unique identifier of this agent.
    fn id(&self) -> AgentId;

    /// Applies time budgets issued by the host loop.
    fn apply_budget(&mut self, budget: FrameBudget);

    /// Runs one frame of work.
    fn update(&mut self);

    /// Reports the current status and health of the agent.
    fn report_status(&self) -> AgentStatus;

    /// Allows downcasting to concrete agent types.
    fn as_any(&self) -> &dyn Any;

    /// Allows mutable downcasting to concrete agent types.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
