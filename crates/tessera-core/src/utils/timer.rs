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

//! Time measurement and per-frame time budgets.

use std::time::{Duration, Instant};

/// Measures the time elapsed since its creation.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    start_time: Instant,
}

impl Stopwatch {
    /// Creates a stopwatch that starts immediately.
    #[inline]
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }

    /// Time elapsed since the stopwatch was started.
    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Elapsed time in milliseconds as `f64`.
    #[inline]
    pub fn elapsed_ms_f64(&self) -> f64 {
        self.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new()
    }
}

/// A section of the frame with its own time budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameSection {
    /// Client resource upload and unload pass.
    ResourcesUpload,
    /// Application of pending flush actions.
    SceneActionsApply,
    /// Execution of scene-local resource actions.
    SceneResourcesUpload,
}

impl FrameSection {
    const COUNT: usize = 3;

    fn index(self) -> usize {
        match self {
            FrameSection::ResourcesUpload => 0,
            FrameSection::SceneActionsApply => 1,
            FrameSection::SceneResourcesUpload => 2,
        }
    }
}

/// Tracks per-section time budgets, all measured from the start of the frame.
///
/// A section is over budget once the time elapsed since [`start_frame`](Self::start_frame)
/// exceeds the section's budget. Budgets default to unlimited.
#[derive(Debug, Clone)]
pub struct FrameTimer {
    frame_start: Instant,
    budgets: [Duration; FrameSection::COUNT],
}

impl FrameTimer {
    /// Creates a timer with unlimited budgets.
    pub fn new() -> Self {
        Self {
            frame_start: Instant::now(),
            budgets: [Duration::MAX; FrameSection::COUNT],
        }
    }

    /// Marks the beginning of a new frame.
    pub fn start_frame(&mut self) {
        self.frame_start = Instant::now();
    }

    /// Sets the budget of one section.
    pub fn set_section_budget(&mut self, section: FrameSection, budget: Duration) {
        self.budgets[section.index()] = budget;
    }

    /// The budget of one section.
    pub fn section_budget(&self, section: FrameSection) -> Duration {
        self.budgets[section.index()]
    }

    /// Time elapsed since the frame started.
    pub fn elapsed(&self) -> Duration {
        self.frame_start.elapsed()
    }

    /// Whether the section has used up its budget.
    pub fn is_time_budget_exceeded(&self, section: FrameSection) -> bool {
        self.elapsed() > self.section_budget(section)
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}
