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

//! Scene lifecycle lanes: the state machine and the expiration watch.

mod expiration_monitor;
mod state_executor;
mod transition;

pub use expiration_monitor::SceneExpirationMonitor;
pub use state_executor::{SceneStateExecutor, TransitionError};
pub use transition::{SceneTransition, TeardownStep};
