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

//! Thread-affine execution context of the software device.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use tessera_core::renderer::{DeviceError, RenderContext};

/// A context that is current on at most one thread at a time.
///
/// Every context guards its ownership with its own lock, so enabling the main
/// context never waits on the upload context and vice versa.
#[derive(Debug)]
pub struct SoftwareContext {
    label: String,
    owner: Mutex<Option<ThreadId>>,
}

impl SoftwareContext {
    /// Creates a disabled context.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            owner: Mutex::new(None),
        }
    }

    /// Name used in diagnostics.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether the context is current on the calling thread.
    pub fn is_current(&self) -> bool {
        *self.owner() == Some(thread::current().id())
    }

    /// Fails unless the context is current on the calling thread.
    pub fn ensure_current(&self) -> Result<(), DeviceError> {
        if self.is_current() {
            Ok(())
        } else {
            Err(DeviceError::ContextUnavailable {
                reason: format!("context '{}' is not current on this thread", self.label),
            })
        }
    }

    fn owner(&self) -> MutexGuard<'_, Option<ThreadId>> {
        self.owner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RenderContext for SoftwareContext {
    fn enable(&self) -> Result<(), DeviceError> {
        let current = thread::current().id();
        let mut owner = self.owner();
        match *owner {
            Some(thread) if thread != current => Err(DeviceError::ContextUnavailable {
                reason: format!("context '{}' is current on another thread", self.label),
            }),
            _ => {
                *owner = Some(current);
                log::trace!("SoftwareContext: '{}' enabled on {current:?}", self.label);
                Ok(())
            }
        }
    }

    fn disable(&self) -> Result<(), DeviceError> {
        let mut owner = self.owner();
        match *owner {
            Some(thread) if thread == thread::current().id() => {
                *owner = None;
                Ok(())
            }
            Some(_) => Err(DeviceError::ContextUnavailable {
                reason: format!("context '{}' is owned by another thread", self.label),
            }),
            None => Ok(()),
        }
    }

    fn is_enabled(&self) -> bool {
        self.owner().is_some()
    }
}
