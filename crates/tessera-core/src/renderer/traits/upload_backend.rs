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

use crate::renderer::{DeviceResourceHandle, UploadError};
use crate::resource::{ResourceContentHash, ResourceData};
use std::fmt::Debug;

/// Outcome of one asynchronous upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadCompletion {
    /// Resource that was uploaded.
    pub hash: ResourceContentHash,
    /// Device handle in the shared namespace, or why the upload failed.
    pub result: Result<DeviceResourceHandle, UploadError>,
}

/// A secondary execution context performing uploads off the render thread.
///
/// Completions are delivered through a queue that the main thread polls;
/// the main thread never blocks on it.
pub trait AsyncUploadBackend: Send + Debug {
    /// Queues a resource for upload.
    fn submit(&mut self, resource: ResourceData) -> Result<(), UploadError>;

    /// Drains every completion available right now, without blocking.
    fn poll_completed(&mut self) -> Vec<UploadCompletion>;

    /// Number of submitted resources whose completion was not polled yet.
    fn in_flight(&self) -> usize;
}
