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

//! Content-addressed client resources and their upload status.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Content hash identifying a client resource.
///
/// Resources are shared across scenes by identity of this hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceContentHash {
    /// Lower 64 bits.
    pub low: u64,
    /// Upper 64 bits.
    pub high: u64,
}

impl ResourceContentHash {
    /// Creates a hash from its raw halves.
    pub const fn new(low: u64, high: u64) -> Self {
        Self { low, high }
    }

    /// Computes the content hash of a resource payload.
    ///
    /// The kind takes part in the hash so that identical bytes used as a
    /// shader and as a buffer do not alias.
    pub fn of(kind: ResourceKind, data: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&[kind as u8]);
        hasher.update(data);
        let digest = hasher.finalize();
        let bytes = digest.as_bytes();

        let mut low = [0u8; 8];
        let mut high = [0u8; 8];
        low.copy_from_slice(&bytes[..8]);
        high.copy_from_slice(&bytes[8..16]);
        Self {
            low: u64::from_le_bytes(low),
            high: u64::from_le_bytes(high),
        }
    }
}

impl fmt::Display for ResourceContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}{:016x}", self.high, self.low)
    }
}

/// The GPU-side category of a client resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ResourceKind {
    /// Shader program; compiled on the upload thread.
    Shader,
    /// Vertex or index data.
    Buffer,
    /// Texture texels.
    Texture,
}

impl ResourceKind {
    /// Whether uploads of this kind go through the asynchronous upload backend.
    pub fn uploads_asynchronously(self) -> bool {
        matches!(self, ResourceKind::Shader)
    }
}

/// The payload of a client resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceData {
    /// Content hash.
    pub hash: ResourceContentHash,
    /// Category.
    pub kind: ResourceKind,
    /// Raw bytes, shared without copying between threads.
    pub data: Arc<[u8]>,
}

impl ResourceData {
    /// Wraps a payload and computes its content hash.
    pub fn new(kind: ResourceKind, data: impl Into<Arc<[u8]>>) -> Self {
        let data = data.into();
        Self {
            hash: ResourceContentHash::of(kind, &data),
            kind,
            data,
        }
    }

    /// Wraps a payload under an externally computed hash.
    pub fn with_hash(hash: ResourceContentHash, kind: ResourceKind, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            hash,
            kind,
            data: data.into(),
        }
    }

    /// Payload size in bytes.
    pub fn byte_size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Sub-state of a referenced resource that is not usable yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PendingStage {
    /// Referenced, payload not provided yet.
    AwaitingData,
    /// Payload provided, waiting for an upload pass.
    Provided,
    /// Handed to the asynchronous upload backend.
    ScheduledForUpload,
}

/// Upload status of a client resource, as seen by the scene update engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceStatus {
    /// No scene references the resource.
    Unreferenced,
    /// Referenced but not usable yet.
    Pending(PendingStage),
    /// Resident on the GPU.
    Uploaded,
    /// Upload failed; never retried automatically.
    Broken,
}

impl ResourceStatus {
    /// Whether the resource can be used for rendering.
    pub fn is_uploaded(self) -> bool {
        self == ResourceStatus::Uploaded
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceStatus::Unreferenced => f.write_str("Unreferenced"),
            ResourceStatus::Pending(stage) => write!(f, "Pending({stage:?})"),
            ResourceStatus::Uploaded => f.write_str("Uploaded"),
            ResourceStatus::Broken => f.write_str("Broken"),
        }
    }
}
