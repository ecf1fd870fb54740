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

//! Defines the hierarchy of error types for the rendering contracts.

use super::{DeviceResourceHandle, DisplayId, StreamSourceId};
use crate::resource::ResourceContentHash;
use std::fmt;

/// An error raised by a graphics device or one of its contexts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The handle does not name a live object in the device namespace.
    InvalidHandle(DeviceResourceHandle),
    /// The context could not be made current on the calling thread.
    ContextUnavailable {
        /// Why the context could not be enabled.
        reason: String,
    },
    /// Memory for the object could not be allocated.
    OutOfMemory {
        /// Requested size in bytes.
        requested: u64,
    },
    /// The write does not fit the object.
    SizeMismatch {
        /// Object size in bytes.
        expected: u64,
        /// Provided size in bytes.
        actual: u64,
    },
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::InvalidHandle(handle) => write!(f, "Invalid device handle {handle}"),
            DeviceError::ContextUnavailable { reason } => {
                write!(f, "Render context unavailable: {reason}")
            }
            DeviceError::OutOfMemory { requested } => {
                write!(f, "Out of device memory allocating {requested} bytes")
            }
            DeviceError::SizeMismatch { expected, actual } => {
                write!(f, "Write of {actual} bytes into object of {expected} bytes")
            }
        }
    }
}

impl std::error::Error for DeviceError {}

/// An error uploading a client resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    /// The payload is not a valid resource of its kind (e.g. shader compilation failed).
    InvalidContent {
        /// Resource that failed.
        hash: ResourceContentHash,
        /// Diagnostic from the backend.
        details: String,
    },
    /// The device rejected the upload.
    Device(DeviceError),
    /// The upload backend is shut down or its thread died.
    BackendUnavailable,
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadError::InvalidContent { hash, details } => {
                write!(f, "Resource {hash} has invalid content: {details}")
            }
            UploadError::Device(e) => write!(f, "Device error during upload: {e}"),
            UploadError::BackendUnavailable => f.write_str("Upload backend is not running"),
        }
    }
}

impl std::error::Error for UploadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UploadError::Device(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DeviceError> for UploadError {
    fn from(e: DeviceError) -> Self {
        UploadError::Device(e)
    }
}

/// An error reported by the embedded compositor collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompositorError {
    /// No surface with this id is known to the compositor.
    UnknownSource(StreamSourceId),
    /// The surface exists but has no committed buffer.
    NoContent(StreamSourceId),
    /// Writing the content into the target texture failed.
    Device(DeviceError),
}

impl fmt::Display for CompositorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompositorError::UnknownSource(id) => write!(f, "Unknown stream source {id}"),
            CompositorError::NoContent(id) => write!(f, "Stream source {id} has no content"),
            CompositorError::Device(e) => write!(f, "Device error during compositing: {e}"),
        }
    }
}

impl std::error::Error for CompositorError {}

impl From<DeviceError> for CompositorError {
    fn from(e: DeviceError) -> Self {
        CompositorError::Device(e)
    }
}

/// A fatal error creating or tearing down a display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayError {
    /// The main render context could not be created.
    ContextCreation {
        /// Display being created.
        display: DisplayId,
        /// Diagnostic from the platform.
        details: String,
    },
    /// The upload context or its thread could not be created.
    UploadBackendCreation {
        /// Display being created.
        display: DisplayId,
        /// Diagnostic from the platform.
        details: String,
    },
    /// The display already exists.
    AlreadyExists(DisplayId),
}

impl fmt::Display for DisplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayError::ContextCreation { display, details } => {
                write!(f, "Failed to create render context for display {}: {details}", display.0)
            }
            DisplayError::UploadBackendCreation { display, details } => {
                write!(f, "Failed to create upload backend for display {}: {details}", display.0)
            }
            DisplayError::AlreadyExists(display) => {
                write!(f, "Display {} already exists", display.0)
            }
        }
    }
}

impl std::error::Error for DisplayError {}
