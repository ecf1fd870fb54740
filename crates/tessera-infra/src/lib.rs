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

//! # Tessera Infra
//!
//! Concrete implementations of the capability traits declared in
//! `tessera-core`.
//!
//! Everything here is headless: the [`SoftwareDevice`](graphics::software::SoftwareDevice)
//! keeps its objects in host memory, the upload backend runs on a real thread
//! with its own context, and the compositor is driven by a scripting handle.
//! This is enough to exercise the scene update engine end to end without a GPU.

#![warn(missing_docs)]

pub mod compositor;
pub mod graphics;
pub mod platform;
pub mod upload;

pub use compositor::{HeadlessCompositor, SurfaceScript};
pub use graphics::software::{ObjectNamespace, SoftwareContext, SoftwareDevice};
pub use platform::{HeadlessPlatform, HeadlessSettings};
pub use upload::{ThreadedUploadBackend, UploadThreadSettings};
