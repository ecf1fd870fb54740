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

//! Upload backend running its own context on its own thread.

use crate::graphics::software::{ObjectNamespace, SoftwareContext};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tessera_core::renderer::{
    AsyncUploadBackend, DisplayError, DisplayId, RenderContext, UploadCompletion, UploadError,
};
use tessera_core::resource::ResourceData;

/// Tuning of the upload thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadThreadSettings {
    /// How long the idle thread sleeps before checking for shutdown.
    pub poll_interval: Duration,
    /// Artificial compile time per resource, to emulate slow shader compilers.
    pub latency: Duration,
}

impl Default for UploadThreadSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(5),
            latency: Duration::ZERO,
        }
    }
}

/// Uploads resources on a dedicated thread owning the upload context.
///
/// Requests travel over a work queue; results come back over a
/// single-producer, single-consumer completion queue that the main thread
/// polls. The upload context shares the device's object namespace, so
/// handles in completions are directly usable on the main thread.
#[derive(Debug)]
pub struct ThreadedUploadBackend {
    requests: Option<Sender<ResourceData>>,
    completions: Receiver<UploadCompletion>,
    context: Arc<SoftwareContext>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    in_flight: usize,
}

impl ThreadedUploadBackend {
    /// Starts the upload thread for `display` and waits until its context is current.
    pub fn spawn(
        display: DisplayId,
        namespace: Arc<ObjectNamespace>,
        settings: UploadThreadSettings,
    ) -> Result<Self, DisplayError> {
        let context = Arc::new(SoftwareContext::new(format!("upload-{}", display.0)));
        Self::spawn_with_context(display, namespace, context, settings)
    }

    /// Starts the upload thread on a caller-provided context.
    ///
    /// Fails if the context cannot be made current on the new thread, e.g.
    /// because another thread holds it.
    pub fn spawn_with_context(
        display: DisplayId,
        namespace: Arc<ObjectNamespace>,
        context: Arc<SoftwareContext>,
        settings: UploadThreadSettings,
    ) -> Result<Self, DisplayError> {
        let (request_tx, request_rx) = crossbeam_channel::unbounded::<ResourceData>();
        let (completion_tx, completion_rx) = crossbeam_channel::unbounded();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let running = Arc::new(AtomicBool::new(true));

        let thread_running = Arc::clone(&running);
        let thread_context = Arc::clone(&context);
        let handle = thread::Builder::new()
            .name(format!("tessera-upload-{}", display.0))
            .spawn(move || {
                let enabled = thread_context.enable();
                let ok = enabled.is_ok();
                // The spawning side waits for this; it cannot be gone.
                let _ = ready_tx.send(enabled);
                if !ok {
                    return;
                }
                upload_loop(
                    &request_rx,
                    &completion_tx,
                    &namespace,
                    &thread_running,
                    settings,
                );
                if let Err(e) = thread_context.disable() {
                    log::warn!("ThreadedUploadBackend: failed to release upload context: {e}");
                }
                log::debug!("ThreadedUploadBackend: upload thread stopped.");
            })
            .map_err(|e| DisplayError::UploadBackendCreation {
                display,
                details: e.to_string(),
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(DisplayError::UploadBackendCreation {
                    display,
                    details: e.to_string(),
                });
            }
            Err(_) => {
                let _ = handle.join();
                return Err(DisplayError::UploadBackendCreation {
                    display,
                    details: "upload thread exited during startup".to_string(),
                });
            }
        }

        log::info!("ThreadedUploadBackend: upload thread started for display {}.", display.0);
        Ok(Self {
            requests: Some(request_tx),
            completions: completion_rx,
            context,
            running,
            handle: Some(handle),
            in_flight: 0,
        })
    }

    /// The upload context.
    pub fn context(&self) -> &SoftwareContext {
        &self.context
    }

    /// Whether the upload thread is alive.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
            && self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the thread and waits for it. Uploads not completed yet are dropped.
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.requests = None;
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("ThreadedUploadBackend: upload thread panicked.");
            }
        }
    }
}

fn upload_loop(
    requests: &Receiver<ResourceData>,
    completions: &Sender<UploadCompletion>,
    namespace: &ObjectNamespace,
    running: &AtomicBool,
    settings: UploadThreadSettings,
) {
    while running.load(Ordering::Relaxed) {
        let resource = match requests.recv_timeout(settings.poll_interval) {
            Ok(resource) => resource,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        if !settings.latency.is_zero() {
            thread::sleep(settings.latency);
        }
        let result = namespace.compile(&resource);
        if let Err(e) = &result {
            log::debug!("ThreadedUploadBackend: upload of {} failed: {e}", resource.hash);
        }
        let completion = UploadCompletion {
            hash: resource.hash,
            result,
        };
        if let Err(crossbeam_channel::SendError(orphan)) = completions.send(completion) {
            // Nobody polls anymore; don't leak the object.
            if let Ok(handle) = orphan.result {
                let _ = namespace.release(handle);
            }
            break;
        }
    }
}

impl AsyncUploadBackend for ThreadedUploadBackend {
    fn submit(&mut self, resource: ResourceData) -> Result<(), UploadError> {
        let sender = self.requests.as_ref().ok_or(UploadError::BackendUnavailable)?;
        sender
            .send(resource)
            .map_err(|_| UploadError::BackendUnavailable)?;
        self.in_flight += 1;
        Ok(())
    }

    fn poll_completed(&mut self) -> Vec<UploadCompletion> {
        let completed: Vec<_> = self.completions.try_iter().collect();
        self.in_flight = self.in_flight.saturating_sub(completed.len());
        completed
    }

    fn in_flight(&self) -> usize {
        self.in_flight
    }
}

impl Drop for ThreadedUploadBackend {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::software::SoftwareDevice;
    use std::time::Instant;
    use tessera_core::renderer::GraphicsDevice;
    use tessera_core::resource::ResourceKind;

    fn wait_for(backend: &mut ThreadedUploadBackend, count: usize) -> Vec<UploadCompletion> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut done = Vec::new();
        while done.len() < count && Instant::now() < deadline {
            done.extend(backend.poll_completed());
            thread::sleep(Duration::from_millis(1));
        }
        done
    }

    #[test]
    fn uploads_land_in_the_shared_namespace() {
        let device = SoftwareDevice::new();
        device.context().enable().expect("enable main context");
        let mut backend = ThreadedUploadBackend::spawn(
            DisplayId(0),
            device.namespace(),
            UploadThreadSettings::default(),
        )
        .expect("spawn");

        let shader = ResourceData::new(ResourceKind::Shader, b"void main() {}".to_vec());
        backend.submit(shader.clone()).expect("submit");
        assert_eq!(backend.in_flight(), 1);

        let done = wait_for(&mut backend, 1);
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].hash, shader.hash);
        let handle = done[0].result.clone().expect("upload succeeded");
        assert_eq!(backend.in_flight(), 0);

        // The main thread can release what the upload thread created.
        device.unload_resource(handle).expect("unload on main context");
    }

    #[test]
    fn failures_come_back_as_values() {
        let device = SoftwareDevice::new();
        let mut backend = ThreadedUploadBackend::spawn(
            DisplayId(1),
            device.namespace(),
            UploadThreadSettings::default(),
        )
        .expect("spawn");

        backend
            .submit(ResourceData::new(ResourceKind::Shader, Vec::<u8>::new()))
            .expect("submit");
        let done = wait_for(&mut backend, 1);
        assert!(matches!(done[0].result, Err(UploadError::InvalidContent { .. })));
        assert!(backend.is_running());
    }

    #[test]
    fn main_context_stays_usable_while_the_upload_thread_works() {
        let device = SoftwareDevice::new();
        device.context().enable().expect("enable main context");
        let mut backend = ThreadedUploadBackend::spawn(
            DisplayId(2),
            device.namespace(),
            UploadThreadSettings {
                latency: Duration::from_millis(200),
                ..Default::default()
            },
        )
        .expect("spawn");
        assert!(backend.context().is_enabled());

        backend
            .submit(ResourceData::new(ResourceKind::Shader, b"slow".to_vec()))
            .expect("submit");
        // The main context works while the upload thread holds its own.
        let buffer = ResourceData::new(ResourceKind::Buffer, vec![1u8; 8]);
        device.upload_resource(&buffer).expect("main thread upload");
        assert!(backend.poll_completed().is_empty());

        assert_eq!(wait_for(&mut backend, 1).len(), 1);
    }

    #[test]
    fn a_busy_context_fails_backend_creation() {
        let device = SoftwareDevice::new();
        let context = Arc::new(SoftwareContext::new("upload"));
        context.enable().expect("held by the test thread");

        let result = ThreadedUploadBackend::spawn_with_context(
            DisplayId(3),
            device.namespace(),
            context,
            UploadThreadSettings::default(),
        );
        assert!(matches!(
            result,
            Err(DisplayError::UploadBackendCreation { .. })
        ));
    }

    #[test]
    fn submit_after_shutdown_is_refused() {
        let device = SoftwareDevice::new();
        let mut backend = ThreadedUploadBackend::spawn(
            DisplayId(4),
            device.namespace(),
            UploadThreadSettings::default(),
        )
        .expect("spawn");
        backend.shutdown();
        assert!(!backend.is_running());
        assert_eq!(
            backend.submit(ResourceData::new(ResourceKind::Shader, b"x".to_vec())),
            Err(UploadError::BackendUnavailable)
        );
    }
}
