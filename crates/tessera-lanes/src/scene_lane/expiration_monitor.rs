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

//! Watches scene content for staleness.

use ahash::AHashMap;
use std::time::Instant;
use tessera_core::event::{EventSink, RendererEvent};
use tessera_core::scene::SceneId;

#[derive(Debug, Default, Clone, Copy)]
struct ExpirationRecord {
    applied: Option<Instant>,
    rendered: Option<Instant>,
    pending: Option<Instant>,
    expired: bool,
}

impl ExpirationRecord {
    fn earliest(&self) -> Option<Instant> {
        [self.applied, self.rendered, self.pending]
            .into_iter()
            .flatten()
            .min()
    }
}

/// Reports scenes whose applied, rendered or pending content outlived its
/// expiration time.
///
/// `SceneExpired` is emitted once when a scene enters expiration and
/// `SceneRecoveredFromExpiration` once when it leaves it.
#[derive(Debug)]
pub struct SceneExpirationMonitor {
    scenes: AHashMap<SceneId, ExpirationRecord>,
    events: EventSink<RendererEvent>,
}

impl SceneExpirationMonitor {
    /// Creates a monitor reporting into `events`.
    pub fn new(events: EventSink<RendererEvent>) -> Self {
        Self {
            scenes: AHashMap::new(),
            events,
        }
    }

    /// Records the expiration of a freshly applied flush. `None` means the
    /// applied content never expires.
    pub fn on_flush_applied(&mut self, scene: SceneId, expiration: Option<Instant>) {
        self.scenes.entry(scene).or_default().applied = expiration;
    }

    /// The latest applied content made it to the screen.
    pub fn on_rendered(&mut self, scene: SceneId) {
        if let Some(record) = self.scenes.get_mut(&scene) {
            record.rendered = record.applied;
        }
    }

    /// The scene is no longer rendered.
    pub fn on_hidden(&mut self, scene: SceneId) {
        if let Some(record) = self.scenes.get_mut(&scene) {
            record.rendered = None;
        }
    }

    /// Updates the earliest expiration among the scene's pending flushes.
    pub fn set_pending_expiration(&mut self, scene: SceneId, expiration: Option<Instant>) {
        match self.scenes.get_mut(&scene) {
            Some(record) => record.pending = expiration,
            None if expiration.is_some() => {
                self.scenes.entry(scene).or_default().pending = expiration;
            }
            None => {}
        }
    }

    /// Forgets the scene, e.g. when it is unsubscribed or destroyed.
    pub fn stop_monitoring(&mut self, scene: SceneId) {
        self.scenes.remove(&scene);
    }

    /// Expiration of the content currently on screen.
    pub fn rendered_expiration(&self, scene: SceneId) -> Option<Instant> {
        self.scenes.get(&scene).and_then(|r| r.rendered)
    }

    /// Whether the scene is currently reported as expired.
    pub fn is_expired(&self, scene: SceneId) -> bool {
        self.scenes.get(&scene).is_some_and(|r| r.expired)
    }

    /// Number of monitored scenes.
    pub fn monitored_count(&self) -> usize {
        self.scenes.len()
    }

    /// Compares every monitored scene against `now` and reports edges.
    pub fn check_expired_scenes(&mut self, now: Instant) {
        let mut ids: Vec<_> = self.scenes.keys().copied().collect();
        ids.sort();
        for scene in ids {
            let Some(record) = self.scenes.get_mut(&scene) else {
                continue;
            };
            let expired = record.earliest().is_some_and(|expiration| expiration < now);
            if expired == record.expired {
                continue;
            }
            record.expired = expired;
            if expired {
                log::warn!("SceneExpirationMonitor: {scene} content expired");
                self.events.emit(RendererEvent::SceneExpired { scene });
            } else {
                log::info!("SceneExpirationMonitor: {scene} recovered from expiration");
                self.events
                    .emit(RendererEvent::SceneRecoveredFromExpiration { scene });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tessera_core::event::EventBus;

    const A: SceneId = SceneId(1);
    const B: SceneId = SceneId(2);

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn monitor() -> (SceneExpirationMonitor, EventBus<RendererEvent>, Instant) {
        let bus = EventBus::new();
        (SceneExpirationMonitor::new(bus.sink()), bus, Instant::now())
    }

    #[test]
    fn scenes_without_expiration_never_expire() {
        let (mut monitor, bus, now) = monitor();
        monitor.on_flush_applied(A, None);
        monitor.on_rendered(A);
        monitor.check_expired_scenes(now + ms(1000));
        assert!(bus.drain().is_empty());
    }

    #[test]
    fn rendered_expiration_follows_last_applied_flush() {
        let (mut monitor, _bus, now) = monitor();
        monitor.on_flush_applied(A, Some(now));
        monitor.on_flush_applied(A, Some(now + ms(60)));
        assert_eq!(monitor.rendered_expiration(A), None);

        monitor.on_rendered(A);
        assert_eq!(monitor.rendered_expiration(A), Some(now + ms(60)));

        monitor.on_hidden(A);
        assert_eq!(monitor.rendered_expiration(A), None);
        monitor.on_rendered(A);
        assert_eq!(monitor.rendered_expiration(A), Some(now + ms(60)));
    }

    #[test]
    fn expired_applied_flush_is_reported_once() {
        let (mut monitor, bus, now) = monitor();
        monitor.on_flush_applied(A, Some(now + ms(1)));
        monitor.on_rendered(A);
        for step in 2..6 {
            monitor.check_expired_scenes(now + ms(step));
        }
        assert_eq!(bus.drain(), vec![RendererEvent::SceneExpired { scene: A }]);
    }

    #[test]
    fn future_expiration_is_not_exceeded() {
        let (mut monitor, bus, now) = monitor();
        monitor.on_flush_applied(A, Some(now + Duration::from_secs(3600)));
        monitor.on_rendered(A);
        monitor.check_expired_scenes(now);
        assert!(bus.drain().is_empty());
    }

    #[test]
    fn recovery_is_reported_once_when_fresh_content_is_rendered() {
        let (mut monitor, bus, now) = monitor();
        monitor.on_flush_applied(A, Some(now + ms(1)));
        monitor.on_rendered(A);
        monitor.check_expired_scenes(now + ms(2));

        monitor.on_flush_applied(A, Some(now + ms(10_000)));
        monitor.on_rendered(A);
        monitor.check_expired_scenes(now + ms(3));
        monitor.check_expired_scenes(now + ms(4));
        assert_eq!(
            bus.drain(),
            vec![
                RendererEvent::SceneExpired { scene: A },
                RendererEvent::SceneRecoveredFromExpiration { scene: A },
            ]
        );
    }

    #[test]
    fn stale_rendered_content_expires_even_if_newer_flushes_are_fine() {
        let (mut monitor, bus, now) = monitor();
        monitor.on_flush_applied(A, Some(now + ms(1)));
        monitor.on_rendered(A);
        monitor.on_flush_applied(A, Some(now + ms(10_000)));
        monitor.check_expired_scenes(now + ms(5));
        assert_eq!(bus.drain(), vec![RendererEvent::SceneExpired { scene: A }]);
    }

    #[test]
    fn expired_pending_flush_is_reported() {
        let (mut monitor, bus, now) = monitor();
        monitor.on_flush_applied(A, Some(now + ms(10_000)));
        monitor.on_rendered(A);
        monitor.set_pending_expiration(A, Some(now + ms(1)));
        monitor.set_pending_expiration(B, Some(now + ms(1)));
        monitor.check_expired_scenes(now + ms(2));
        assert_eq!(
            bus.drain(),
            vec![
                RendererEvent::SceneExpired { scene: A },
                RendererEvent::SceneExpired { scene: B },
            ]
        );
    }

    #[test]
    fn stopped_scenes_are_not_reported() {
        let (mut monitor, bus, now) = monitor();
        monitor.on_flush_applied(A, Some(now));
        monitor.stop_monitoring(A);
        monitor.check_expired_scenes(now + ms(5));
        assert!(bus.drain().is_empty());
        assert_eq!(monitor.monitored_count(), 0);
    }
}
