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

//! The single source of truth for where every scene is in its lifecycle.

use super::{SceneTransition, TeardownStep};
use ahash::AHashMap;
use tessera_core::event::{EventSink, RendererEvent};
use tessera_core::scene::{PublicationMode, SceneId, SceneState};
use thiserror::Error;

/// A lifecycle edge that cannot be taken.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The edge does not leave the scene's current state.
    #[error("{scene}: {transition:?} is not possible from {from}")]
    Illegal {
        /// Scene concerned.
        scene: SceneId,
        /// State the scene is in.
        from: SceneState,
        /// Requested edge.
        transition: SceneTransition,
    },
    /// A scene cannot be published twice.
    #[error("{0} is already published")]
    AlreadyPublished(SceneId),
}

#[derive(Debug, Clone, Copy)]
struct SceneRecord {
    state: SceneState,
    mode: PublicationMode,
}

/// Tracks the lifecycle state of every known scene and validates edges.
///
/// State only changes through [`apply`](Self::apply), [`publish`](Self::publish)
/// and [`tear_down`](Self::tear_down); every change emits its event.
#[derive(Debug)]
pub struct SceneStateExecutor {
    scenes: AHashMap<SceneId, SceneRecord>,
    events: EventSink<RendererEvent>,
}

impl SceneStateExecutor {
    /// Creates an executor reporting into `events`.
    pub fn new(events: EventSink<RendererEvent>) -> Self {
        Self {
            scenes: AHashMap::new(),
            events,
        }
    }

    /// Current state. Unknown scenes are `Unpublished`.
    pub fn state(&self, scene: SceneId) -> SceneState {
        self.scenes
            .get(&scene)
            .map_or(SceneState::Unpublished, |r| r.state)
    }

    /// How the scene was published.
    pub fn publication_mode(&self, scene: SceneId) -> Option<PublicationMode> {
        self.scenes.get(&scene).map(|r| r.mode)
    }

    /// Every known scene with its state.
    pub fn scenes(&self) -> impl Iterator<Item = (SceneId, SceneState)> + '_ {
        self.scenes.iter().map(|(id, r)| (*id, r.state))
    }

    /// Number of known scenes.
    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }

    /// Known scenes in `state`, sorted.
    pub fn scenes_in(&self, state: SceneState) -> Vec<SceneId> {
        let mut ids: Vec<_> = self
            .scenes
            .iter()
            .filter(|(_, r)| r.state == state)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    /// Whether any scene is at `state` or further.
    pub fn any_scene_at_least(&self, state: SceneState) -> bool {
        self.scenes.values().any(|r| r.state >= state)
    }

    /// Whether `transition` can be taken now. Pure query.
    pub fn can_transition(&self, scene: SceneId, transition: SceneTransition) -> bool {
        transition.target(self.state(scene)).is_some()
    }

    /// Validates an edge, reporting a failure if it cannot be taken.
    ///
    /// Illegal requests are logged and answered with the matching failure event;
    /// the scene stays where it is.
    pub fn check_transition(
        &self,
        scene: SceneId,
        transition: SceneTransition,
    ) -> Result<SceneState, TransitionError> {
        let from = self.state(scene);
        match transition.target(from) {
            Some(target) => Ok(target),
            None => {
                let error = TransitionError::Illegal {
                    scene,
                    from,
                    transition,
                };
                log::error!("SceneStateExecutor: {error}");
                if let Some(event) = failure_event(scene, transition) {
                    self.events.emit(event);
                }
                Err(error)
            }
        }
    }

    /// Announces a scene.
    pub fn publish(&mut self, scene: SceneId, mode: PublicationMode) -> Result<(), TransitionError> {
        if self.scenes.contains_key(&scene) {
            log::error!("SceneStateExecutor: {scene} is already published");
            return Err(TransitionError::AlreadyPublished(scene));
        }
        self.scenes.insert(
            scene,
            SceneRecord {
                state: SceneState::Published,
                mode,
            },
        );
        log::info!("SceneStateExecutor: {scene} published ({mode:?})");
        self.events.emit(RendererEvent::ScenePublished { scene });
        Ok(())
    }

    /// Takes a lifecycle edge, emitting the events that belong to it.
    ///
    /// `Publish` needs a publication mode and goes through [`publish`](Self::publish).
    pub fn apply(
        &mut self,
        scene: SceneId,
        transition: SceneTransition,
    ) -> Result<SceneState, TransitionError> {
        if transition == SceneTransition::Publish {
            return self
                .publish(scene, PublicationMode::default())
                .map(|_| SceneState::Published);
        }
        let from = self.state(scene);
        let target = self.check_transition(scene, transition)?;
        self.set_state(scene, target);
        log::info!("SceneStateExecutor: {scene} {from} -> {target}");

        use SceneTransition as T;
        let events = match (transition, from) {
            (T::Unpublish, _) => vec![RendererEvent::SceneUnpublished { scene }],
            (T::ConfirmSubscribed, _) => vec![RendererEvent::SceneSubscribed { scene }],
            (T::Unsubscribe, _) => vec![RendererEvent::SceneUnsubscribed { scene }],
            (T::ConfirmMapped, _) => vec![RendererEvent::SceneMapped { scene }],
            (T::Unmap, SceneState::Mapped) => vec![RendererEvent::SceneUnmapped { scene }],
            (T::Unmap, _) => vec![RendererEvent::SceneMapFailed { scene }],
            (T::ConfirmShown, _) => vec![RendererEvent::SceneShown { scene }],
            (T::Hide, SceneState::RenderRequested) => vec![
                RendererEvent::SceneShowFailed { scene },
                RendererEvent::SceneHidden { scene },
            ],
            (T::Hide, _) => vec![RendererEvent::SceneHidden { scene }],
            _ => Vec::new(),
        };
        for event in events {
            self.events.emit(event);
        }
        Ok(target)
    }

    /// Takes one step of a forced teardown. Returns the state landed in.
    pub fn tear_down(&mut self, scene: SceneId, step: TeardownStep) -> Result<SceneState, TransitionError> {
        let from = self.state(scene);
        let Some((expected, target)) = TeardownStep::leaving(from) else {
            return Err(TransitionError::Illegal {
                scene,
                from,
                transition: SceneTransition::Unpublish,
            });
        };
        if expected != step {
            log::error!("SceneStateExecutor: {scene} cannot take teardown step {step:?} from {from}");
            return Err(TransitionError::Illegal {
                scene,
                from,
                transition: SceneTransition::Unpublish,
            });
        }
        self.set_state(scene, target);
        log::info!("SceneStateExecutor: {scene} {from} -> {target} (forced {step:?})");

        let event = match step {
            TeardownStep::Hide => RendererEvent::SceneHiddenIndirect { scene },
            TeardownStep::AbortShow => RendererEvent::SceneShowFailed { scene },
            TeardownStep::Unmap => RendererEvent::SceneUnmappedIndirect { scene },
            TeardownStep::AbortMap => RendererEvent::SceneMapFailed { scene },
            TeardownStep::Unsubscribe => RendererEvent::SceneUnsubscribedIndirect { scene },
            TeardownStep::AbortSubscription => RendererEvent::SceneSubscribeFailed { scene },
            TeardownStep::Unpublish => RendererEvent::SceneUnpublished { scene },
        };
        self.events.emit(event);
        Ok(target)
    }

    fn set_state(&mut self, scene: SceneId, state: SceneState) {
        if state == SceneState::Unpublished {
            self.scenes.remove(&scene);
        } else if let Some(record) = self.scenes.get_mut(&scene) {
            record.state = state;
        }
    }
}

fn failure_event(scene: SceneId, transition: SceneTransition) -> Option<RendererEvent> {
    match transition {
        SceneTransition::RequestSubscription => Some(RendererEvent::SceneSubscribeFailed { scene }),
        SceneTransition::Unsubscribe => Some(RendererEvent::SceneUnsubscribeFailed { scene }),
        SceneTransition::RequestMap => Some(RendererEvent::SceneMapFailed { scene }),
        SceneTransition::Unmap => Some(RendererEvent::SceneUnmapFailed { scene }),
        SceneTransition::RequestShow => Some(RendererEvent::SceneShowFailed { scene }),
        SceneTransition::Hide => Some(RendererEvent::SceneHideFailed { scene }),
        _ => None,
    }
}
