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

//! The scene lifecycle graph as explicit tables.

use tessera_core::scene::SceneState;

/// A requested edge of the scene lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SceneTransition {
    /// A client announced the scene.
    Publish,
    /// The client withdrew a scene that is not subscribed.
    Unpublish,
    /// Content was requested from the client.
    RequestSubscription,
    /// The initial scene arrived.
    ReceiveScene,
    /// The first flush arrived.
    ConfirmSubscribed,
    /// Content is no longer wanted.
    Unsubscribe,
    /// Mapping to the display was requested.
    RequestMap,
    /// Pending flushes drained; resources start uploading.
    StartMapping,
    /// Every resource the scene uses is uploaded.
    ConfirmMapped,
    /// The scene leaves the display.
    Unmap,
    /// Rendering was requested.
    RequestShow,
    /// The scene is rendered.
    ConfirmShown,
    /// Rendering stops.
    Hide,
}

impl SceneTransition {
    /// The state reached by taking this edge from `from`, or `None` if the edge
    /// does not leave `from`.
    pub fn target(self, from: SceneState) -> Option<SceneState> {
        use SceneState as S;
        use SceneTransition as T;
        match (self, from) {
            (T::Publish, S::Unpublished) => Some(S::Published),
            (T::Unpublish, S::Published) => Some(S::Unpublished),
            (T::RequestSubscription, S::Published) => Some(S::SubscriptionRequested),
            (T::ReceiveScene, S::SubscriptionRequested) => Some(S::SubscriptionPending),
            (T::ConfirmSubscribed, S::SubscriptionPending) => Some(S::Subscribed),
            (T::Unsubscribe, S::SubscriptionRequested | S::SubscriptionPending | S::Subscribed) => {
                Some(S::Published)
            }
            (T::RequestMap, S::Subscribed) => Some(S::MapRequested),
            (T::StartMapping, S::MapRequested) => Some(S::MappingAndUploading),
            (T::ConfirmMapped, S::MappingAndUploading) => Some(S::Mapped),
            (T::Unmap, S::MapRequested | S::MappingAndUploading | S::Mapped) => Some(S::Subscribed),
            (T::RequestShow, S::Mapped) => Some(S::RenderRequested),
            (T::ConfirmShown, S::RenderRequested) => Some(S::Rendered),
            (T::Hide, S::RenderRequested | S::Rendered) => Some(S::Mapped),
            _ => None,
        }
    }

    /// Whether the edge is requested by a collaborator rather than taken by the
    /// update engine itself.
    pub fn is_requested(self) -> bool {
        !matches!(
            self,
            SceneTransition::ReceiveScene
                | SceneTransition::ConfirmSubscribed
                | SceneTransition::StartMapping
                | SceneTransition::ConfirmMapped
                | SceneTransition::ConfirmShown
        )
    }
}

/// One step of a forced teardown, taken by the renderer itself when a scene
/// must go down for reasons outside the client's requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TeardownStep {
    /// Stop rendering a rendered scene.
    Hide,
    /// Cancel a show request.
    AbortShow,
    /// Unmap a mapped scene.
    Unmap,
    /// Cancel a mapping in progress.
    AbortMap,
    /// Drop a subscribed scene.
    Unsubscribe,
    /// Cancel a subscription in progress.
    AbortSubscription,
    /// Forget the scene.
    Unpublish,
}

impl TeardownStep {
    /// The step leaving `state` on the way down, with the state it lands in.
    pub fn leaving(state: SceneState) -> Option<(TeardownStep, SceneState)> {
        use SceneState as S;
        match state {
            S::Rendered => Some((TeardownStep::Hide, S::Mapped)),
            S::RenderRequested => Some((TeardownStep::AbortShow, S::Mapped)),
            S::Mapped => Some((TeardownStep::Unmap, S::Subscribed)),
            S::MappingAndUploading | S::MapRequested => Some((TeardownStep::AbortMap, S::Subscribed)),
            S::Subscribed => Some((TeardownStep::Unsubscribe, S::Published)),
            S::SubscriptionPending | S::SubscriptionRequested => {
                Some((TeardownStep::AbortSubscription, S::Published))
            }
            S::Published => Some((TeardownStep::Unpublish, S::Unpublished)),
            S::Unpublished => None,
        }
    }

    /// Ordered steps bringing a scene from `from` down to `to`.
    pub fn plan(from: SceneState, to: SceneState) -> Vec<TeardownStep> {
        let mut steps = Vec::new();
        let mut state = from;
        while state > to {
            let Some((step, next)) = TeardownStep::leaving(state) else {
                break;
            };
            steps.push(step);
            state = next;
        }
        steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [SceneState; 10] = [
        SceneState::Unpublished,
        SceneState::Published,
        SceneState::SubscriptionRequested,
        SceneState::SubscriptionPending,
        SceneState::Subscribed,
        SceneState::MapRequested,
        SceneState::MappingAndUploading,
        SceneState::Mapped,
        SceneState::RenderRequested,
        SceneState::Rendered,
    ];

    #[test]
    fn render_before_map_is_illegal() {
        assert_eq!(SceneTransition::RequestShow.target(SceneState::Subscribed), None);
        assert_eq!(SceneTransition::RequestShow.target(SceneState::MapRequested), None);
        assert_eq!(
            SceneTransition::RequestShow.target(SceneState::Mapped),
            Some(SceneState::RenderRequested)
        );
    }

    #[test]
    fn every_state_has_a_single_edge_for_confirmations() {
        for transition in [
            SceneTransition::ReceiveScene,
            SceneTransition::ConfirmSubscribed,
            SceneTransition::StartMapping,
            SceneTransition::ConfirmMapped,
            SceneTransition::ConfirmShown,
        ] {
            let sources = ALL_STATES
                .iter()
                .filter(|s| transition.target(**s).is_some())
                .count();
            assert_eq!(sources, 1, "{transition:?}");
            assert!(!transition.is_requested());
        }
    }

    #[test]
    fn teardown_table_reaches_every_lower_state() {
        for from in ALL_STATES {
            let steps = TeardownStep::plan(from, SceneState::Unpublished);
            let mut state = from;
            for step in &steps {
                let (expected, next) = TeardownStep::leaving(state).expect("step");
                assert_eq!(*step, expected);
                state = next;
            }
            assert_eq!(state, SceneState::Unpublished);
        }
    }

    #[test]
    fn teardown_of_a_rendered_scene_to_published() {
        assert_eq!(
            TeardownStep::plan(SceneState::Rendered, SceneState::Published),
            vec![
                TeardownStep::Hide,
                TeardownStep::Unmap,
                TeardownStep::Unsubscribe
            ]
        );
        assert_eq!(
            TeardownStep::plan(SceneState::MappingAndUploading, SceneState::Subscribed),
            vec![TeardownStep::AbortMap]
        );
        assert!(TeardownStep::plan(SceneState::Published, SceneState::Mapped).is_empty());
    }
}
