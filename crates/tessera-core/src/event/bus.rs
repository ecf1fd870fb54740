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

/// Manages a generic, thread-safe event channel.
///
/// The bus is generic over the event type so the core stays independent of
/// who consumes the events. Producers get an [`EventSink`]; the owner drains
/// the receiver.
#[derive(Debug)]
pub struct EventBus<T: Clone + Send + Sync + 'static> {
    sender: flume::Sender<T>,
    receiver: flume::Receiver<T>,
}

impl<T: Clone + Send + Sync + 'static> EventBus<T> {
    /// Creates a new EventBus with an unbounded channel.
    pub fn new() -> Self {
        let (sender, receiver) = flume::unbounded();
        log::debug!("EventBus initialized.");
        Self { sender, receiver }
    }

    /// Sends an event, logging an error if the receiver is gone.
    pub fn publish(&self, event: T) {
        if let Err(e) = self.sender.send(event) {
            log::error!("Failed to send event: {e}. Receiver likely disconnected.");
        }
    }

    /// Returns a producer handle for this bus.
    pub fn sink(&self) -> EventSink<T> {
        EventSink {
            sender: self.sender.clone(),
        }
    }

    /// Returns a reference to the receiver end of the channel.
    pub fn receiver(&self) -> &flume::Receiver<T> {
        &self.receiver
    }

    /// Removes and returns every event currently queued, in publication order.
    pub fn drain(&self) -> Vec<T> {
        self.receiver.try_iter().collect()
    }
}

impl<T: Clone + Send + Sync + 'static> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The producing end of an [`EventBus`].
///
/// Cloning a sink is cheap; every clone feeds the same bus.
#[derive(Debug, Clone)]
pub struct EventSink<T: Clone + Send + Sync + 'static> {
    sender: flume::Sender<T>,
}

impl<T: Clone + Send + Sync + 'static> EventSink<T> {
    /// Sends an event. A disconnected bus is logged, never fatal.
    pub fn emit(&self, event: T) {
        if self.sender.send(event).is_err() {
            log::warn!("Dropping event: the event bus was closed.");
        }
    }
}
