//! Observer registry and event fan-out.
//!
//! Every observer owns one bounded queue, so events reach a given observer in
//! the order they were published. An observer whose queue is closed or full is
//! dropped from the registry; the others are unaffected.

use std::collections::HashMap;

use shared::{domain::ActorId, protocol::ServerEvent};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug)]
pub struct BroadcastHub {
    observers: HashMap<ActorId, mpsc::Sender<ServerEvent>>,
    queue_capacity: usize,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl BroadcastHub {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            observers: HashMap::new(),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Adds `actor` to the registry and returns the receiving end of its
    /// queue. Registering an actor twice replaces the earlier queue.
    pub fn register(&mut self, actor: ActorId) -> mpsc::Receiver<ServerEvent> {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        if self.observers.insert(actor, tx).is_some() {
            warn!(%actor, "observer re-registered; previous queue closed");
        }
        rx
    }

    pub fn deregister(&mut self, actor: ActorId) -> bool {
        self.observers.remove(&actor).is_some()
    }

    #[cfg(test)]
    pub fn contains(&self, actor: ActorId) -> bool {
        self.observers.contains_key(&actor)
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Queues `event` for every registered observer and returns how many
    /// accepted it.
    pub fn broadcast(&mut self, event: &ServerEvent) -> usize {
        let mut delivered = 0;
        self.observers.retain(|actor, tx| {
            let accepted = try_deliver(*actor, tx, event.clone());
            if accepted {
                delivered += 1;
            }
            accepted
        });
        delivered
    }

    /// Queues `event` for a single observer. Returns `false` when the actor is
    /// unknown or its queue could not take the event.
    pub fn send_to(&mut self, actor: ActorId, event: ServerEvent) -> bool {
        let Some(tx) = self.observers.get(&actor) else {
            debug!(%actor, "dropping event for unregistered observer");
            return false;
        };
        if try_deliver(actor, tx, event) {
            return true;
        }
        self.observers.remove(&actor);
        false
    }
}

fn try_deliver(actor: ActorId, tx: &mpsc::Sender<ServerEvent>, event: ServerEvent) -> bool {
    match tx.try_send(event) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!(%actor, "observer queue full; dropping observer");
            false
        }
        Err(TrySendError::Closed(_)) => {
            debug!(%actor, "observer queue closed; dropping observer");
            false
        }
    }
}

#[cfg(test)]
#[path = "tests/hub_tests.rs"]
mod tests;
