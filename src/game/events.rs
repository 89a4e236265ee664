//! World event notification
//!
//! Observers subscribe for a channel receiver; the world publishes into every
//! live channel. Dropped receivers are pruned on the next publish.

use tokio::sync::mpsc;

use crate::game::entity::{EntityId, EntityRole};
use crate::game::map::MapId;

/// Something observers may care about
#[derive(Debug, Clone, PartialEq)]
pub enum WorldEvent {
    EntitySpawned {
        map: MapId,
        entity: EntityId,
        role: EntityRole,
    },
    EntityDespawned {
        map: MapId,
        entity: EntityId,
    },
    Collision {
        map: MapId,
        mover: EntityId,
        other: EntityId,
    },
    Chat {
        map: MapId,
        entity: EntityId,
        message: String,
    },
    BacklogSkipped {
        skipped_ms: u32,
    },
    Autosaved {
        saved: usize,
        failed: usize,
    },
}

/// Fan-out of world events to subscribers
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<mpsc::UnboundedSender<WorldEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new observer
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<WorldEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// Deliver an event to every live subscriber
    pub fn publish(&mut self, event: WorldEvent) {
        if self.subscribers.is_empty() {
            return;
        }
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
