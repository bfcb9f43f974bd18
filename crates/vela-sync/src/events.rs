//! # Sync Event Bus
//!
//! Typed broadcast of sync lifecycle events.
//!
//! The engine reports progress and failures here instead of through
//! callbacks or return values: background sync must never throw across the
//! boundary into domain code, and several listeners (UI, logging, tests)
//! may observe the same cycle.
//!
//! Built on `tokio::sync::broadcast`; a lagging subscriber loses old events,
//! never blocks the engine.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use vela_core::EntityType;

/// Capacity of the broadcast channel; laggards skip, the engine never waits.
const BUS_CAPACITY: usize = 64;

/// Events emitted by the sync engine.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Overall engine status changed.
    Status {
        is_online: bool,
        pending_count: i64,
    },

    /// Authentication failed after a refresh attempt.
    ///
    /// `blocking` is true only during the mandatory first sync, where the
    /// terminal cannot proceed without the server.
    AuthFailure { blocking: bool },

    /// A drain cycle finished.
    OutboxDrained { delivered: usize, failed: usize },

    /// An incremental pull pass finished.
    PullCompleted {
        entity_type: EntityType,
        records: usize,
        pulled_at: DateTime<Utc>,
    },

    /// The realtime channel connected.
    RealtimeConnected,

    /// The realtime channel dropped; reconnect is underway.
    RealtimeDisconnected,

    /// The realtime channel exhausted its reconnect attempts and is idle
    /// until an explicit trigger.
    RealtimeGaveUp,
}

/// Cloneable handle to the event bus.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    /// Creates a new bus.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        EventBus { tx }
    }

    /// Subscribes to future events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Emits an event. No subscribers is fine.
    pub fn emit(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        EventBus::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_to_multiple_subscribers() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.emit(SyncEvent::OutboxDrained {
            delivered: 3,
            failed: 1,
        });

        let expected = SyncEvent::OutboxDrained {
            delivered: 3,
            failed: 1,
        };
        assert_eq!(a.recv().await.unwrap(), expected);
        assert_eq!(b.recv().await.unwrap(), expected);
    }

    #[test]
    fn test_emit_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.emit(SyncEvent::RealtimeGaveUp);
    }
}
