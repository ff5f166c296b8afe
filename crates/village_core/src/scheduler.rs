//! Durable one-shot events.
//!
//! Deferred work ("resolve this invasion in three seconds") is stored as a
//! record with a due timestamp and processed by the engine's `advance` sweep,
//! so it survives a save/load and fires correctly after any pause.

use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;

/// What a pending event does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Settle the active neighbor invasion.
    ResolveNeighborInvasion,
    /// Settle the active NPC raid.
    ResolveNpcInvasion,
    /// Drop the settled neighbor invasion from display.
    ClearNeighborInvasion,
    /// Drop the settled NPC raid from display.
    ClearNpcInvasion,
}

/// A scheduled event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingEvent {
    /// When it fires.
    pub due_at: Timestamp,
    /// Insertion order; breaks ties between equal due times.
    pub seq: u64,
    /// What it does.
    pub kind: EventKind,
}

/// Pending events, fired in due order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventQueue {
    events: Vec<PendingEvent>,
    next_seq: u64,
}

impl EventQueue {
    /// Schedule `kind` to fire at `due_at`.
    pub fn schedule(&mut self, kind: EventKind, due_at: Timestamp) {
        self.next_seq += 1;
        self.events.push(PendingEvent {
            due_at,
            seq: self.next_seq,
            kind,
        });
    }

    /// Remove and return every event due at `now`, earliest first.
    ///
    /// Events with equal due times come out in scheduling order.
    pub fn drain_due(&mut self, now: Timestamp) -> Vec<PendingEvent> {
        let (mut due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.events)
            .into_iter()
            .partition(|e| e.due_at <= now);
        self.events = pending;
        due.sort_by_key(|e| (e.due_at, e.seq));
        due
    }

    /// Whether an event of `kind` is pending.
    #[must_use]
    pub fn contains(&self, kind: EventKind) -> bool {
        self.events.iter().any(|e| e.kind == kind)
    }

    /// Earliest pending due time.
    #[must_use]
    pub fn next_due(&self) -> Option<Timestamp> {
        self.events.iter().map(|e| e.due_at).min()
    }

    /// Number of pending events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
