/// Timed note events as seen by the metrics engine.

use std::time::Instant;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    NoteOn,
    NoteOff,
    /// Any non-note message (CC, program change, clock, SysEx...)
    Other,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [EventKind::NoteOn, EventKind::NoteOff, EventKind::Other];
}

/// What a metric listens to: one event kind, or everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subscription {
    Kind(EventKind),
    All,
}

impl Subscription {
    /// Event kinds delivered under this subscription.
    pub fn kinds(self) -> &'static [EventKind] {
        match self {
            Subscription::Kind(EventKind::NoteOn) => &[EventKind::NoteOn],
            Subscription::Kind(EventKind::NoteOff) => &[EventKind::NoteOff],
            Subscription::Kind(EventKind::Other) => &[EventKind::Other],
            Subscription::All => &EventKind::ALL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    /// MIDI key number (0 for non-note messages)
    pub key: u8,
    pub timestamp: Instant,
}

impl Event {
    pub fn new(kind: EventKind, key: u8, timestamp: Instant) -> Self {
        Self { kind, key, timestamp }
    }

    pub fn note_on(key: u8, timestamp: Instant) -> Self {
        Self::new(EventKind::NoteOn, key, timestamp)
    }

    pub fn note_off(key: u8, timestamp: Instant) -> Self {
        Self::new(EventKind::NoteOff, key, timestamp)
    }
}
