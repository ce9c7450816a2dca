//! Fixed-capacity circular diagnostic event log.
//!
//! Modeled as `(buffer, head, len)` with `len` saturating at capacity;
//! there is no resize path. Once full, the oldest entry is overwritten.

use heapless::Vec;
use serde::{Deserialize, Serialize};

use ecu_common::consts::DIAG_MAX_EVENTS;
use ecu_common::diag::DiagEventKind;

/// One logged diagnostic event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Event type tag.
    pub kind: DiagEventKind,
    /// 32-bit event payload (wheel index, DTC wire code, state value, ...).
    pub data: u32,
    /// Log timestamp [ms tick].
    pub timestamp: u32,
}

/// Circular log of the most recent [`DIAG_MAX_EVENTS`] events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog {
    entries: Vec<EventRecord, DIAG_MAX_EVENTS>,
    /// Next write position once the buffer is full.
    head: usize,
}

impl EventLog {
    /// Empty log.
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            head: 0,
        }
    }

    /// Append an event, overwriting the oldest once full.
    pub fn push(&mut self, kind: DiagEventKind, data: u32, timestamp: u32) {
        let record = EventRecord {
            kind,
            data,
            timestamp,
        };
        if self.entries.len() < DIAG_MAX_EVENTS {
            // Cannot fail: length checked against capacity above.
            let _ = self.entries.push(record);
        } else {
            self.entries[self.head] = record;
        }
        self.head = (self.head + 1) % DIAG_MAX_EVENTS;
    }

    /// Number of stored events, saturating at capacity.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no events have been logged.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate events oldest → newest.
    pub fn iter(&self) -> impl Iterator<Item = &EventRecord> {
        let split = if self.entries.len() < DIAG_MAX_EVENTS {
            0
        } else {
            self.head
        };
        self.entries[split..].iter().chain(self.entries[..split].iter())
    }

    /// Count events of one kind currently in the log.
    pub fn count_of(&self, kind: DiagEventKind) -> usize {
        self.iter().filter(|e| e.kind == kind).count()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}
