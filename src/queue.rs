//! Scheduled Queue (C3): pulse-ordered priority queue of outbound events
//! awaiting their target pulse (spec.md §4.3).

use std::sync::Mutex;

use crate::event::{Event, Pulse};

/// Thread-safe, pulse-ordered queue of `(target_pulse, event)` pairs.
/// Invariant: sorted non-decreasing by `target_pulse` at rest, with ties
/// broken by insertion order (spec.md §4.3).
pub struct ScheduledQueue {
    entries: Mutex<Vec<(Pulse, Event)>>,
}

impl ScheduledQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Inserts a batch of `(target_pulse, event)` pairs. The batch may be
    /// given in any order; the queue restores its sort invariant before
    /// releasing the lock. Across calls, a stable sort preserves the
    /// relative order of equal-`target_pulse` entries, both within this
    /// batch and against everything already queued, so callers that order
    /// note-off before note-on at an equal pulse within one batch (spec.md
    /// §4.3 tie-break) get that ordering honored in the drained output.
    pub fn push_many(&self, batch: impl IntoIterator<Item = (Pulse, Event)>) {
        let mut entries = self.entries.lock().unwrap();
        entries.extend(batch);
        entries.sort_by_key(|(pulse, _)| *pulse);
    }

    /// Removes and returns, in ascending `target_pulse` order, every entry
    /// with `target_pulse <= current_pulse`. Calling this twice in a row
    /// with no intervening `push_many` returns an empty sequence the second
    /// time (spec.md §8).
    pub fn drain_due(&self, current_pulse: Pulse) -> Vec<(Pulse, Event)> {
        let mut entries = self.entries.lock().unwrap();
        let split = entries.partition_point(|(pulse, _)| *pulse <= current_pulse);
        entries.drain(..split).collect()
    }

    /// Empties the queue, discarding every pending entry.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    /// Number of entries currently queued.
    pub fn size(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

impl Default for ScheduledQueue {
    fn default() -> Self {
        Self::new()
    }
}
