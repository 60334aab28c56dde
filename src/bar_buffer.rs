//! Bar Buffer (C2): per-measure mapping of captured human events, tagged
//! with absolute pulse (spec.md §3, §4.2).

use std::sync::Mutex;

use hashbrown::HashMap;

use crate::event::{Event, Pulse, StampedEvent};

struct Inner {
    anchor: Option<Pulse>,
    bars: HashMap<u64, Vec<StampedEvent>>,
}

/// Thread-safe bar buffer: one producer (the input loop calling
/// [`BarBuffer::append`]), one consumer (the controller calling
/// [`BarBuffer::take`] and [`BarBuffer::clear`]).
pub struct BarBuffer {
    pulses_per_bar: u32,
    inner: Mutex<Inner>,
}

impl BarBuffer {
    /// Creates an empty bar buffer for a grid of `pulses_per_bar` pulses per
    /// measure.
    pub fn new(pulses_per_bar: u32) -> Self {
        Self {
            pulses_per_bar,
            inner: Mutex::new(Inner {
                anchor: None,
                bars: HashMap::new(),
            }),
        }
    }

    /// The anchor pulse, if set. Set at most once, by the first accepted
    /// note-on (spec.md §4.2, §8 invariant 5).
    pub fn anchor(&self) -> Option<Pulse> {
        self.inner.lock().unwrap().anchor
    }

    /// Appends a captured event at absolute `pulse`, applying the bar
    /// assignment rule of spec.md §4.2:
    ///
    /// - If the anchor is unset, a positive-velocity note-on sets it; any
    ///   other event received before the anchor is set is dropped (no ghost
    ///   events, no stray control changes).
    /// - An event whose pulse predates the anchor (a delayed timestamp) is
    ///   dropped.
    /// - Otherwise the event is appended, in capture order, to the sequence
    ///   for `bar = (pulse - anchor) / pulses_per_bar`.
    pub fn append(&self, event: Event, pulse: Pulse) {
        let mut inner = self.inner.lock().unwrap();
        let anchor = match inner.anchor {
            Some(a) => a,
            None => {
                if event.is_note_on() {
                    inner.anchor = Some(pulse);
                    pulse
                } else {
                    return;
                }
            }
        };
        if pulse < anchor {
            return;
        }
        let bar = (pulse - anchor) / self.pulses_per_bar as u64;
        inner
            .bars
            .entry(bar)
            .or_default()
            .push(StampedEvent { event, pulse });
    }

    /// Removes and returns the finalized sequence for `bar_index`, in
    /// capture order. Returns an empty vector if the bar has no events.
    pub fn take(&self, bar_index: u64) -> Vec<StampedEvent> {
        self.inner
            .lock()
            .unwrap()
            .bars
            .remove(&bar_index)
            .unwrap_or_default()
    }

    /// Clears every pending bar's events. Does **not** reset the anchor.
    /// spec.md §3 is explicit that the anchor, once set, is never mutated
    /// again; only the per-bar event sequences are cycle-scoped (spec.md
    /// §4.5.5, "Clear the bar buffer").
    pub fn clear(&self) {
        self.inner.lock().unwrap().bars.clear();
    }
}
