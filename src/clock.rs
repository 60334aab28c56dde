//! Clock Grid (C1): a monotonically increasing pulse count and running flag,
//! driven by a dedicated thread reading standard MIDI real-time messages
//! (spec.md §4.1, §6).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, warn};

use crate::error::MidiIoError;
use crate::event::Pulse;

/// The four real-time messages the clock grid consumes. Nothing else is
/// recognized at this layer (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockMessage {
    /// `0xF8`. Advances the pulse counter by one.
    Tick,
    /// `0xFA`. Resets the pulse counter to 0 and starts running.
    Start,
    /// `0xFB`. Resumes running without resetting the counter.
    Continue,
    /// `0xFC`. Stops running.
    Stop,
}

/// Abstract source of clock messages. Implementations block on the
/// underlying transport (spec.md §5: "The clock loop blocks on a MIDI
/// read"). Returning `Err` is fatal; there is no retry at this layer
/// (spec.md §4.1 "Failure").
pub trait ClockSource {
    /// Blocks until the next clock message arrives, or the source is
    /// disconnected.
    fn recv(&mut self) -> Result<ClockMessage, MidiIoError>;
}

/// A source of the current pulse count. Implemented by [`ClockHandle`] for
/// the live bridge; tests implement it directly to drive the control loop
/// against a scripted pulse sequence without a real clock thread.
pub trait PulseSource {
    /// Current pulse count (spec.md §4.1).
    fn pulse_count(&self) -> Pulse;
}

/// Read-only, cheaply cloneable handle onto the clock grid's shared state.
/// This is what the rest of the bridge holds onto; only
/// [`ClockGrid::run`] writes to the underlying atomics.
#[derive(Clone)]
pub struct ClockHandle {
    pulse: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
}

impl ClockHandle {
    /// Whether the external transport is currently in the running state.
    pub fn running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl PulseSource for ClockHandle {
    /// Current pulse count. Non-decreasing between start resets (spec.md
    /// §4.1 invariant). Readers may observe a value at most one increment
    /// stale, which is tolerable since every comparison against it uses
    /// `>=` (spec.md §5).
    fn pulse_count(&self) -> Pulse {
        self.pulse.load(Ordering::Acquire)
    }
}

/// Owns the pulse counter and running flag and the loop that updates them.
/// The counter is read-mostly and written by exactly one thread (spec.md
/// §4.1).
pub struct ClockGrid {
    pulse: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
}

impl ClockGrid {
    /// Creates a new clock grid. The pulse count starts at 0 and `running`
    /// starts false until a `Start` or `Continue` message arrives.
    pub fn new() -> Self {
        Self {
            pulse: Arc::new(AtomicU64::new(0)),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns a cloneable read handle for other threads to sample.
    pub fn handle(&self) -> ClockHandle {
        ClockHandle {
            pulse: self.pulse.clone(),
            running: self.running.clone(),
        }
    }

    /// Runs the clock input loop until `stop` is set or the source
    /// disconnects. A disconnected clock source is fatal to the bridge
    /// (spec.md §4.1); the error is returned so the caller can signal
    /// shutdown.
    pub fn run(
        self,
        mut source: impl ClockSource,
        stop: Arc<AtomicBool>,
    ) -> Result<(), MidiIoError> {
        while !stop.load(Ordering::Acquire) {
            match source.recv() {
                Ok(ClockMessage::Tick) => {
                    self.pulse.fetch_add(1, Ordering::AcqRel);
                }
                Ok(ClockMessage::Start) => {
                    self.pulse.store(0, Ordering::Release);
                    self.running.store(true, Ordering::Release);
                }
                Ok(ClockMessage::Continue) => {
                    self.running.store(true, Ordering::Release);
                }
                Ok(ClockMessage::Stop) => {
                    self.running.store(false, Ordering::Release);
                }
                Err(e) => {
                    warn!("clock source disconnected: {e}");
                    return Err(e);
                }
            }
        }
        debug!("clock loop stopped");
        Ok(())
    }
}

impl Default for ClockGrid {
    fn default() -> Self {
        Self::new()
    }
}
