//! Tagged MIDI event representation shared by every component of the bridge.

/// One MIDI clock tick. 24 pulses make a quarter note; this is the unit every
/// other time quantity in the crate (bar length, window size, target times) is
/// expressed in.
pub type Pulse = u64;

/// A MIDI channel, 0-15 (wire value, not the 1-16 convention some display
/// layers use).
pub type Channel = u8;

/// A tagged MIDI event. Covers the three message kinds the bridge's input and
/// output ports exchange: note-on, note-off and control-change. Program
/// change, pitch bend and system messages are out of scope (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Note-on. `velocity == 0` is a disguised note-off at the wire level but
    /// this crate treats it as a genuine note-on carrying velocity 0 (the
    /// caller is responsible for normalizing upstream if needed); only the
    /// anchor-detection rule in [`crate::bar_buffer`] special-cases velocity.
    NoteOn {
        /// MIDI channel.
        channel: Channel,
        /// Pitch, 0-127.
        pitch: u8,
        /// Velocity, 0-127.
        velocity: u8,
    },
    /// Note-off.
    NoteOff {
        /// MIDI channel.
        channel: Channel,
        /// Pitch, 0-127.
        pitch: u8,
        /// Release velocity, 0-127. Usually 0.
        velocity: u8,
    },
    /// Control-change.
    ControlChange {
        /// MIDI channel.
        channel: Channel,
        /// Controller number, 0-127.
        controller: u8,
        /// Controller value, 0-127.
        value: u8,
    },
}

impl Event {
    /// Channel this event targets.
    pub fn channel(&self) -> Channel {
        match *self {
            Event::NoteOn { channel, .. } => channel,
            Event::NoteOff { channel, .. } => channel,
            Event::ControlChange { channel, .. } => channel,
        }
    }

    /// True for a note-on with positive velocity. This is the only event
    /// kind that can set the anchor (spec.md §4.2) or open a pending note
    /// (spec.md §4.5.4 rule 2).
    pub fn is_note_on(&self) -> bool {
        matches!(self, Event::NoteOn { velocity, .. } if *velocity > 0)
    }

    /// True for a note-off, or for a note-on with velocity 0 (the standard
    /// MIDI "running status" idiom for note-off).
    pub fn is_note_off(&self) -> bool {
        matches!(self, Event::NoteOff { .. })
            || matches!(self, Event::NoteOn { velocity: 0, .. })
    }

    /// Pitch carried by a note-on or note-off event, if any.
    pub fn pitch(&self) -> Option<u8> {
        match *self {
            Event::NoteOn { pitch, .. } => Some(pitch),
            Event::NoteOff { pitch, .. } => Some(pitch),
            Event::ControlChange { .. } => None,
        }
    }
}

/// An input event captured from the performer, tagged with the absolute
/// pulse at which it was received (spec.md §3, "Input events additionally
/// carry an absolute pulse stamp assigned at capture time").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StampedEvent {
    /// The event itself.
    pub event: Event,
    /// Absolute pulse count at capture time.
    pub pulse: Pulse,
}

/// All-notes-off controller number, used to silence a channel at the end of
/// a scheduled window (spec.md §4.5.4 rule 5).
pub const CC_ALL_NOTES_OFF: u8 = 123;
