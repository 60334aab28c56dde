//! MIDI I/O adapters (C6): concrete, `midir`-backed implementations of the
//! three abstract ports spec.md §6 treats as given (clock source, input
//! source, output sink), plus test doubles used by the unit and integration
//! tests.

use crate::clock::ClockMessage;
use crate::error::MidiIoError;
use crate::event::{Channel, Event};

/// Abstract source of performer input: note-on, note-off and control-change
/// messages (spec.md §6). Implementations block on the underlying
/// transport (spec.md §5).
pub trait InputSource {
    /// Blocks until the next recognized channel message arrives, or the
    /// source disconnects. Messages other than note-on/off/CC are filtered
    /// out by the implementation before they reach this call.
    fn recv(&mut self) -> Result<Event, MidiIoError>;
}

/// Abstract output sink accepting note-on, note-off and control-change
/// events one at a time, in emission order (spec.md §6).
pub trait OutputSink {
    /// Sends a note-on message.
    fn send_note_on(&mut self, channel: Channel, pitch: u8, velocity: u8) -> Result<(), MidiIoError>;
    /// Sends a note-off message.
    fn send_note_off(&mut self, channel: Channel, pitch: u8, velocity: u8) -> Result<(), MidiIoError>;
    /// Sends a control-change message.
    fn send_cc(&mut self, channel: Channel, controller: u8, value: u8) -> Result<(), MidiIoError>;

    /// Dispatches a tagged [`Event`] to the matching `send_*` method. Not
    /// intended to be overridden.
    fn send_event(&mut self, event: Event) -> Result<(), MidiIoError> {
        match event {
            Event::NoteOn { channel, pitch, velocity } => self.send_note_on(channel, pitch, velocity),
            Event::NoteOff { channel, pitch, velocity } => self.send_note_off(channel, pitch, velocity),
            Event::ControlChange { channel, controller, value } => {
                self.send_cc(channel, controller, value)
            }
        }
    }
}

/// Decodes the status byte of a channel-voice message. Returns `None` for
/// anything this bridge does not recognize (spec.md §6: "Others are
/// ignored").
pub fn decode_channel_message(bytes: &[u8]) -> Option<Event> {
    if bytes.len() < 3 {
        return None;
    }
    let status = bytes[0];
    let channel = status & 0x0f;
    match status & 0xf0 {
        0x90 => Some(Event::NoteOn {
            channel,
            pitch: bytes[1],
            velocity: bytes[2],
        }),
        0x80 => Some(Event::NoteOff {
            channel,
            pitch: bytes[1],
            velocity: bytes[2],
        }),
        0xb0 => Some(Event::ControlChange {
            channel,
            controller: bytes[1],
            value: bytes[2],
        }),
        _ => None,
    }
}

/// Decodes a MIDI real-time status byte. Only the four bytes spec.md §6
/// names are recognized.
pub fn decode_clock_message(byte: u8) -> Option<ClockMessage> {
    match byte {
        0xf8 => Some(ClockMessage::Tick),
        0xfa => Some(ClockMessage::Start),
        0xfb => Some(ClockMessage::Continue),
        0xfc => Some(ClockMessage::Stop),
        _ => None,
    }
}

/// In-memory test double for [`crate::clock::ClockSource`], fed by an
/// `mpsc` channel.
pub mod fake {
    use std::sync::mpsc;

    use super::*;
    use crate::clock::ClockSource;

    /// Clock source driven by a channel; used in unit and integration tests.
    pub struct FakeClockSource(pub mpsc::Receiver<ClockMessage>);

    impl ClockSource for FakeClockSource {
        fn recv(&mut self) -> Result<ClockMessage, MidiIoError> {
            self.0.recv().map_err(|_| MidiIoError::Disconnected)
        }
    }

    /// Input source driven by a channel.
    pub struct FakeInputSource(pub mpsc::Receiver<Event>);

    impl InputSource for FakeInputSource {
        fn recv(&mut self) -> Result<Event, MidiIoError> {
            self.0.recv().map_err(|_| MidiIoError::Disconnected)
        }
    }

    /// Output sink that records every emitted event, in order, for test
    /// assertions.
    #[derive(Default)]
    pub struct FakeOutputSink {
        /// Every event sent so far, in emission order.
        pub sent: Vec<Event>,
    }

    impl OutputSink for FakeOutputSink {
        fn send_note_on(&mut self, channel: Channel, pitch: u8, velocity: u8) -> Result<(), MidiIoError> {
            self.sent.push(Event::NoteOn { channel, pitch, velocity });
            Ok(())
        }

        fn send_note_off(&mut self, channel: Channel, pitch: u8, velocity: u8) -> Result<(), MidiIoError> {
            self.sent.push(Event::NoteOff { channel, pitch, velocity });
            Ok(())
        }

        fn send_cc(&mut self, channel: Channel, controller: u8, value: u8) -> Result<(), MidiIoError> {
            self.sent.push(Event::ControlChange { channel, controller, value });
            Ok(())
        }
    }
}

#[cfg(feature = "std")]
mod midir_backed {
    use std::sync::mpsc;

    use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};

    use super::*;
    use crate::clock::ClockSource;

    /// Lists the available input port names, for the bootstrap binary's
    /// port-selection prompt.
    pub fn list_input_ports(client_name: &str) -> Result<Vec<String>, MidiIoError> {
        let midi_in = MidiInput::new(client_name)?;
        Ok(midi_in
            .ports()
            .iter()
            .map(|p| midi_in.port_name(p).unwrap_or_else(|_| "<unknown>".into()))
            .collect())
    }

    /// Lists the available output port names.
    pub fn list_output_ports(client_name: &str) -> Result<Vec<String>, MidiIoError> {
        let midi_out = MidiOutput::new(client_name)?;
        Ok(midi_out
            .ports()
            .iter()
            .map(|p| midi_out.port_name(p).unwrap_or_else(|_| "<unknown>".into()))
            .collect())
    }

    /// `midir`-backed clock source. The clock and input ports are opened
    /// separately even when they are the same physical port, since a DAW
    /// typically multiplexes clock and note data on one MIDI connection and
    /// the bridge demultiplexes them into two logical streams here.
    pub struct MidirClockSource {
        _conn: MidiInputConnection<()>,
        receiver: mpsc::Receiver<ClockMessage>,
    }

    impl MidirClockSource {
        /// Connects to input port `index`, filtering to the four real-time
        /// messages spec.md §6 names.
        pub fn connect(client_name: &str, index: usize) -> Result<Self, MidiIoError> {
            let mut midi_in = MidiInput::new(client_name)?;
            midi_in.ignore(Ignore::None);
            let ports = midi_in.ports();
            let port = ports.get(index).ok_or(MidiIoError::PortNotFound(index))?;
            let (sender, receiver) = mpsc::channel();
            let conn = midi_in.connect(
                port,
                "genseq-bridge-clock",
                move |_timestamp, bytes, _| {
                    if let Some(byte) = bytes.first() {
                        if let Some(message) = decode_clock_message(*byte) {
                            let _ = sender.send(message);
                        }
                    }
                },
                (),
            )?;
            Ok(Self { _conn: conn, receiver })
        }
    }

    impl ClockSource for MidirClockSource {
        fn recv(&mut self) -> Result<ClockMessage, MidiIoError> {
            self.receiver.recv().map_err(|_| MidiIoError::Disconnected)
        }
    }

    /// `midir`-backed input source for performer note/CC events.
    pub struct MidirInputSource {
        _conn: MidiInputConnection<()>,
        receiver: mpsc::Receiver<Event>,
    }

    impl MidirInputSource {
        /// Connects to input port `index`, filtering to note-on, note-off
        /// and control-change messages (spec.md §6).
        pub fn connect(client_name: &str, index: usize) -> Result<Self, MidiIoError> {
            let mut midi_in = MidiInput::new(client_name)?;
            midi_in.ignore(Ignore::None);
            let ports = midi_in.ports();
            let port = ports.get(index).ok_or(MidiIoError::PortNotFound(index))?;
            let (sender, receiver) = mpsc::channel();
            let conn = midi_in.connect(
                port,
                "genseq-bridge-input",
                move |_timestamp, bytes, _| {
                    if let Some(event) = decode_channel_message(bytes) {
                        let _ = sender.send(event);
                    }
                },
                (),
            )?;
            Ok(Self { _conn: conn, receiver })
        }
    }

    impl InputSource for MidirInputSource {
        fn recv(&mut self) -> Result<Event, MidiIoError> {
            self.receiver.recv().map_err(|_| MidiIoError::Disconnected)
        }
    }

    /// `midir`-backed output sink.
    pub struct MidirOutputSink {
        conn: MidiOutputConnection,
    }

    impl MidirOutputSink {
        /// Connects to output port `index`.
        pub fn connect(client_name: &str, index: usize) -> Result<Self, MidiIoError> {
            let midi_out = MidiOutput::new(client_name)?;
            let ports = midi_out.ports();
            let port = ports.get(index).ok_or(MidiIoError::PortNotFound(index))?;
            let conn = midi_out.connect(port, "genseq-bridge-output")?;
            Ok(Self { conn })
        }
    }

    impl OutputSink for MidirOutputSink {
        fn send_note_on(&mut self, channel: Channel, pitch: u8, velocity: u8) -> Result<(), MidiIoError> {
            self.conn
                .send(&[0x90 | (channel & 0x0f), pitch, velocity])
                .map_err(MidiIoError::from)
        }

        fn send_note_off(&mut self, channel: Channel, pitch: u8, velocity: u8) -> Result<(), MidiIoError> {
            self.conn
                .send(&[0x80 | (channel & 0x0f), pitch, velocity])
                .map_err(MidiIoError::from)
        }

        fn send_cc(&mut self, channel: Channel, controller: u8, value: u8) -> Result<(), MidiIoError> {
            self.conn
                .send(&[0xb0 | (channel & 0x0f), controller, value])
                .map_err(MidiIoError::from)
        }
    }
}

#[cfg(feature = "std")]
pub use midir_backed::*;
