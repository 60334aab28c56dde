//! MIDI parsing (C7): encodes the prompt sent to the model engine and
//! enforces the output window on a generated response (spec.md §4.5.2,
//! §4.5.4), using `midly` the same way the teacher crate's track loader
//! does for reading standard MIDI files.

use hashbrown::{HashMap, HashSet};
use midly::num::{u15, u28, u4, u7};
use midly::{Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};

use crate::event::{Channel, Event, Pulse, StampedEvent, CC_ALL_NOTES_OFF};
use crate::error::MidiParseError;

const PULSES_PER_QUARTER: u64 = 24;

/// Encodes up to two bars of captured human events as a single-track
/// standard MIDI file, to be sent as the model's prompt (spec.md §4.5.2).
/// `bar_start_pulse` is the absolute pulse of the first of the two bars;
/// event timestamps are expressed relative to it.
pub fn build_prompt_blob(events: &[StampedEvent], bar_start_pulse: Pulse, ticks_per_beat: u32) -> Vec<u8> {
    let tpq = ticks_per_beat.max(1);
    let mut track = Vec::with_capacity(events.len() + 1);
    let mut prev_tick: u64 = 0;

    for stamped in events {
        let rel_pulse = stamped.pulse.saturating_sub(bar_start_pulse);
        let abs_tick = rel_pulse * tpq as u64 / PULSES_PER_QUARTER;
        let delta = abs_tick.saturating_sub(prev_tick);
        prev_tick = abs_tick;

        let channel = u4::new(stamped.event.channel().min(15));
        let message = match stamped.event {
            Event::NoteOn { pitch, velocity, .. } => MidiMessage::NoteOn {
                key: u7::new(pitch.min(127)),
                vel: u7::new(velocity.min(127)),
            },
            Event::NoteOff { pitch, velocity, .. } => MidiMessage::NoteOff {
                key: u7::new(pitch.min(127)),
                vel: u7::new(velocity.min(127)),
            },
            Event::ControlChange { controller, value, .. } => MidiMessage::Controller {
                controller: u7::new(controller.min(127)),
                value: u7::new(value.min(127)),
            },
        };

        track.push(TrackEvent {
            delta: u28::new(delta.min(u32::MAX as u64) as u32),
            kind: TrackEventKind::Midi { channel, message },
        });
    }

    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let smf = Smf {
        header: Header {
            format: midly::Format::SingleTrack,
            timing: Timing::Metrical(u15::new(tpq.min(0x7fff) as u16)),
        },
        tracks: vec![track],
    };

    let mut buf = Vec::new();
    // Writing to an in-memory Vec cannot fail.
    smf.write(&mut buf).expect("MIDI prompt encoding failed");
    buf
}

/// Applies the window-enforcement rules of spec.md §4.5.4 to a generated
/// MIDI blob, producing the batch of `(target_pulse, event)` pairs to hand
/// to the scheduled queue.
///
/// `boundary_pulse` is the pulse at which playback begins; `window_pulses`
/// is `W = N * pulses_per_bar`.
pub fn enforce_window(
    blob: &[u8],
    boundary_pulse: Pulse,
    window_pulses: u32,
) -> Result<Vec<(Pulse, Event)>, MidiParseError> {
    let smf = Smf::parse(blob)?;
    let tpq = match smf.header.timing {
        Timing::Metrical(tpq) => tpq.as_int() as u64,
        Timing::Timecode(..) => return Err(MidiParseError::BadTiming),
    };
    let tpq = tpq.max(1);
    let track = smf.tracks.first().ok_or(MidiParseError::NoTracks)?;

    let window_pulses = window_pulses as u64;
    let mut abs_tick: u64 = 0;
    let mut active: HashMap<(Channel, u8), Pulse> = HashMap::new();
    let mut channels_seen: HashSet<Channel> = HashSet::new();
    channels_seen.insert(0);
    let mut out = Vec::new();

    for event in track {
        abs_tick += event.delta.as_int() as u64;
        let offset_pulses = (abs_tick * PULSES_PER_QUARTER) / tpq;

        // Rule 1: drop anything at or beyond the window.
        if offset_pulses >= window_pulses {
            continue;
        }
        let target_pulse = boundary_pulse + offset_pulses;

        let TrackEventKind::Midi { channel, message } = event.kind else {
            continue;
        };
        let channel_id: Channel = channel.as_int();

        match message {
            MidiMessage::NoteOn { key, vel } => {
                let pitch = key.as_int();
                let velocity = vel.as_int();
                channels_seen.insert(channel_id);
                if velocity > 0 {
                    // Rule 2: track by pitch (and channel, per this crate's
                    // multi-channel generalization of spec.md §9).
                    active.insert((channel_id, pitch), target_pulse);
                    out.push((
                        target_pulse,
                        Event::NoteOn {
                            channel: channel_id,
                            pitch,
                            velocity,
                        },
                    ));
                } else {
                    active.remove(&(channel_id, pitch));
                    out.push((
                        target_pulse,
                        Event::NoteOff {
                            channel: channel_id,
                            pitch,
                            velocity: 0,
                        },
                    ));
                }
            }
            MidiMessage::NoteOff { key, vel } => {
                let pitch = key.as_int();
                channels_seen.insert(channel_id);
                active.remove(&(channel_id, pitch));
                out.push((
                    target_pulse,
                    Event::NoteOff {
                        channel: channel_id,
                        pitch,
                        velocity: vel.as_int(),
                    },
                ));
            }
            MidiMessage::Controller { controller, value } => {
                out.push((
                    target_pulse,
                    Event::ControlChange {
                        channel: channel_id,
                        controller: controller.as_int(),
                        value: value.as_int(),
                    },
                ));
            }
            _ => {}
        }
    }

    let window_end = boundary_pulse + window_pulses;

    // Rule 4: force-close every pitch still active at the end of parsing.
    let mut dangling: Vec<(Channel, u8)> = active.into_keys().collect();
    dangling.sort_unstable();
    for (channel_id, pitch) in dangling {
        out.push((
            window_end,
            Event::NoteOff {
                channel: channel_id,
                pitch,
                velocity: 0,
            },
        ));
    }

    // Rule 5: silence every channel that played a note during this window.
    let mut channels: Vec<Channel> = channels_seen.into_iter().collect();
    channels.sort_unstable();
    for channel_id in channels {
        out.push((
            window_end,
            Event::ControlChange {
                channel: channel_id,
                controller: CC_ALL_NOTES_OFF,
                value: 0,
            },
        ));
    }

    Ok(out)
}
