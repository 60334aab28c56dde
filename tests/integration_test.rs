//! End-to-end coverage of the full COLLECT/PLAY cycle (spec.md §8), driven
//! entirely through the public API: a controller built from real
//! `BarBuffer` / `ScheduledQueue` / generation worker, a scripted
//! `ModelEngine`, and a pulse source the test steps by hand instead of a
//! real clock thread.

use std::cell::Cell;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use midly::num::{u15, u28, u4, u7};
use midly::{Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};

use genseq_bridge::clock::PulseSource;
use genseq_bridge::midi_io::OutputSink;
use genseq_bridge::model::ModelEngine;
use genseq_bridge::{
    BarBuffer, BridgeConfig, BridgeController, Channel, Event, MidiIoError, ModelError, Phase,
    ScheduledQueue,
};

struct TestClock(Cell<u64>);

impl TestClock {
    fn new() -> Self {
        Self(Cell::new(0))
    }
    fn set(&self, pulse: u64) {
        self.0.set(pulse);
    }
}

impl PulseSource for &TestClock {
    fn pulse_count(&self) -> u64 {
        self.0.get()
    }
}

#[derive(Clone, Default)]
struct RecordingSink(Arc<Mutex<Vec<Event>>>);

impl RecordingSink {
    fn sent(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }
}

impl OutputSink for RecordingSink {
    fn send_note_on(&mut self, channel: Channel, pitch: u8, velocity: u8) -> Result<(), MidiIoError> {
        self.0.lock().unwrap().push(Event::NoteOn { channel, pitch, velocity });
        Ok(())
    }

    fn send_note_off(&mut self, channel: Channel, pitch: u8, velocity: u8) -> Result<(), MidiIoError> {
        self.0.lock().unwrap().push(Event::NoteOff { channel, pitch, velocity });
        Ok(())
    }

    fn send_cc(&mut self, channel: Channel, controller: u8, value: u8) -> Result<(), MidiIoError> {
        self.0.lock().unwrap().push(Event::ControlChange { channel, controller, value });
        Ok(())
    }
}

struct ScriptedEngine {
    blob: Vec<u8>,
}

impl ModelEngine for ScriptedEngine {
    fn generate(&self, _prompt: &[u8], _horizon_s: f32, _temperature: f32, _top_p: f32) -> Result<Vec<u8>, ModelError> {
        Ok(self.blob.clone())
    }
}

struct FailingEngine;

impl ModelEngine for FailingEngine {
    fn generate(&self, _prompt: &[u8], _horizon_s: f32, _temperature: f32, _top_p: f32) -> Result<Vec<u8>, ModelError> {
        Err(ModelError::Generation { reason: "model unavailable".into() })
    }
}

/// Builds a single-track standard MIDI file from `(delta_tick, pitch,
/// velocity)` note-on events; a velocity of 0 encodes a note-off.
fn smf_bytes(tpq: u16, events: &[(u32, u8, u8)]) -> Vec<u8> {
    let mut track: Vec<TrackEvent> = events
        .iter()
        .map(|&(delta, pitch, velocity)| {
            let message = if velocity > 0 {
                MidiMessage::NoteOn { key: u7::new(pitch), vel: u7::new(velocity) }
            } else {
                MidiMessage::NoteOff { key: u7::new(pitch), vel: u7::new(0) }
            };
            TrackEvent {
                delta: u28::new(delta),
                kind: TrackEventKind::Midi { channel: u4::new(0), message },
            }
        })
        .collect();
    track.push(TrackEvent { delta: u28::new(0), kind: TrackEventKind::Meta(MetaMessage::EndOfTrack) });
    let smf = Smf {
        header: Header {
            format: midly::Format::SingleTrack,
            timing: Timing::Metrical(u15::new(tpq)),
        },
        tracks: vec![track],
    };
    let mut buf = Vec::new();
    smf.write(&mut buf).unwrap();
    buf
}

/// Ticks the controller until `predicate` holds or the attempt budget is
/// exhausted; the budget exists only to fail tests cleanly instead of
/// hanging if a regression breaks the phase machine.
fn drive_until(
    controller: &mut BridgeController<&TestClock, RecordingSink>,
    predicate: impl Fn(&BridgeController<&TestClock, RecordingSink>) -> bool,
) {
    for _ in 0..10_000 {
        controller.tick();
        if predicate(controller) {
            return;
        }
        std::thread::sleep(Duration::from_micros(50));
    }
    panic!("condition not reached within the tick budget");
}

/// Minimal cycle: one captured note, a closed two-event response,
/// schedule, playback, and return to COLLECT.
#[test]
fn minimal_cycle_submits_schedules_and_returns_to_collect() {
    let bar_buffer = Arc::new(BarBuffer::new(96));
    let queue = Arc::new(ScheduledQueue::new());
    let engine = ScriptedEngine {
        blob: smf_bytes(480, &[(240, 62, 100), (240, 62, 0)]),
    };
    let (worker, join) = genseq_bridge::spawn_worker(engine);
    let clock = TestClock::new();
    let sink = RecordingSink::default();

    let mut controller = BridgeController::new(
        BridgeConfig::default(),
        &clock,
        bar_buffer.clone(),
        queue.clone(),
        worker.clone(),
        sink.clone(),
    );

    bar_buffer.append(Event::NoteOn { channel: 0, pitch: 60, velocity: 100 }, 100);
    clock.set(100);
    controller.tick();

    clock.set(196);
    drive_until(&mut controller, |c| c.phase() == Phase::Play);

    clock.set(220);
    drive_until(&mut controller, |c| sink.sent().len() >= 2);

    clock.set(388);
    drive_until(&mut controller, |c| c.phase() == Phase::Collect);

    let sent = sink.sent();
    assert!(sent.contains(&Event::NoteOn { channel: 0, pitch: 62, velocity: 100 }));
    assert!(sent.contains(&Event::NoteOff { channel: 0, pitch: 62, velocity: 0 }));
    assert_eq!(queue.size(), 0);

    worker.shutdown();
    join.join().unwrap();
}

/// An event far beyond the window is dropped with no stray output.
#[test]
fn overflow_event_is_dropped_with_no_stray_output() {
    let bar_buffer = Arc::new(BarBuffer::new(96));
    let queue = Arc::new(ScheduledQueue::new());
    let engine = ScriptedEngine { blob: smf_bytes(480, &[(4000, 70, 100)]) };
    let (worker, join) = genseq_bridge::spawn_worker(engine);
    let clock = TestClock::new();
    let sink = RecordingSink::default();

    let mut controller = BridgeController::new(
        BridgeConfig::default(),
        &clock,
        bar_buffer.clone(),
        queue.clone(),
        worker.clone(),
        sink.clone(),
    );

    bar_buffer.append(Event::NoteOn { channel: 0, pitch: 60, velocity: 100 }, 100);
    clock.set(100);
    controller.tick();

    clock.set(196);
    drive_until(&mut controller, |c| c.phase() == Phase::Play);

    clock.set(388);
    drive_until(&mut controller, |c| c.phase() == Phase::Collect);

    let sent = sink.sent();
    assert!(!sent.iter().any(|e| matches!(e, Event::NoteOn { pitch: 70, .. })));
    // Only the all-notes-off marker should have been scheduled for this window.
    assert_eq!(sent.len(), 1);

    worker.shutdown();
    join.join().unwrap();
}

/// An unclosed note-on is force-closed at the window boundary.
#[test]
fn unclosed_note_is_forced_off_at_boundary() {
    let bar_buffer = Arc::new(BarBuffer::new(96));
    let queue = Arc::new(ScheduledQueue::new());
    let engine = ScriptedEngine { blob: smf_bytes(480, &[(96, 72, 100)]) };
    let (worker, join) = genseq_bridge::spawn_worker(engine);
    let clock = TestClock::new();
    let sink = RecordingSink::default();

    let mut controller = BridgeController::new(
        BridgeConfig::default(),
        &clock,
        bar_buffer.clone(),
        queue.clone(),
        worker.clone(),
        sink.clone(),
    );

    bar_buffer.append(Event::NoteOn { channel: 0, pitch: 60, velocity: 100 }, 100);
    clock.set(100);
    controller.tick();

    clock.set(196);
    drive_until(&mut controller, |c| c.phase() == Phase::Play);

    clock.set(388);
    drive_until(&mut controller, |c| c.phase() == Phase::Collect);

    let sent = sink.sent();
    assert!(sent.contains(&Event::NoteOn { channel: 0, pitch: 72, velocity: 100 }));
    assert!(sent.contains(&Event::NoteOff { channel: 0, pitch: 72, velocity: 0 }));

    worker.shutdown();
    join.join().unwrap();
}

/// An empty bar submits no job and leaves the phase at COLLECT.
#[test]
fn empty_bar_skips_submission_and_stays_collect() {
    let bar_buffer = Arc::new(BarBuffer::new(96));
    let queue = Arc::new(ScheduledQueue::new());
    let engine = ScriptedEngine { blob: Vec::new() };
    let (worker, join) = genseq_bridge::spawn_worker(engine);
    let clock = TestClock::new();
    let sink = RecordingSink::default();

    let mut controller = BridgeController::new(
        BridgeConfig::default(),
        &clock,
        bar_buffer.clone(),
        queue.clone(),
        worker.clone(),
        sink.clone(),
    );

    // The anchor-setting note-on is immediately drained by the bar boundary
    // that follows, leaving the first measure's sequence empty.
    bar_buffer.append(Event::NoteOn { channel: 0, pitch: 60, velocity: 100 }, 0);
    bar_buffer.take(0);

    clock.set(96);
    for _ in 0..10 {
        controller.tick();
    }

    assert_eq!(controller.phase(), Phase::Collect);
    assert!(sink.sent().is_empty());
    assert_eq!(queue.size(), 0);

    worker.shutdown();
    join.join().unwrap();
}

/// A one-measure window schedules and closes inside a single bar.
#[test]
fn single_measure_window_schedules_and_closes_within_one_bar() {
    let bar_buffer = Arc::new(BarBuffer::new(96));
    let queue = Arc::new(ScheduledQueue::new());
    let engine = ScriptedEngine { blob: smf_bytes(480, &[(240, 64, 100)]) };
    let (worker, join) = genseq_bridge::spawn_worker(engine);
    let clock = TestClock::new();
    let sink = RecordingSink::default();

    let config = BridgeConfig { measures: 1, ..BridgeConfig::default() };
    let mut controller = BridgeController::new(config, &clock, bar_buffer.clone(), queue.clone(), worker.clone(), sink.clone());

    // Anchor at pulse 0, with the bar's one captured event arriving at
    // pulse 40.
    bar_buffer.append(Event::NoteOn { channel: 0, pitch: 55, velocity: 100 }, 0);
    bar_buffer.append(Event::NoteOn { channel: 0, pitch: 60, velocity: 100 }, 40);
    clock.set(0);
    controller.tick();

    clock.set(96);
    drive_until(&mut controller, |c| c.phase() == Phase::Play);

    clock.set(108);
    drive_until(&mut controller, |c| sink.sent().iter().any(|e| matches!(e, Event::NoteOn { pitch: 64, .. })));

    clock.set(192);
    drive_until(&mut controller, |c| c.phase() == Phase::Collect);

    worker.shutdown();
    join.join().unwrap();
}

/// A model failure discards the job; the next boundary submits fresh.
#[test]
fn model_failure_discards_job_and_stays_collect() {
    let bar_buffer = Arc::new(BarBuffer::new(96));
    let queue = Arc::new(ScheduledQueue::new());
    let (worker, join) = genseq_bridge::spawn_worker(FailingEngine);
    let clock = TestClock::new();
    let sink = RecordingSink::default();

    let mut controller = BridgeController::new(
        BridgeConfig::default(),
        &clock,
        bar_buffer.clone(),
        queue.clone(),
        worker.clone(),
        sink.clone(),
    );

    bar_buffer.append(Event::NoteOn { channel: 0, pitch: 60, velocity: 100 }, 0);
    clock.set(96);
    for _ in 0..10 {
        controller.tick();
        std::thread::sleep(Duration::from_micros(200));
    }

    assert_eq!(controller.phase(), Phase::Collect);
    assert_eq!(queue.size(), 0);
    assert!(sink.sent().is_empty());

    worker.shutdown();
    join.join().unwrap();
}
