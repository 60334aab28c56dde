//! # genseq-bridge
//!
//! A real-time MIDI bridge coupling a DAW's clock to a background
//! generative continuation model. The performer plays one measure; a
//! background worker asks a model for a continuation; the bridge schedules
//! the continuation's notes onto future clock pulses, strictly inside a
//! bounded window, then hands control back to the performer.
//!
//! ## Overview
//!
//! Four long-lived threads cooperate through a small set of thread-safe
//! components:
//!
//! - The **clock grid** ([`clock`]) turns standard MIDI real-time bytes into
//!   a monotonically increasing pulse count.
//! - The **bar buffer** ([`bar_buffer`]) captures performer input, tagged by
//!   pulse, bucketed into measures.
//! - The **generation worker** ([`model`]) runs the opaque model call on its
//!   own thread so the real-time path never blocks on it.
//! - The **bridge controller** ([`controller`]) owns the phase state
//!   machine: it detects bar boundaries, submits generation jobs, enforces
//!   the output window on results, and dispatches scheduled events through
//!   the **scheduled queue** ([`queue`]).
//!
//! The entry point is [`run`].

#![warn(missing_docs)]

pub mod bar_buffer;
pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod event;
pub mod midi_io;
pub mod midi_parse;
pub mod model;
pub mod queue;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

pub use bar_buffer::BarBuffer;
pub use clock::{ClockGrid, ClockHandle, ClockMessage, ClockSource, PulseSource};
pub use config::BridgeConfig;
pub use controller::{BridgeController, Phase};
pub use error::{BridgeError, ConfigError, MidiIoError, MidiParseError, ModelError};
pub use event::{Channel, Event, Pulse, StampedEvent};
pub use midi_io::{InputSource, OutputSink};
pub use model::{spawn_worker, GenerationJob, ModelEngine, WorkerHandle};
pub use queue::ScheduledQueue;

/// Runs the bridge to completion. Blocks the calling thread as the control
/// loop (spec.md §5); the clock, input and generation worker each run on
/// their own thread. Shutdown is cooperative: set `stop` and the control
/// loop exits at its next iteration, the other three loops exit at their
/// next suspension-return (spec.md §5, "Cancellation and timeout").
///
/// A disconnected clock or input source is fatal and is surfaced here once
/// the other threads have wound down; a model failure or malformed
/// generated MIDI is not. Those are handled locally by the controller and
/// never escape as an error (spec.md §7).
pub fn run<CS, IS, OS, ME>(
    config: BridgeConfig,
    clock_source: CS,
    input_source: IS,
    output_sink: OS,
    engine: ME,
    stop: Arc<AtomicBool>,
) -> Result<(), BridgeError>
where
    CS: ClockSource + Send + 'static,
    IS: InputSource + Send + 'static,
    OS: OutputSink + Send + 'static,
    ME: ModelEngine + Send + 'static,
{
    config.validate()?;

    let bar_buffer = Arc::new(BarBuffer::new(config.pulses_per_bar()));
    let queue = Arc::new(ScheduledQueue::new());
    let clock_grid = ClockGrid::new();
    let clock_handle = clock_grid.handle();
    let (worker, worker_join) = spawn_worker(engine);

    let clock_stop = stop.clone();
    let clock_join = thread::spawn(move || clock_grid.run(clock_source, clock_stop));

    let input_stop = stop.clone();
    let input_bar_buffer = bar_buffer.clone();
    let input_clock_handle = clock_handle.clone();
    let input_join = thread::spawn(move || {
        run_input_loop(input_source, input_clock_handle, input_bar_buffer, input_stop)
    });

    let mut controller = BridgeController::new(
        config,
        clock_handle,
        bar_buffer,
        queue,
        worker.clone(),
        output_sink,
    );
    run_control_loop(&mut controller, stop.clone());

    // The control loop only returns once `stop` is set (by the caller, e.g.
    // a signal handler) or it's about to return for some other reason; make
    // sure the other loops unwind too before collecting their results.
    stop.store(true, Ordering::Release);
    worker.shutdown();

    let clock_result = clock_join.join().expect("clock thread panicked");
    let input_result = input_join.join().expect("input thread panicked");
    let _ = worker_join.join();

    clock_result?;
    input_result?;
    Ok(())
}

/// The MIDI input loop (spec.md §4.5, "an input loop captures events into
/// the bar buffer"): blocks on `source.recv()`, stamps each event with the
/// current pulse, and appends it to the bar buffer. A disconnect is fatal
/// (spec.md §7).
fn run_input_loop(
    mut source: impl InputSource,
    clock: ClockHandle,
    bar_buffer: Arc<BarBuffer>,
    stop: Arc<AtomicBool>,
) -> Result<(), MidiIoError> {
    while !stop.load(Ordering::Acquire) {
        let event = source.recv()?;
        let pulse = clock.pulse_count();
        bar_buffer.append(event, pulse);
    }
    Ok(())
}

/// The control loop: polls the controller and sleeps briefly between
/// iterations (spec.md §5, "must NOT block: it polls and sleeps briefly").
fn run_control_loop<O: OutputSink>(
    controller: &mut BridgeController<ClockHandle, O>,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::Acquire) {
        controller.tick();
        poll_sleep();
    }
}

#[cfg(feature = "std")]
fn poll_sleep() {
    spin_sleep::sleep(std::time::Duration::from_micros(500));
}

#[cfg(not(feature = "std"))]
fn poll_sleep() {
    std::thread::sleep(std::time::Duration::from_micros(500));
}
