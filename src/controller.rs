//! Bridge Controller (C5): the phase state machine, bar-boundary detection,
//! prompt assembly, window enforcement, scheduling and output dispatch
//! (spec.md §4.5). This is where the three other loops' work is tied
//! together; everything here runs on a single thread, so phase and the
//! pending-job pointer need no synchronization beyond what the worker
//! handoff already provides (spec.md §9, "Shared mutable state").

use std::sync::Arc;

use log::info;

use crate::bar_buffer::BarBuffer;
use crate::clock::PulseSource;
use crate::config::BridgeConfig;
use crate::event::{Pulse, StampedEvent};
use crate::midi_io::OutputSink;
use crate::midi_parse::{self, build_prompt_blob};
use crate::model::{GenerationJob, WorkerHandle};
use crate::queue::ScheduledQueue;

/// The two-state machine of spec.md §4.5.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Human input is being captured; bar boundaries trigger generation.
    Collect,
    /// A model response is scheduled; bar boundaries are pulse-accounting
    /// only.
    Play,
}

/// Owns the phase, the pending job, and the loops' interaction with the bar
/// buffer, scheduled queue and worker. One instance runs on the control
/// loop's thread.
pub struct BridgeController<C: PulseSource, O: OutputSink> {
    config: BridgeConfig,
    clock: C,
    bar_buffer: Arc<BarBuffer>,
    queue: Arc<ScheduledQueue>,
    worker: WorkerHandle,
    output: O,

    phase: Phase,
    next_bar_boundary_pulse: Option<Pulse>,
    model_end_pulse: Option<Pulse>,
    pending_job: Option<Arc<GenerationJob>>,
    next_job_id: u64,
    /// Events of the most recently `take`n bar, retained so the following
    /// boundary can prepend them as "previous bar" context (spec.md §4.5.2
    /// step 2). The bar buffer's own `take` is destructive, so this is the
    /// only place that context still exists once a bar has been consumed.
    last_bar_events: Vec<StampedEvent>,
}

impl<C: PulseSource, O: OutputSink> BridgeController<C, O> {
    /// Builds a controller in the COLLECT phase with no pending job.
    pub fn new(
        config: BridgeConfig,
        clock: C,
        bar_buffer: Arc<BarBuffer>,
        queue: Arc<ScheduledQueue>,
        worker: WorkerHandle,
        output: O,
    ) -> Self {
        Self {
            config,
            clock,
            bar_buffer,
            queue,
            worker,
            output,
            phase: Phase::Collect,
            next_bar_boundary_pulse: None,
            model_end_pulse: None,
            pending_job: None,
            next_job_id: 0,
            last_bar_events: Vec::new(),
        }
    }

    /// Current phase. Exposed for tests and diagnostics.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// One iteration of the control loop: boundary detection, result
    /// polling, then output dispatch, in that order (spec.md §4.5.1,
    /// §4.5.3, §4.5.5). Never blocks.
    pub fn tick(&mut self) {
        self.detect_boundary();
        self.poll_pending_job();
        self.dispatch();
    }

    /// §4.5.1: advances `next_bar_boundary_pulse` and fires the boundary
    /// handler whenever the current pulse has crossed it while in COLLECT.
    /// While in PLAY the boundary still advances (pulse accounting only,
    /// spec.md §4.5.6) but never calls the handler. A `while` loop rather
    /// than a single check so a pulse jump spanning more than one bar (e.g.
    /// the whole PLAY window) catches the boundary counter up in one tick
    /// instead of lagging for several subsequent ticks.
    fn detect_boundary(&mut self) {
        let Some(anchor) = self.bar_buffer.anchor() else {
            return;
        };
        let pulses_per_bar = self.config.pulses_per_bar() as Pulse;
        let current_pulse = self.clock.pulse_count();

        loop {
            let next_boundary = *self
                .next_bar_boundary_pulse
                .get_or_insert(anchor + pulses_per_bar);
            if current_pulse < next_boundary {
                return;
            }
            self.next_bar_boundary_pulse = Some(next_boundary + pulses_per_bar);
            if self.phase != Phase::Collect {
                continue;
            }
            let finished_bar = (next_boundary - anchor) / pulses_per_bar - 1;
            info!("[bar_boundary] finished_bar={finished_bar} pulse={current_pulse}");
            self.handle_boundary(finished_bar);
        }
    }

    /// §4.5.2: COLLECT-only boundary handler. Assembles a prompt from the
    /// previous and current bar's events and submits a generation job.
    fn handle_boundary(&mut self, finished_bar: u64) {
        let bar_events = self.bar_buffer.take(finished_bar);
        if bar_events.is_empty() || self.pending_job.is_some() {
            // Empty prompt: skip submission, remain in COLLECT (spec.md §7).
            // A still-pending job only happens if several boundaries were
            // crossed in one tick; the new bar's events wait for the next one.
            self.last_bar_events = bar_events;
            return;
        }

        let anchor = self.bar_buffer.anchor().expect("boundary implies anchor set");
        let pulses_per_bar = self.config.pulses_per_bar() as Pulse;
        let prompt_start_bar = if self.last_bar_events.is_empty() {
            finished_bar
        } else {
            finished_bar.saturating_sub(1)
        };
        let prompt_start_pulse = anchor + prompt_start_bar * pulses_per_bar;

        let prompt_events: Vec<StampedEvent> = self
            .last_bar_events
            .iter()
            .chain(bar_events.iter())
            .copied()
            .collect();
        let prompt_blob = build_prompt_blob(&prompt_events, prompt_start_pulse, self.config.ticks_per_beat);

        let job_id = self.next_job_id;
        self.next_job_id += 1;
        let job = Arc::new(GenerationJob::new(
            job_id,
            finished_bar,
            prompt_blob,
            self.config.temperature,
            self.config.top_p,
            self.config.measures,
            self.clock.pulse_count(),
        ));
        self.worker.submit(job.clone());
        self.pending_job = Some(job);
        self.last_bar_events = bar_events;
        info!("[enqueue] job={job_id} bar={finished_bar}");
    }

    /// §4.5.3: COLLECT-only result polling. A result observed while already
    /// in PLAY is never reachable through this check. spec.md §4.5.6
    /// guarantees no job is submitted during PLAY, so the phase guard here
    /// is the thing that makes that invariant hold rather than a
    /// defense against a real late-arrival race.
    fn poll_pending_job(&mut self) {
        if self.phase != Phase::Collect {
            return;
        }
        let Some(job) = self.pending_job.clone() else {
            return;
        };
        let Some(result) = job.take_result() else {
            return;
        };
        info!("[ai_ready] job={}", job.job_id);
        self.pending_job = None;

        match result {
            Err(e) => {
                log::warn!("model failure for bar {}: {e}", job.bar_index);
            }
            Ok(blob) => {
                let boundary_pulse = self.clock.pulse_count();
                match midi_parse::enforce_window(&blob, boundary_pulse, self.config.window_pulses()) {
                    Err(e) => {
                        log::warn!("malformed generated MIDI for bar {}: {e}", job.bar_index);
                    }
                    Ok(batch) => self.schedule_response(batch, boundary_pulse),
                }
            }
        }
    }

    /// §4.5.4 tail + §4.5.6 COLLECT -> PLAY transition.
    fn schedule_response(&mut self, batch: Vec<(Pulse, crate::event::Event)>, boundary_pulse: Pulse) {
        if self.queue.size() > 0 {
            self.queue.clear();
        }

        let window = self.config.window_pulses() as Pulse;
        let min = batch.iter().map(|(p, _)| *p).min();
        let max = batch.iter().map(|(p, _)| *p).max();
        info!(
            "[schedule] range=[{}..{}) min={:?} max={:?}",
            boundary_pulse,
            boundary_pulse + window,
            min,
            max
        );

        self.queue.push_many(batch);
        self.phase = Phase::Play;
        self.model_end_pulse = Some(boundary_pulse + window);
        info!("[phase] COLLECT -> PLAY");
    }

    /// §4.5.5: drains due events to the output sink, then handles the
    /// PLAY -> COLLECT transition.
    fn dispatch(&mut self) {
        let current_pulse = self.clock.pulse_count();
        for (_, event) in self.queue.drain_due(current_pulse) {
            if let Err(e) = self.output.send_event(event) {
                log::error!("output disconnected, dropping event: {e}");
            }
        }

        if self.phase == Phase::Play {
            if let Some(end) = self.model_end_pulse {
                if current_pulse >= end {
                    self.queue.clear();
                    self.bar_buffer.clear();
                    self.phase = Phase::Collect;
                    self.model_end_pulse = None;
                    self.last_bar_events.clear();
                    info!("[phase] PLAY -> COLLECT");
                }
            }
        }
    }
}
