//! Generation Worker (C4): a single background thread consuming generation
//! requests, invoking the external model engine, and publishing results
//! (spec.md §4.4).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use log::{debug, info};

use crate::error::ModelError;
use crate::event::Pulse;

/// The black-box generative model, consumed as a single opaque operation
/// (spec.md §1, §6). Implementations run synchronously on the worker
/// thread; this is the crate's only real suspension point outside the
/// blocking MIDI reads (spec.md §5).
pub trait ModelEngine {
    /// Given a prompt MIDI blob, sampling parameters and a horizon in
    /// seconds, produce a MIDI blob of at most `horizon_s` seconds of
    /// musical output, or fail.
    fn generate(
        &self,
        prompt_midi_blob: &[u8],
        horizon_s: f32,
        temperature: f32,
        top_p: f32,
    ) -> Result<Vec<u8>, ModelError>;
}

/// Immutable generation request. Built by the controller, submitted to the
/// worker, then read-only from the controller's side until the worker
/// completes it (spec.md §3, "Generation Job").
pub struct GenerationJob {
    /// Monotonically increasing id, used only for log correlation.
    pub job_id: u64,
    /// Index (relative to the anchor) of the bar this job was submitted for.
    pub bar_index: u64,
    /// Prompt assembled from up to two bars of captured human events,
    /// already encoded as a standard MIDI file.
    pub prompt_midi_blob: Vec<u8>,
    /// Sampling temperature.
    pub temperature: f32,
    /// Sampling top-p.
    pub top_p: f32,
    /// Requested measure count ("N"/`gen_bars`).
    pub gen_bars: u32,
    /// Pulse count observed when the boundary handler submitted this job.
    /// Diagnostic only. Scheduling uses the pulse observed at *result*
    /// time (spec.md §4.5.3), not this value.
    pub submitted_pulse: Pulse,

    done: AtomicBool,
    result: Mutex<Option<Result<Vec<u8>, ModelError>>>,
}

impl GenerationJob {
    /// Constructs a new, not-yet-submitted job.
    pub fn new(
        job_id: u64,
        bar_index: u64,
        prompt_midi_blob: Vec<u8>,
        temperature: f32,
        top_p: f32,
        gen_bars: u32,
        submitted_pulse: Pulse,
    ) -> Self {
        Self {
            job_id,
            bar_index,
            prompt_midi_blob,
            temperature,
            top_p,
            gen_bars,
            submitted_pulse,
            done: AtomicBool::new(false),
            result: Mutex::new(None),
        }
    }

    /// True once the worker has written a result. A plain atomic flag lets
    /// the control loop poll without locking on the hot path (spec.md §9,
    /// "Pending job handoff").
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Takes the result, if ready. Returns `None` if the job is still in
    /// flight. Calling this more than once after completion returns `None`
    /// on every call after the first, since the result is moved out.
    pub fn take_result(&self) -> Option<Result<Vec<u8>, ModelError>> {
        if !self.is_done() {
            return None;
        }
        self.result.lock().unwrap().take()
    }

    fn complete(&self, result: Result<Vec<u8>, ModelError>) {
        *self.result.lock().unwrap() = Some(result);
        self.done.store(true, Ordering::Release);
    }
}

/// Message sent to the generation worker thread.
enum WorkerMessage {
    Job(Arc<GenerationJob>),
    Shutdown,
}

/// Handle used to submit jobs to a running [`GenerationWorker`] and to
/// request its shutdown.
#[derive(Clone)]
pub struct WorkerHandle {
    sender: mpsc::Sender<WorkerMessage>,
}

impl WorkerHandle {
    /// Enqueues a job. Never blocks (spec.md §4.5.2, "Do not block"); at
    /// most one job runs at a time, so if a job is already in flight this
    /// one simply queues behind it (spec.md §4.4).
    pub fn submit(&self, job: Arc<GenerationJob>) {
        // The channel is unbounded: queue depth is expected <= 1 in steady
        // state (spec.md §4.4) and the controller never submits while a
        // previous job is still pending (spec.md §8 invariant 6), so this
        // cannot build up unboundedly in practice.
        let _ = self.sender.send(WorkerMessage::Job(job));
    }

    /// Requests the worker to finish its in-flight job, if any, and exit.
    pub fn shutdown(&self) {
        let _ = self.sender.send(WorkerMessage::Shutdown);
    }
}

/// Spawns the generation worker thread. Returns a handle to submit jobs and
/// the thread's `JoinHandle`.
pub fn spawn_worker(
    engine: impl ModelEngine + Send + 'static,
) -> (WorkerHandle, JoinHandle<()>) {
    let (sender, receiver) = mpsc::channel::<WorkerMessage>();
    let join = std::thread::spawn(move || worker_loop(engine, receiver));
    (WorkerHandle { sender }, join)
}

fn worker_loop(engine: impl ModelEngine, receiver: mpsc::Receiver<WorkerMessage>) {
    while let Ok(message) = receiver.recv() {
        match message {
            WorkerMessage::Job(job) => {
                info!("[gen_worker] Starting bar={} job={}", job.bar_index, job.job_id);
                let result = engine.generate(
                    &job.prompt_midi_blob,
                    job.gen_bars as f32,
                    job.temperature,
                    job.top_p,
                );
                debug!("[gen_worker] done job={} ok={}", job.job_id, result.is_ok());
                job.complete(result);
            }
            WorkerMessage::Shutdown => break,
        }
    }
}
