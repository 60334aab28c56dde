use thiserror::Error;

/// Error type for the abstract MIDI ports (clock source, input source,
/// output sink). Corresponds to the "Clock disconnect" / "Input disconnect" /
/// "Output disconnect" rows of spec.md §7.
#[derive(Error, Debug)]
pub enum MidiIoError {
    /// No MIDI ports are available to connect to.
    #[error("no MIDI ports available [{}: {}]", file!(), line!())]
    NoPortsAvailable,
    /// The requested port index does not exist.
    #[error("MIDI port {0} does not exist")]
    PortNotFound(usize),
    /// The underlying transport failed to connect.
    #[cfg(feature = "std")]
    #[error("failed to connect to MIDI port: {0}")]
    Connect(#[from] midir::ConnectError<midir::MidiInput>),
    /// The underlying transport failed to connect (output side).
    #[cfg(feature = "std")]
    #[error("failed to connect to MIDI output port: {0}")]
    ConnectOutput(#[from] midir::ConnectError<midir::MidiOutput>),
    /// The underlying transport could not be initialized.
    #[cfg(feature = "std")]
    #[error("failed to initialize MIDI transport: {0}")]
    Init(#[from] midir::InitError),
    /// Sending a message to an output port failed.
    #[cfg(feature = "std")]
    #[error("failed to send MIDI message: {0}")]
    Send(#[from] midir::SendError),
    /// The source disconnected mid-session.
    #[error("MIDI source disconnected")]
    Disconnected,
}

/// Error type describing why a generation job failed. Recorded in the job's
/// result field (spec.md §3, "Generation Job... Mutated exactly once on
/// completion... an error field holds... an error reason").
#[derive(Error, Debug)]
pub enum ModelError {
    /// The model engine reported a failure; `reason` is whatever diagnostic
    /// text it chose to surface.
    #[error("model generation failed: {reason}")]
    Generation {
        /// Human-readable reason reported by the model engine.
        reason: String,
    },
    /// The worker's job queue could not accept a new job (should not happen
    /// in steady state; queue depth is expected <= 1 per spec.md §4.4).
    #[error("generation worker is unavailable")]
    WorkerUnavailable,
}

/// Error type for parsing a generated MIDI blob into events, mirroring the
/// teacher crate's `TrackError` shape for MIDI-file issues.
#[derive(Error, Debug)]
pub enum MidiParseError {
    /// The blob is not a well-formed standard MIDI file.
    #[error("malformed MIDI blob: {0}")]
    Midly(#[from] midly::Error),
    /// The blob does not declare a metrical (ticks-per-quarter-note) timing,
    /// which this bridge requires to convert ticks to pulses (spec.md
    /// §4.5.4).
    #[error("generated MIDI blob has no metrical timing")]
    BadTiming,
    /// The blob contains no tracks.
    #[error("generated MIDI blob contains no tracks")]
    NoTracks,
}

/// Top-level error type returned by [`crate::run`], aggregating the fatal
/// error kinds of spec.md §7 (clock/input disconnects). Model failures and
/// malformed MIDI are *not* represented here. Per spec.md §7 they are
/// handled locally (the bar goes silent) and never escape the control loop.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Error from one of the MIDI ports.
    #[error("MIDI I/O error [{}: {}]", file!(), line!())]
    Midi(#[from] MidiIoError),
    /// Error loading or validating the bridge configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Error type for loading and validating [`crate::config::BridgeConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[cfg(feature = "std")]
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// The config file is not valid TOML.
    #[cfg(feature = "std")]
    #[error("failed to parse config as TOML: {0}")]
    Toml(#[from] toml::de::Error),
    /// A field failed validation.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
