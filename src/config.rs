//! Bridge configuration: the enumerated knobs of spec.md §6, with the same
//! defaults, loadable from a TOML file the way [`mseq_tracks`]'s index loader
//! reads its track manifest.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Pulses per quarter note on a standard MIDI clock. Not configurable; it is
/// part of the MIDI standard, not a sequencer parameter (spec.md §3).
pub const PULSES_PER_QUARTER: u32 = 24;

/// Typed configuration for the bridge, matching spec.md §6's enumerated
/// fields and defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Beats per measure (typical: 3, 4, 6). Default 4.
    pub beats_per_bar: u32,
    /// Number of measures the model generates per response ("N"/`gen_bars`).
    /// Default 2.
    pub measures: u32,
    /// Sampling temperature, in `[0, 2]`. Default 0.8.
    pub temperature: f32,
    /// Sampling top-p, in `(0, 1]`. Default 0.9.
    pub top_p: f32,
    /// Ticks-per-beat used when a generated blob does not self-declare a
    /// metrical resolution. Default 480.
    pub ticks_per_beat: u32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            beats_per_bar: 4,
            measures: 2,
            temperature: 0.8,
            top_p: 0.9,
            ticks_per_beat: 480,
        }
    }
}

impl BridgeConfig {
    /// Pulses in one bar: `beats_per_bar * 24`.
    pub fn pulses_per_bar(&self) -> u32 {
        self.beats_per_bar * PULSES_PER_QUARTER
    }

    /// Pulses spanned by one generated response window: `measures *
    /// pulses_per_bar`.
    pub fn window_pulses(&self) -> u32 {
        self.measures * self.pulses_per_bar()
    }

    /// Horizon, in seconds, to request from the model engine for one
    /// response: `gen_bars * 1.0` (spec.md §4.4).
    pub fn horizon_seconds(&self) -> f32 {
        self.measures as f32
    }

    /// Validates the configuration against the bounds in spec.md §6.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.beats_per_bar == 0 {
            return Err(ConfigError::Invalid("beats_per_bar must be >= 1".into()));
        }
        if self.measures == 0 {
            return Err(ConfigError::Invalid("measures must be >= 1".into()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Invalid("temperature must be in [0, 2]".into()));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(ConfigError::Invalid("top_p must be in (0, 1]".into()));
        }
        if self.ticks_per_beat == 0 {
            return Err(ConfigError::Invalid("ticks_per_beat must be >= 1".into()));
        }
        Ok(())
    }

    /// Loads a [`BridgeConfig`] from a TOML file, falling back to defaults
    /// for any field the file omits (`#[serde(default)]`), then validates it.
    #[cfg(feature = "std")]
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs_err::read_to_string(path)?;
        let config: Self = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }
}
