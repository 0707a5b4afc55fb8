//! Application configuration for eno
//!
//! Configuration is stored as YAML in the user's config directory.
//! Default location: ~/.config/eno/config.yaml

use std::path::PathBuf;

use eno_control::ControlConfig;
use eno_core::audio::AudioConfig;
use eno_core::engine::{DEFAULT_IDLE_RESET_BEATS, DEFAULT_MAX_LOOP_SECONDS};
use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnoConfig {
    /// Output device, buffer size and sample rate
    pub audio: AudioConfig,
    pub synth: SynthConfig,
    pub metronome: MetronomeConfig,
    pub looper: LooperConfig,
    /// OSC and MIDI transports
    pub control: ControlConfig,
}

/// Synth section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    /// Soundfont loaded at startup (relative paths resolve against the working directory)
    pub soundfont: Option<PathBuf>,
    pub gain: f32,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            soundfont: Some(PathBuf::from("font.sf2")),
            gain: 0.4,
        }
    }
}

/// Metronome section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeConfig {
    /// Starting tempo; 0 keeps the click silent until tapped
    pub bpm: u32,
    pub gain: f32,
    /// Beat periods of silence after which a tap starts a new tempo
    pub idle_reset_beats: u32,
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        Self {
            bpm: 0,
            gain: 0.2,
            idle_reset_beats: DEFAULT_IDLE_RESET_BEATS,
        }
    }
}

/// Looper section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LooperConfig {
    pub gain: f32,
    /// Share of the previous layer kept by each overdub pass (0.0-1.0)
    pub decay: f32,
    /// Longest loop that can be recorded; memory is reserved up front
    pub max_loop_seconds: u32,
}

impl Default for LooperConfig {
    fn default() -> Self {
        Self {
            gain: 1.0,
            decay: 0.5,
            max_loop_seconds: DEFAULT_MAX_LOOP_SECONDS,
        }
    }
}
