//! Control plane for eno
//!
//! This crate provides:
//! - [`ControlEvent`]: every control operation on the synth, looper and metronome
//! - OSC server with a static address → handler routing table (rosc over tokio UDP)
//! - MIDI input via midir, parsed with midly, with configurable tap/cancel mappings
//! - A single dispatcher task that applies events in arrival order
//!
//! # Architecture
//!
//! ```text
//! OSC socket  ─┐
//!              ├─► flume channel ─► dispatcher ─► Synth / Looper / Metronome
//! midir thread ┘
//! ```
//!
//! Transports never touch the sources directly; the midir callback is
//! synchronous and only does a non-blocking `try_send`.

mod config;
mod dispatch;
mod events;
mod midi;
mod osc;

pub use config::{ControlConfig, MidiAction, MidiConfig, MidiControl, MidiMapping, OscConfig};
pub use dispatch::{event_channel, run_dispatcher, EVENT_CHANNEL_CAPACITY};
pub use events::{ControlEvent, ControlTargets};
pub use midi::{MidiInputEvent, MidiInputHandler, MidiRouter};
pub use osc::{route_message, OscServer, ROUTES};

use thiserror::Error;

/// Errors raised by the control transports
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("No free OSC port on {host} in {first}..={last}")]
    OscBind { host: String, first: u16, last: u16 },

    #[error("OSC socket error: {0}")]
    OscIo(#[from] std::io::Error),

    #[error("Failed to initialize MIDI input: {0}")]
    MidiInit(String),

    #[error("No MIDI input ports available")]
    NoMidiPorts,

    #[error("No MIDI port found matching pattern: {0}")]
    MidiPortNotFound(String),

    #[error("Failed to connect to MIDI port: {0}")]
    MidiConnect(String),
}

/// Result type for control transport operations
pub type ControlResult<T> = Result<T, ControlError>;

/// Why a control message's arguments were rejected
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArgError {
    #[error("expected {expected} argument(s), got {got}")]
    Count { expected: usize, got: usize },

    #[error("argument {index}: expected {expected}, got {got}")]
    Type {
        index: usize,
        expected: &'static str,
        got: String,
    },

    #[error("argument {index}: not a finite number")]
    NotFinite { index: usize },

    #[error("argument {index}: {value} outside {min}..={max}")]
    Range {
        index: usize,
        value: i64,
        min: i64,
        max: i64,
    },
}
