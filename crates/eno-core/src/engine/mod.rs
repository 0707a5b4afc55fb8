//! Audio engine - sources, soft-clip mixing and the per-callback mix bus
//!
//! - Synth: soundfont voice renderer
//! - Looper: record/overdub/playback state machine
//! - Metronome: tap-tempo estimator and click
//! - MixBus: renders the sources in order and merges them with `soft_clip::mix`

mod looper;
mod metronome;
mod mix_bus;
pub mod soft_clip;
mod synth;

pub use looper::*;
pub use metronome::*;
pub use mix_bus::*;
pub use synth::*;
