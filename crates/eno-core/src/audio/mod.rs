//! Audio output for eno
//!
//! A single stereo output stream driven by CPAL (ALSA/PulseAudio on Linux,
//! WASAPI on Windows, CoreAudio on macOS).
//!
//! # Architecture
//!
//! - **Control threads**: call the sources' own synchronized operations
//! - **Audio thread**: owns the [`MixBus`](crate::engine::MixBus) and runs one
//!   render pass per device callback
//!
//! # Example Usage
//!
//! ```ignore
//! use eno_core::audio::{AudioConfig, AudioOutput};
//!
//! let output = AudioOutput::open(&AudioConfig::default())?;
//! let sample_rate = output.sample_rate();
//! // ... build the sources at `sample_rate` and a MixBus over them ...
//! let handle = output.start(bus)?;
//! ```

mod config;
mod cpal_backend;
mod device;
mod error;

pub use config::{
    AudioConfig, BufferSize, DeviceId, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE, MAX_BUFFER_SIZE,
    MIN_BUFFER_SIZE,
};
pub use cpal_backend::{AudioHandle, AudioOutput};
pub use device::{default_output_device, find_device_by_id, list_output_devices, AudioDevice};
pub use error::{AudioError, AudioResult, StreamStage};
