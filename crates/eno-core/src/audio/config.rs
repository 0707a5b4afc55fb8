//! Audio output configuration
//!
//! Device selection, buffer size and sample rate for the output stream.

use serde::{Deserialize, Serialize};

/// Largest buffer the driver will request (frames)
pub const MAX_BUFFER_SIZE: u32 = 8192;

/// Smallest buffer the driver will request (frames)
pub const MIN_BUFFER_SIZE: u32 = 16;

/// Default buffer size (frames)
/// 128 frames @ 44.1kHz = ~2.9ms
pub const DEFAULT_BUFFER_SIZE: u32 = 128;

/// Default sample rate for the audio system (44.1kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = crate::types::SAMPLE_RATE;

/// Preferred buffer size for the output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BufferSize {
    /// Let the system choose the buffer size
    Default,
    /// Request a specific buffer size in frames (clamped to a sane range)
    Fixed(u32),
}

impl BufferSize {
    /// Get the buffer size in frames, or None for system default
    pub fn as_frames(&self) -> Option<u32> {
        match self {
            BufferSize::Default => None,
            BufferSize::Fixed(frames) => Some((*frames).clamp(MIN_BUFFER_SIZE, MAX_BUFFER_SIZE)),
        }
    }
}

/// Audio device identifier
///
/// Includes both the device name and the host backend (ALSA, CoreAudio, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    /// Device name as reported by the system
    pub name: String,
    /// Audio host identifier; None = default host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl DeviceId {
    /// Device on the default host
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
        }
    }

    pub fn with_host(name: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            host: Some(host.to_string()),
        }
    }

    /// Get a display label that includes the host if available
    pub fn display_label(&self) -> String {
        match &self.host {
            Some(host) => format!("[{}] {}", host, self.name),
            None => self.name.clone(),
        }
    }
}

/// Configuration for the audio output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device (None = system default)
    pub device: Option<DeviceId>,

    /// Preferred buffer size
    pub buffer_size: BufferSize,

    /// Preferred sample rate; the device may force another one
    pub sample_rate: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            buffer_size: BufferSize::Fixed(DEFAULT_BUFFER_SIZE),
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

impl AudioConfig {
    /// Set the output device
    pub fn with_device(mut self, device: DeviceId) -> Self {
        self.device = Some(device);
        self
    }

    /// Set a fixed buffer size in frames
    pub fn with_buffer_frames(mut self, frames: u32) -> Self {
        self.buffer_size = BufferSize::Fixed(frames);
        self
    }

    /// Set the preferred sample rate
    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }
}
