//! Output stream errors

use std::fmt;

use thiserror::Error;

/// Which step of bringing up the output stream failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStage {
    Build,
    Play,
}

impl fmt::Display for StreamStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamStage::Build => write!(f, "build"),
            StreamStage::Play => write!(f, "start"),
        }
    }
}

/// Errors raised while selecting a device or opening the output stream
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("No audio output devices found")]
    NoDevices,

    #[error("The default audio host has no output device")]
    NoDefaultDevice,

    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    /// The device (or its host) could not report a stereo output configuration
    #[error("No usable output configuration on {device}: {reason}")]
    NoOutputConfig { device: String, reason: String },

    #[error("{device} only offers unsupported {format} samples")]
    UnsupportedFormat { device: String, format: String },

    #[error("Failed to {stage} the output stream on {device}: {reason}")]
    Stream {
        device: String,
        stage: StreamStage,
        reason: String,
    },
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;
