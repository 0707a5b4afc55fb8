//! Common types for eno
//!
//! Everything the mix path touches is interleaved stereo 16-bit PCM:
//! `[l0, r0, l1, r1, ...]`. A *frame* is one left/right pair.

/// Default engine sample rate (44.1kHz)
///
/// The actual rate is negotiated with the audio device at startup and handed
/// to each source when it is constructed.
pub const SAMPLE_RATE: u32 = 44100;

/// Number of interleaved channels in every mix buffer
pub const CHANNELS: usize = 2;

/// One PCM sample (signed 16-bit)
pub type Sample = i16;

/// Number of stereo frames held by an interleaved buffer
///
/// A trailing odd sample (half a frame) is ignored.
#[inline]
pub fn frame_count(buffer: &[Sample]) -> usize {
    buffer.len() / CHANNELS
}

/// Convert a normalized float sample (-1.0..=1.0) to PCM
///
/// Out-of-range input saturates; `as` truncates toward zero.
#[inline]
pub fn pcm_from_f32(value: f32) -> Sample {
    (value * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as Sample
}

/// Condition reported by the audio driver alongside a render request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamStatus {
    /// Normal callback
    #[default]
    Ok,
    /// The device ran dry since the previous callback
    Underflow,
    /// The device dropped data since the previous callback
    Overflow,
}

impl StreamStatus {
    /// True when the driver reported an xrun of either kind
    pub fn is_xrun(&self) -> bool {
        !matches!(self, StreamStatus::Ok)
    }
}
