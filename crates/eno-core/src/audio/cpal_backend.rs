//! CPAL output stream
//!
//! Opening happens in two steps so the sources can be built at the rate the
//! device actually runs at:
//!
//! ```text
//! AudioOutput::open(&config)  ─►  sample_rate()  ─►  build sources + MixBus
//!                                                          │
//! AudioHandle  ◄──────────────  AudioOutput::start(bus) ◄──┘
//! ```
//!
//! The callback owns the [`MixBus`] outright. It renders into a pre-allocated
//! interleaved i16 scratch buffer and converts to whatever sample format the
//! device negotiated. Stream errors raise a flag that turns the next pass into
//! an underflow pass (silence).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{
    BufferSize as CpalBufferSize, FromSample, Sample, SampleFormat, SizedSample, Stream,
    StreamConfig, SupportedBufferSize, SupportedStreamConfig, SupportedStreamConfigRange,
};

use super::config::{AudioConfig, MAX_BUFFER_SIZE};
use super::device::{default_output_device, find_device_by_id};
use super::error::{AudioError, AudioResult, StreamStage};
use crate::engine::MixBus;
use crate::types::{Sample as Pcm, StreamStatus, CHANNELS};

/// An output device with a negotiated stream configuration, not yet running
pub struct AudioOutput {
    device: cpal::Device,
    device_name: String,
    supported: SupportedStreamConfig,
    buffer_size: Option<u32>,
}

impl AudioOutput {
    /// Select a device and negotiate format, rate and buffer size
    pub fn open(config: &AudioConfig) -> AudioResult<Self> {
        let device = match &config.device {
            Some(id) => find_device_by_id(id)?,
            None => default_output_device()?,
        };
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        log::info!("Using audio device: {}", device_name);

        let (supported, buffer_size) = get_output_config(&device, &device_name, config)?;

        Ok(Self {
            device,
            device_name,
            supported,
            buffer_size,
        })
    }

    /// Negotiated sample rate
    pub fn sample_rate(&self) -> u32 {
        self.supported.sample_rate().0
    }

    /// Negotiated buffer size in frames (None = device default)
    pub fn buffer_size(&self) -> Option<u32> {
        self.buffer_size
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Build and start the stream; audio runs until the handle is dropped
    pub fn start(self, bus: MixBus) -> AudioResult<AudioHandle> {
        let stream_config = StreamConfig {
            channels: self.supported.channels(),
            sample_rate: self.supported.sample_rate(),
            buffer_size: match self.buffer_size {
                Some(frames) => CpalBufferSize::Fixed(frames),
                None => CpalBufferSize::Default,
            },
        };

        let sample_rate = stream_config.sample_rate.0;
        match self.buffer_size {
            Some(frames) => log::info!(
                "Audio config: {} channels, {}Hz, {:?}, {} frames (~{:.1}ms latency)",
                stream_config.channels,
                sample_rate,
                self.supported.sample_format(),
                frames,
                frames as f32 / sample_rate as f32 * 1000.0
            ),
            None => log::info!(
                "Audio config: {} channels, {}Hz, {:?}, device default buffer",
                stream_config.channels,
                sample_rate,
                self.supported.sample_format()
            ),
        }

        let xrun_pending = Arc::new(AtomicBool::new(false));
        let stream_errors = Arc::new(AtomicU64::new(0));
        let state = CallbackState::new(bus, stream_config.channels as usize, xrun_pending.clone());

        let stream = match self.supported.sample_format() {
            SampleFormat::I16 => {
                build_output_stream::<i16>(&self.device, &self.device_name, &stream_config, state, stream_errors.clone(), xrun_pending)
            }
            SampleFormat::F32 => {
                build_output_stream::<f32>(&self.device, &self.device_name, &stream_config, state, stream_errors.clone(), xrun_pending)
            }
            SampleFormat::U16 => {
                build_output_stream::<u16>(&self.device, &self.device_name, &stream_config, state, stream_errors.clone(), xrun_pending)
            }
            SampleFormat::I32 => {
                build_output_stream::<i32>(&self.device, &self.device_name, &stream_config, state, stream_errors.clone(), xrun_pending)
            }
            other => {
                return Err(AudioError::UnsupportedFormat {
                    device: self.device_name,
                    format: format!("{:?}", other),
                })
            }
        }?;

        stream
            .play()
            .map_err(|e| AudioError::Stream {
                device: self.device_name.clone(),
                stage: StreamStage::Play,
                reason: e.to_string(),
            })?;
        log::info!("Audio stream started");

        Ok(AudioHandle {
            _stream: stream,
            sample_rate,
            stream_errors,
        })
    }
}

/// Keeps the output stream alive. Drop this to stop audio.
pub struct AudioHandle {
    _stream: Stream,
    sample_rate: u32,
    stream_errors: Arc<AtomicU64>,
}

impl AudioHandle {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of errors the driver reported since the stream started
    pub fn stream_errors(&self) -> u64 {
        self.stream_errors.load(Ordering::Relaxed)
    }
}

/// State moved into the audio callback
struct CallbackState {
    bus: MixBus,
    /// Interleaved stereo render target, `MAX_BUFFER_SIZE` frames
    scratch: Vec<Pcm>,
    device_channels: usize,
    xrun_pending: Arc<AtomicBool>,
}

impl CallbackState {
    fn new(bus: MixBus, device_channels: usize, xrun_pending: Arc<AtomicBool>) -> Self {
        Self {
            bus,
            scratch: vec![0; MAX_BUFFER_SIZE as usize * CHANNELS],
            device_channels: device_channels.max(1),
            xrun_pending,
        }
    }

    /// Fill one device buffer
    fn process<T>(&mut self, data: &mut [T])
    where
        T: Sample + FromSample<Pcm>,
    {
        let channels = self.device_channels;
        let max_frames = self.scratch.len() / CHANNELS;

        for block in data.chunks_mut(max_frames * channels) {
            let frames = block.len() / channels;
            let status = if self.xrun_pending.swap(false, Ordering::Relaxed) {
                StreamStatus::Underflow
            } else {
                StreamStatus::Ok
            };

            let pcm = &mut self.scratch[..frames * CHANNELS];
            self.bus.render_frame(pcm, status);
            write_frames(block, pcm, channels);
        }
    }
}

/// Copy interleaved stereo PCM into a device buffer of `channels` channels
///
/// Mono devices get the average of both sides; channels past the second are
/// silenced.
fn write_frames<T>(out: &mut [T], pcm: &[Pcm], channels: usize)
where
    T: Sample + FromSample<Pcm>,
{
    for (frame, stereo) in out.chunks_mut(channels).zip(pcm.chunks_exact(CHANNELS)) {
        if channels == 1 {
            let mono = ((stereo[0] as i32 + stereo[1] as i32) / 2) as Pcm;
            frame[0] = T::from_sample(mono);
            continue;
        }
        frame[0] = T::from_sample(stereo[0]);
        frame[1] = T::from_sample(stereo[1]);
        for ch in frame.iter_mut().skip(CHANNELS) {
            *ch = T::EQUILIBRIUM;
        }
    }
}

/// Rank a sample format: lower is better
fn format_rank(format: SampleFormat) -> u8 {
    match format {
        SampleFormat::I16 => 0,
        SampleFormat::F32 => 1,
        SampleFormat::I32 | SampleFormat::U16 => 2,
        _ => 3,
    }
}

fn supports_rate(range: &SupportedStreamConfigRange, rate: u32) -> bool {
    (range.min_sample_rate().0..=range.max_sample_rate().0).contains(&rate)
}

/// Get the best output configuration for a device
///
/// Returns (SupportedStreamConfig, buffer size in frames or None for default)
fn get_output_config(
    device: &cpal::Device,
    device_name: &str,
    config: &AudioConfig,
) -> AudioResult<(SupportedStreamConfig, Option<u32>)> {
    let no_config = |reason: String| AudioError::NoOutputConfig {
        device: device_name.to_string(),
        reason,
    };
    let supported_configs: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| no_config(e.to_string()))?
        .collect();

    let target_rate = config.sample_rate;

    // Stereo at the target rate in the best format, then any stereo, then anything
    let best = supported_configs
        .iter()
        .filter(|c| c.channels() >= 2 && supports_rate(c, target_rate))
        .min_by_key(|c| format_rank(c.sample_format()))
        .or_else(|| {
            supported_configs
                .iter()
                .filter(|c| c.channels() >= 2)
                .min_by_key(|c| format_rank(c.sample_format()))
        })
        .or_else(|| supported_configs.first())
        .ok_or_else(|| no_config("device lists no output configurations".to_string()))?;

    let sample_rate = if supports_rate(best, target_rate) {
        cpal::SampleRate(target_rate)
    } else {
        let fallback = best.max_sample_rate();
        log::warn!(
            "Audio device doesn't support {}Hz, falling back to {}Hz",
            target_rate,
            fallback.0
        );
        fallback
    };

    let buffer_size = config.buffer_size.as_frames().map(|frames| match best.buffer_size() {
        SupportedBufferSize::Range { min, max } => frames.clamp(*min, (*max).max(*min)),
        SupportedBufferSize::Unknown => frames,
    });

    log::debug!(
        "Selected buffer size: {:?} frames for {:?}",
        buffer_size,
        config.buffer_size
    );

    Ok((best.clone().with_sample_rate(sample_rate), buffer_size))
}

/// Build the output stream for sample type `T`
fn build_output_stream<T>(
    device: &cpal::Device,
    device_name: &str,
    config: &StreamConfig,
    mut state: CallbackState,
    stream_errors: Arc<AtomicU64>,
    xrun_pending: Arc<AtomicBool>,
) -> AudioResult<Stream>
where
    T: SizedSample + FromSample<Pcm>,
{
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _info: &cpal::OutputCallbackInfo| state.process(data),
            move |err| {
                stream_errors.fetch_add(1, Ordering::Relaxed);
                xrun_pending.store(true, Ordering::Relaxed);
                log::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::Stream {
            device: device_name.to_string(),
            stage: StreamStage::Build,
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_frames_stereo_i16() {
        let pcm = [100, -100, 200, -200];
        let mut out = [0i16; 4];
        write_frames(&mut out, &pcm, 2);
        assert_eq!(out, pcm);
    }

    #[test]
    fn test_write_frames_extra_channels_silenced() {
        let pcm = [i16::MAX, i16::MIN];
        let mut out = [0.5f32; 4];
        write_frames(&mut out, &pcm, 4);
        assert!((out[0] - 1.0).abs() < 1e-3, "left = {}", out[0]);
        assert!((out[1] + 1.0).abs() < 1e-3, "right = {}", out[1]);
        assert_eq!(&out[2..], &[0.0, 0.0]);
    }

    #[test]
    fn test_write_frames_mono_averages() {
        let pcm = [1000, 3000, -400, 0];
        let mut out = [0i16; 2];
        write_frames(&mut out, &pcm, 1);
        assert_eq!(out, [2000, -200]);
    }

    #[test]
    fn test_format_preference() {
        assert!(format_rank(SampleFormat::I16) < format_rank(SampleFormat::F32));
        assert!(format_rank(SampleFormat::F32) < format_rank(SampleFormat::U16));
        assert!(format_rank(SampleFormat::U16) < format_rank(SampleFormat::F64));
    }
}
