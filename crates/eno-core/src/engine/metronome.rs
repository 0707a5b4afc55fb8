//! Tap-tempo metronome
//!
//! Derives a tempo from the spacing of user taps and mixes a click into the
//! output on every beat.
//!
//! # Tap history
//!
//! The last [`MAX_TAPS`] tap intervals (in frames) are kept in a FIFO. The
//! first tap of a session records a `0` entry that marks the session start;
//! every later tap records the frames elapsed since the previous one. Once two
//! entries exist the tempo is `60 * sample_rate / mean`, where the mean runs
//! over the real intervals only (the session marker is skipped while it is
//! still in the FIFO).
//!
//! A tap that arrives after a long idle gap starts a new session: 2 seconds
//! when no tempo is set, or `idle_reset_beats` beat periods once one is.
//!
//! # Click
//!
//! The click is a short percussive burst stored at [`CLICK_SAMPLE_RATE`] and
//! resampled by index scaling. Every tap re-phases the beat so the click lands
//! on the tap.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::soft_clip::mix;
use super::StereoSource;
use crate::types::{frame_count, Sample, CHANNELS};

/// Maximum number of intervals kept in the tap history
pub const MAX_TAPS: usize = 8;

/// Idle gap (seconds) that starts a new tap session while no tempo is set
pub const MAX_IDLE_SECONDS: u64 = 2;

/// Default idle window, in beat periods, once a tempo is set
pub const DEFAULT_IDLE_RESET_BEATS: u32 = 2;

/// Rate the click waveform is stored at
pub const CLICK_SAMPLE_RATE: u32 = 44100;

/// Click length in milliseconds
const CLICK_MS: u32 = 30;

/// Mutable metronome state, guarded by the component lock
struct MetronomeState {
    sample_rate: u32,
    /// Tap intervals in frames, newest last
    taps: VecDeque<u64>,
    /// Front entry of `taps` is the session-start marker, not an interval
    session_marker: bool,
    frames_since_last_tap: u64,
    /// Position within the current beat, `[0, beat_duration)`
    beat_frame: u64,
    bpm: u32,
    gain: f32,
    idle_reset_beats: u32,
}

impl MetronomeState {
    /// Frames per beat at the current tempo (never zero)
    fn beat_duration(&self) -> u64 {
        if self.bpm == 0 {
            return 1;
        }
        (self.sample_rate as u64 * 60 / self.bpm as u64).max(1)
    }

    /// Idle gap after which a tap starts a fresh session
    fn idle_threshold(&self) -> u64 {
        if self.bpm > 0 {
            self.beat_duration() * self.idle_reset_beats as u64
        } else {
            self.sample_rate as u64 * MAX_IDLE_SECONDS
        }
    }

    fn clear_taps(&mut self) {
        self.taps.clear();
        self.session_marker = false;
    }

    /// Integer mean of the real tap intervals, if there is at least one
    fn mean_interval(&self) -> Option<u64> {
        let skip = usize::from(self.session_marker);
        let count = self.taps.len().saturating_sub(skip) as u64;
        if count == 0 {
            return None;
        }
        let sum: u64 = self.taps.iter().skip(skip).sum();
        Some(sum / count)
    }
}

/// Tap-tempo estimator and click generator
///
/// All state sits behind one mutex; `tap`/`set_*` may be called from any
/// control thread while the audio thread renders.
pub struct Metronome {
    state: Mutex<MetronomeState>,
    /// Click waveform at [`CLICK_SAMPLE_RATE`], immutable after construction
    click: Box<[Sample]>,
}

impl Metronome {
    /// Create a silent metronome (bpm 0, unity gain)
    pub fn new(sample_rate: u32) -> Self {
        Self {
            state: Mutex::new(MetronomeState {
                sample_rate: sample_rate.max(1),
                taps: VecDeque::with_capacity(MAX_TAPS + 1),
                session_marker: false,
                frames_since_last_tap: 0,
                beat_frame: 0,
                bpm: 0,
                gain: 1.0,
                idle_reset_beats: DEFAULT_IDLE_RESET_BEATS,
            }),
            click: acoustic_click().into_boxed_slice(),
        }
    }

    /// Set how many beat periods of silence start a new tap session
    pub fn with_idle_reset_beats(self, beats: u32) -> Self {
        self.lock().idle_reset_beats = beats.max(1);
        self
    }

    fn lock(&self) -> MutexGuard<'_, MetronomeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a tap
    pub fn tap(&self) {
        let mut s = self.lock();

        if !s.taps.is_empty() && s.frames_since_last_tap > s.idle_threshold() {
            log::debug!(
                "Metronome: {} idle frames since last tap, starting new tempo",
                s.frames_since_last_tap
            );
            s.clear_taps();
        }

        let interval = if s.taps.is_empty() {
            s.session_marker = true;
            0
        } else {
            s.frames_since_last_tap
        };
        s.taps.push_back(interval);
        while s.taps.len() > MAX_TAPS {
            s.taps.pop_front();
            // The marker is always the oldest entry
            s.session_marker = false;
        }

        s.frames_since_last_tap = 0;
        s.beat_frame = 0;

        if s.taps.len() >= 2 {
            match s.mean_interval() {
                Some(mean) if mean > 0 => {
                    s.bpm = (60 * s.sample_rate as u64 / mean).min(u32::MAX as u64) as u32;
                    log::debug!("Metronome: tapped tempo {} bpm ({} taps)", s.bpm, s.taps.len());
                }
                _ => {
                    // Two taps inside one audio buffer; keep the current tempo
                    log::debug!("Metronome: zero-length tap interval ignored");
                }
            }
        }
    }

    /// Set the tempo directly, discarding tap history (0 silences the click)
    pub fn set_bpm(&self, bpm: u32) {
        let mut s = self.lock();
        s.clear_taps();
        s.bpm = bpm;
        log::debug!("Metronome: bpm set to {}", bpm);
    }

    /// Set the linear click gain; non-finite values are ignored
    pub fn set_gain(&self, gain: f32) {
        if gain.is_finite() {
            self.lock().gain = gain.max(0.0);
        }
    }

    /// Current tempo (0 = click disabled)
    pub fn bpm(&self) -> u32 {
        self.lock().bpm
    }

    /// Current click gain
    pub fn gain(&self) -> f32 {
        self.lock().gain
    }

    /// Number of entries in the tap history
    pub fn tap_count(&self) -> usize {
        self.lock().taps.len()
    }

    /// Mix the click into an interleaved stereo buffer
    ///
    /// Leaves the buffer untouched while the tempo is 0.
    pub fn mix_stereo(&self, out: &mut [Sample]) {
        let frames = frame_count(out) as u64;
        let mut s = self.lock();
        s.frames_since_last_tap = s.frames_since_last_tap.saturating_add(frames);

        if s.bpm == 0 {
            return;
        }

        let beat_duration = s.beat_duration();
        let sample_rate = s.sample_rate as u64;
        let gain = s.gain;
        // A tempo change may have left us past the end of the new beat
        let mut beat_frame = s.beat_frame % beat_duration;

        for frame in out.chunks_exact_mut(CHANNELS) {
            let index = (beat_frame * CLICK_SAMPLE_RATE as u64 / sample_rate) as usize;
            if let Some(&click) = self.click.get(index) {
                let v = (click as f32 * gain) as Sample;
                frame[0] = mix(frame[0], v);
                frame[1] = mix(frame[1], v);
            }
            beat_frame = (beat_frame + 1) % beat_duration;
        }

        s.beat_frame = beat_frame;
    }
}

impl StereoSource for Metronome {
    fn render_stereo(&self, out: &mut [Sample]) {
        self.mix_stereo(out);
    }
}

/// Synthesize the click: two damped partials over a short noise-like transient
fn acoustic_click() -> Vec<Sample> {
    let len = (CLICK_SAMPLE_RATE * CLICK_MS / 1000) as usize;
    let rate = CLICK_SAMPLE_RATE as f32;
    (0..len)
        .map(|i| {
            let t = i as f32 / rate;
            let body = 0.55 * (std::f32::consts::TAU * 1760.0 * t).sin() * (-t * 160.0).exp();
            let ring = 0.30 * (std::f32::consts::TAU * 3520.0 * t).sin() * (-t * 260.0).exp();
            // Deterministic "stick" transient for the first millisecond
            let stick = if i < 44 {
                0.15 * (std::f32::consts::TAU * 7040.0 * t).sin() * (1.0 - i as f32 / 44.0)
            } else {
                0.0
            };
            crate::types::pcm_from_f32(body + ring + stick)
        })
        .collect()
}
