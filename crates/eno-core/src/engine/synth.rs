//! Soundfont synthesizer source
//!
//! Thin adapter over [`rustysynth`]: control events are forwarded to the
//! synthesizer and its float output is converted to 16-bit PCM straight into
//! the mix buffer. The synth is the first source in the bus, so it overwrites
//! the buffer instead of mixing into it.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rustysynth::{SoundFont, Synthesizer, SynthesizerSettings};
use thiserror::Error;

use super::StereoSource;
use crate::types::{frame_count, pcm_from_f32, Sample, CHANNELS};

/// Frames rendered per synthesizer call; sizes the scratch buffers
const RENDER_CHUNK: usize = 512;

/// MIDI status nibbles used for raw channel messages
const STATUS_CONTROL_CHANGE: i32 = 0xB0;
const STATUS_PROGRAM_CHANGE: i32 = 0xC0;
const STATUS_PITCH_BEND: i32 = 0xE0;

/// "All notes off" channel-mode controller
pub const CC_ALL_NOTES_OFF: u8 = 123;

/// Soundfont loading errors
#[derive(Debug, Error)]
pub enum SynthError {
    #[error("Failed to open soundfont: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid soundfont: {0}")]
    SoundFont(#[from] rustysynth::SoundFontError),

    #[error("Failed to create synthesizer: {0}")]
    Synthesizer(#[from] rustysynth::SynthesizerError),
}

/// Result type for synth operations
pub type SynthResult<T> = Result<T, SynthError>;

struct SynthState {
    synthesizer: Option<Synthesizer>,
    gain: f32,
    left: Vec<f32>,
    right: Vec<f32>,
}

/// Polyphonic soundfont voice renderer
pub struct Synth {
    sample_rate: u32,
    state: Mutex<SynthState>,
}

impl Synth {
    /// Create a synth with no soundfont loaded (renders nothing)
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            state: Mutex::new(SynthState {
                synthesizer: None,
                gain: 1.0,
                left: vec![0.0; RENDER_CHUNK],
                right: vec![0.0; RENDER_CHUNK],
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SynthState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load a soundfont, replacing the current one
    ///
    /// The file is parsed without holding the render lock. On failure the
    /// previous soundfont is unloaded and the synth goes silent.
    pub fn load(&self, path: impl AsRef<Path>) -> SynthResult<()> {
        let path = path.as_ref();
        match self.build(path) {
            Ok(synthesizer) => {
                self.lock().synthesizer = Some(synthesizer);
                log::info!("Loaded soundfont {:?}", path);
                Ok(())
            }
            Err(e) => {
                self.lock().synthesizer = None;
                Err(e)
            }
        }
    }

    fn build(&self, path: &Path) -> SynthResult<Synthesizer> {
        let mut reader = BufReader::new(File::open(path)?);
        let sound_font = Arc::new(SoundFont::new(&mut reader)?);
        let settings = SynthesizerSettings::new(self.sample_rate as i32);
        Ok(Synthesizer::new(&sound_font, &settings)?)
    }

    /// True when a soundfont is loaded
    pub fn is_loaded(&self) -> bool {
        self.lock().synthesizer.is_some()
    }

    /// Run `f` against the loaded synthesizer, if any, for a valid channel
    fn with_channel(&self, channel: u8, f: impl FnOnce(&mut Synthesizer, i32)) {
        let Some(ch) = midi_channel(channel) else {
            log::debug!("Synth: ignoring event on channel {}", channel);
            return;
        };
        if let Some(synth) = self.lock().synthesizer.as_mut() {
            f(synth, ch);
        }
    }

    pub fn note_on(&self, channel: u8, note: u8, velocity: u8) {
        self.with_channel(channel, |s, ch| s.note_on(ch, note as i32, velocity as i32));
    }

    pub fn note_off(&self, channel: u8, note: u8) {
        self.with_channel(channel, |s, ch| s.note_off(ch, note as i32));
    }

    /// Pitch bend, 14-bit value with 8192 as centre
    pub fn pitch_bend(&self, channel: u8, value: u16) {
        let value = value.min(0x3fff) as i32;
        self.with_channel(channel, |s, ch| {
            s.process_midi_message(ch, STATUS_PITCH_BEND, value & 0x7f, value >> 7)
        });
    }

    /// Controller change; "all notes off" releases the voices of `channel` only
    pub fn control_change(&self, channel: u8, controller: u8, value: u8) {
        self.with_channel(channel, |s, ch| {
            if controller == CC_ALL_NOTES_OFF {
                s.note_off_all_channel(ch, false);
            } else {
                s.process_midi_message(ch, STATUS_CONTROL_CHANGE, controller as i32, value as i32);
            }
        });
    }

    pub fn program_change(&self, channel: u8, program: u8) {
        self.with_channel(channel, |s, ch| {
            s.process_midi_message(ch, STATUS_PROGRAM_CHANGE, (program & 0x7f) as i32, 0)
        });
    }

    /// Release every sounding voice on all channels
    pub fn all_notes_off(&self) {
        if let Some(synth) = self.lock().synthesizer.as_mut() {
            synth.note_off_all(false);
        }
    }

    /// Set the output gain; non-finite values are ignored
    pub fn set_gain(&self, gain: f32) {
        if gain.is_finite() {
            self.lock().gain = gain.max(0.0);
        }
    }

    pub fn gain(&self) -> f32 {
        self.lock().gain
    }

    /// Render into an interleaved stereo buffer, overwriting it
    ///
    /// Leaves the buffer untouched when no soundfont is loaded.
    pub fn render_into(&self, out: &mut [Sample]) {
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(synth) = state.synthesizer.as_mut() else {
            return;
        };

        let frames = frame_count(out);
        for chunk in out[..frames * CHANNELS].chunks_mut(RENDER_CHUNK * CHANNELS) {
            let n = chunk.len() / CHANNELS;
            let (left, right) = (&mut state.left[..n], &mut state.right[..n]);
            synth.render(left, right);
            for (i, frame) in chunk.chunks_exact_mut(CHANNELS).enumerate() {
                frame[0] = pcm_from_f32(left[i] * state.gain);
                frame[1] = pcm_from_f32(right[i] * state.gain);
            }
        }
    }
}

/// Validate a MIDI channel number (0-15)
fn midi_channel(channel: u8) -> Option<i32> {
    (channel < 16).then_some(channel as i32)
}

impl StereoSource for Synth {
    fn render_stereo(&self, out: &mut [Sample]) {
        self.render_into(out);
    }
}
