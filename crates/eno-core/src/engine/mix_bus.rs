//! Mix bus - one render pass per audio callback
//!
//! Renders the three sources into the output buffer in a fixed order:
//!
//! 1. Synth writes the baseline directly
//! 2. Looper records or mixes its loop on top of the synth
//! 3. Metronome mixes its click last, so loops never capture it
//!
//! The pass allocates nothing; each source holds its own lock only while it
//! renders.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::{Looper, Metronome, Synth};
use crate::types::{Sample, StreamStatus};

/// A sound source that renders into an interleaved stereo buffer
pub trait StereoSource {
    /// Render into `out`, combining with what the buffer already holds
    fn render_stereo(&self, out: &mut [Sample]);
}

/// The closed set of sources the bus knows how to drive
#[derive(Clone)]
pub enum Source {
    Synth(Arc<Synth>),
    Looper(Arc<Looper>),
    Metronome(Arc<Metronome>),
}

impl StereoSource for Source {
    #[inline]
    fn render_stereo(&self, out: &mut [Sample]) {
        match self {
            Source::Synth(s) => s.render_stereo(out),
            Source::Looper(l) => l.render_stereo(out),
            Source::Metronome(m) => m.render_stereo(out),
        }
    }
}

/// Number of sources on the bus
pub const NUM_SOURCES: usize = 3;

/// Per-callback orchestrator for the three sources
pub struct MixBus {
    /// Render order: synth, looper, metronome
    sources: [Source; NUM_SOURCES],
    /// Passes skipped because the driver reported an xrun
    xruns: Arc<AtomicU64>,
}

impl MixBus {
    pub fn new(synth: Arc<Synth>, looper: Arc<Looper>, metronome: Arc<Metronome>) -> Self {
        Self {
            sources: [
                Source::Synth(synth),
                Source::Looper(looper),
                Source::Metronome(metronome),
            ],
            xruns: Arc::new(AtomicU64::new(0)),
        }
    }

    #[cfg(test)]
    fn from_sources(sources: [Source; NUM_SOURCES]) -> Self {
        Self {
            sources,
            xruns: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Shared counter of skipped passes, readable from outside the audio thread
    pub fn xrun_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.xruns)
    }

    /// Produce one buffer of output
    ///
    /// On an xrun the buffer is left silent and no source advances.
    pub fn render_frame(&mut self, buffer: &mut [Sample], status: StreamStatus) {
        buffer.fill(0);

        if status.is_xrun() {
            self.xruns.fetch_add(1, Ordering::Relaxed);
            return;
        }

        for source in &self.sources {
            source.render_stereo(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::soft_clip::mix;
    use crate::engine::LooperState;
    use crate::types::{CHANNELS, SAMPLE_RATE};

    fn bus() -> (MixBus, Arc<Synth>, Arc<Looper>, Arc<Metronome>) {
        let synth = Arc::new(Synth::new(SAMPLE_RATE));
        let looper = Arc::new(Looper::with_capacity_frames(4096));
        let metronome = Arc::new(Metronome::new(SAMPLE_RATE));
        let bus = MixBus::new(synth.clone(), looper.clone(), metronome.clone());
        (bus, synth, looper, metronome)
    }

    #[test]
    fn test_silence_on_empty_state() {
        let (mut bus, _, _, _) = bus();
        let mut buf = vec![999; 128 * CHANNELS];
        bus.render_frame(&mut buf, StreamStatus::Ok);
        assert!(buf.iter().all(|&s| s == 0), "idle bus must be silent");
    }

    /// A looper already playing `frames` frames of a constant `value`
    fn playing_looper(frames: usize, value: Sample) -> Arc<Looper> {
        let looper = Looper::with_capacity_frames(4096);
        looper.tap();
        looper.mix_stereo(&mut vec![value; frames * CHANNELS]);
        looper.tap();
        assert_eq!(looper.state(), LooperState::Playing);
        Arc::new(looper)
    }

    #[test]
    fn test_first_source_passes_through_idle_sources() {
        // Something audible in the synth slot; idle looper and metronome behind it
        let lead = playing_looper(64, 1200);
        let idle_looper = Arc::new(Looper::with_capacity_frames(4096));
        let metronome = Arc::new(Metronome::new(SAMPLE_RATE));
        metronome.set_bpm(0);
        let mut bus = MixBus::from_sources([
            Source::Looper(lead),
            Source::Looper(idle_looper.clone()),
            Source::Metronome(metronome),
        ]);

        let mut out = vec![0; 32 * CHANNELS];
        bus.render_frame(&mut out, StreamStatus::Ok);

        let mut expected = vec![0; 32 * CHANNELS];
        playing_looper(64, 1200).render_stereo(&mut expected);
        assert!(expected.iter().all(|&s| s != 0), "first source must be audible");
        assert_eq!(out, expected);
        assert_eq!(idle_looper.state(), LooperState::Clear);
    }

    #[test]
    fn test_xrun_renders_silence_and_freezes_sources() {
        let (mut bus, _, looper, metronome) = bus();
        metronome.set_bpm(120);
        looper.tap();

        let counter = bus.xrun_counter();
        let mut buf = vec![999; 128 * CHANNELS];
        bus.render_frame(&mut buf, StreamStatus::Underflow);
        assert!(buf.iter().all(|&s| s == 0));
        assert_eq!(counter.load(Ordering::Relaxed), 1);
        assert_eq!(looper.len_frames(), 0, "looper must not run during an xrun");
    }

    #[test]
    fn test_metronome_not_captured_by_looper() {
        let (mut bus, _, looper, metronome) = bus();
        metronome.set_bpm(120);
        looper.tap();

        let mut buf = vec![0; 128 * CHANNELS];
        bus.render_frame(&mut buf, StreamStatus::Ok);
        assert!(buf.iter().any(|&s| s != 0), "click should be audible");

        looper.tap();
        assert_eq!(looper.state(), LooperState::Playing);
        assert_eq!(looper.len_frames(), 128);
        assert_eq!(looper.frame_at(5), Some([0, 0]), "loop holds the pre-click mix");
    }

    #[test]
    fn test_loop_then_click_order() {
        let (mut bus, _, looper, metronome) = bus();
        looper.tap();
        let mut buf = vec![0; 64 * CHANNELS];
        bus.render_frame(&mut buf, StreamStatus::Ok);
        looper.tap();

        // Silent loop plus a click: output is exactly the click over silence
        metronome.set_bpm(60);
        let mut out = vec![0; 64 * CHANNELS];
        bus.render_frame(&mut out, StreamStatus::Ok);

        let reference = Metronome::new(SAMPLE_RATE);
        reference.set_bpm(60);
        // An empty-content loop adds mix(0, 0) == 0 before the click
        let mut expected = vec![mix(0, 0); 64 * CHANNELS];
        reference.render_stereo(&mut expected);
        assert_eq!(out, expected);
    }
}
