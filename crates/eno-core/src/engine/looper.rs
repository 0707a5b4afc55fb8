//! Loop recorder with overdub
//!
//! State machine driven by [`Looper::tap`], [`Looper::cancel`] and
//! [`Looper::stop`]:
//!
//! ```text
//!            tap              tap                tap
//!   Clear ───────► Recording ─────► Playing ◄──────────► Overdubbing
//!     ▲               │  cancel       │  │ stop   cancel ──┘ (back to Playing,
//!     └───────────────┘               │  ▼                    pass discarded)
//!     ▲           cancel              │ Stopped
//!     └───────────────────────────────┘  │ tap → Playing (from position 0)
//! ```
//!
//! Recording captures the mix that reaches the looper (everything rendered
//! before it in the bus) and plays nothing itself. Playing mixes the loop back
//! in at `gain`. Overdubbing plays the committed loop while writing
//! `decay * old + input` into a second buffer; the next tap swaps that buffer
//! in, a cancel throws it away.
//!
//! The recording buffer reserves its full capacity up front so the audio
//! thread never allocates. A recording that fills the capacity is finalized
//! as if tapped. The committed loop is shared behind an `Arc` so starting an
//! overdub copies it on the control thread, outside the lock.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::soft_clip::mix;
use super::StereoSource;
use crate::types::{frame_count, Sample, CHANNELS};

/// Default maximum loop length in seconds
pub const DEFAULT_MAX_LOOP_SECONDS: u32 = 60;

/// Looper state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LooperState {
    /// No loop recorded
    #[default]
    Clear,
    /// Capturing the incoming mix
    Recording,
    /// Playing the loop while layering new input on top
    Overdubbing,
    /// Playing the loop
    Playing,
    /// Loop kept but silent
    Stopped,
}

struct LooperInner {
    state: LooperState,
    /// Committed loop, interleaved stereo. Only mutated while unshared (Recording).
    loop_buf: Arc<Vec<Sample>>,
    /// Overdub pass in progress (same length as `loop_buf` while overdubbing)
    overdub: Vec<Sample>,
    /// Playback position in frames
    position: usize,
    gain: f32,
    decay: f32,
    /// Recording capacity in samples
    capacity: usize,
}

impl LooperInner {
    fn len_frames(&self) -> usize {
        frame_count(&self.loop_buf)
    }

    fn finish_recording(&mut self) {
        self.state = LooperState::Playing;
        self.position = 0;
    }

    /// Empty the loop, keeping the reserved buffer when nobody else holds it
    fn clear_loop(&mut self) {
        match Arc::get_mut(&mut self.loop_buf) {
            Some(buf) => buf.clear(),
            None => self.loop_buf = Arc::new(Vec::new()),
        }
        self.position = 0;
    }

    /// Make sure `loop_buf` is unshared, empty and can hold a full recording
    fn prepare_recording(&mut self) {
        let capacity = self.capacity;
        let reusable = Arc::get_mut(&mut self.loop_buf).is_some_and(|buf| {
            buf.clear();
            buf.capacity() >= capacity
        });
        if !reusable {
            self.loop_buf = Arc::new(Vec::with_capacity(capacity));
        }
        self.position = 0;
    }
}

/// Loop record/overdub/playback engine
pub struct Looper {
    inner: Mutex<LooperInner>,
}

impl Looper {
    /// Create a looper holding up to [`DEFAULT_MAX_LOOP_SECONDS`] of audio
    pub fn new(sample_rate: u32) -> Self {
        Self::with_max_seconds(sample_rate, DEFAULT_MAX_LOOP_SECONDS)
    }

    /// Create a looper holding up to `seconds` of audio
    pub fn with_max_seconds(sample_rate: u32, seconds: u32) -> Self {
        Self::with_capacity_frames(sample_rate as usize * seconds.max(1) as usize)
    }

    /// Create a looper holding up to `frames` stereo frames
    pub fn with_capacity_frames(frames: usize) -> Self {
        let capacity = frames.max(1) * CHANNELS;
        Self {
            inner: Mutex::new(LooperInner {
                state: LooperState::Clear,
                loop_buf: Arc::new(Vec::with_capacity(capacity)),
                overdub: Vec::new(),
                position: 0,
                gain: 1.0,
                decay: 0.5,
                capacity,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LooperInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Advance the state machine one step
    pub fn tap(&self) {
        loop {
            let mut s = self.lock();
            if s.state != LooperState::Playing {
                Self::step(&mut s);
                return;
            }
            let snapshot = Arc::clone(&s.loop_buf);
            drop(s);

            let layer = snapshot.to_vec();
            if self.start_overdub(&snapshot, layer) {
                return;
            }
            // Loop changed while copying: tap whatever state it is in now
        }
    }

    /// Switch Playing -> Overdubbing with a copy of `snapshot`, unless the
    /// committed loop was replaced in the meantime
    fn start_overdub(&self, snapshot: &Arc<Vec<Sample>>, layer: Vec<Sample>) -> bool {
        let mut s = self.lock();
        if s.state != LooperState::Playing || !Arc::ptr_eq(&s.loop_buf, snapshot) {
            return false;
        }
        let previous = std::mem::replace(&mut s.overdub, layer);
        s.position = 0;
        s.state = LooperState::Overdubbing;
        log::debug!("Looper: tap Playing -> Overdubbing ({} frames)", s.len_frames());
        drop(s);
        drop(previous);
        true
    }

    /// Tap transitions that do constant work under the lock
    fn step(s: &mut LooperInner) {
        let from = s.state;
        let mut retired = None;
        match from {
            LooperState::Clear => {
                s.prepare_recording();
                s.state = LooperState::Recording;
            }
            LooperState::Recording => s.finish_recording(),
            LooperState::Playing => return,
            LooperState::Overdubbing => {
                let layer = std::mem::take(&mut s.overdub);
                retired = Some(std::mem::replace(&mut s.loop_buf, Arc::new(layer)));
                s.state = LooperState::Playing;
            }
            LooperState::Stopped => {
                s.position = 0;
                s.state = LooperState::Playing;
            }
        }
        log::debug!(
            "Looper: tap {:?} -> {:?} ({} frames)",
            from,
            s.state,
            s.len_frames()
        );
        drop(retired);
    }

    /// Undo the current step
    pub fn cancel(&self) {
        let mut s = self.lock();
        let from = s.state;
        let discarded = match from {
            LooperState::Clear => return,
            LooperState::Overdubbing => {
                s.state = LooperState::Playing;
                std::mem::take(&mut s.overdub)
            }
            LooperState::Recording | LooperState::Playing | LooperState::Stopped => {
                s.clear_loop();
                s.state = LooperState::Clear;
                std::mem::take(&mut s.overdub)
            }
        };
        log::debug!("Looper: cancel {:?} -> {:?}", from, s.state);
        drop(s);
        drop(discarded);
    }

    /// Silence a playing loop, keeping its content
    pub fn stop(&self) {
        let mut s = self.lock();
        if s.state == LooperState::Playing {
            s.state = LooperState::Stopped;
            log::debug!("Looper: stopped at frame {}", s.position);
        }
    }

    /// Set the playback gain; non-finite values are ignored
    pub fn set_gain(&self, gain: f32) {
        if gain.is_finite() {
            self.lock().gain = gain.max(0.0);
        }
    }

    /// Set how much of the previous layer survives an overdub pass;
    /// non-finite values are ignored
    pub fn set_decay(&self, decay: f32) {
        if decay.is_finite() {
            self.lock().decay = decay.clamp(0.0, 1.0);
        }
    }

    pub fn state(&self) -> LooperState {
        self.lock().state
    }

    /// Committed loop length in frames (recorded length while recording)
    pub fn len_frames(&self) -> usize {
        self.lock().len_frames()
    }

    /// Playback position in frames
    pub fn position(&self) -> usize {
        self.lock().position
    }

    pub fn gain(&self) -> f32 {
        self.lock().gain
    }

    pub fn decay(&self) -> f32 {
        self.lock().decay
    }

    /// Render into an interleaved stereo buffer holding the mix so far
    pub fn mix_stereo(&self, out: &mut [Sample]) {
        let mut guard = self.lock();
        let s = &mut *guard;

        match s.state {
            LooperState::Clear | LooperState::Stopped => {}
            LooperState::Recording => {
                let capacity = s.capacity;
                let full = match Arc::get_mut(&mut s.loop_buf) {
                    Some(buf) => {
                        let room = capacity.saturating_sub(buf.len());
                        let usable = out.len() - out.len() % CHANNELS;
                        let take = usable.min(room);
                        buf.extend_from_slice(&out[..take]);
                        take < usable || buf.len() >= capacity
                    }
                    None => false,
                };
                if full {
                    s.finish_recording();
                }
            }
            LooperState::Playing => {
                let len = frame_count(&s.loop_buf);
                if len == 0 {
                    return;
                }
                for frame in out.chunks_exact_mut(CHANNELS) {
                    let at = s.position * CHANNELS;
                    for (ch, sample) in frame.iter_mut().enumerate() {
                        *sample = mix(*sample, scale(s.loop_buf[at + ch], s.gain));
                    }
                    s.position = (s.position + 1) % len;
                }
            }
            LooperState::Overdubbing => {
                let len = frame_count(&s.overdub);
                if len == 0 {
                    return;
                }
                for frame in out.chunks_exact_mut(CHANNELS) {
                    let at = s.position * CHANNELS;
                    for (ch, sample) in frame.iter_mut().enumerate() {
                        let old = s.overdub[at + ch];
                        let input = *sample;
                        s.overdub[at + ch] = saturate(s.decay * old as f32 + input as f32);
                        *sample = mix(input, scale(old, s.gain));
                    }
                    s.position = (s.position + 1) % len;
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn frame_at(&self, frame: usize) -> Option<[Sample; 2]> {
        let s = self.lock();
        let at = frame * CHANNELS;
        s.loop_buf.get(at..at + CHANNELS).map(|f| [f[0], f[1]])
    }
}

impl StereoSource for Looper {
    fn render_stereo(&self, out: &mut [Sample]) {
        self.mix_stereo(out);
    }
}

#[inline]
fn scale(sample: Sample, gain: f32) -> Sample {
    saturate(sample as f32 * gain)
}

#[inline]
fn saturate(value: f32) -> Sample {
    value.clamp(i16::MIN as f32, i16::MAX as f32) as Sample
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Feed `frames` frames of a constant `value` through the looper
    fn feed(looper: &Looper, frames: usize, value: Sample) -> Vec<Sample> {
        let mut buf = vec![value; frames * CHANNELS];
        looper.mix_stereo(&mut buf);
        buf
    }

    fn record(looper: &Looper, frames: usize, value: Sample) {
        looper.tap();
        feed(looper, frames, value);
        looper.tap();
    }

    #[test]
    fn test_tap_cycle() {
        let looper = Looper::with_capacity_frames(1024);
        assert_eq!(looper.state(), LooperState::Clear);
        looper.tap();
        assert_eq!(looper.state(), LooperState::Recording);
        looper.tap();
        assert_eq!(looper.state(), LooperState::Playing);
        looper.tap();
        assert_eq!(looper.state(), LooperState::Overdubbing);
        looper.tap();
        assert_eq!(looper.state(), LooperState::Playing);
    }

    #[test]
    fn test_cancel_recording_discards() {
        let looper = Looper::with_capacity_frames(1024);
        looper.tap();
        feed(&looper, 100, 500);
        assert_eq!(looper.len_frames(), 100);
        looper.cancel();
        assert_eq!(looper.state(), LooperState::Clear);
        assert_eq!(looper.len_frames(), 0);
    }

    #[test]
    fn test_cancel_clear_is_noop() {
        let looper = Looper::with_capacity_frames(16);
        looper.cancel();
        assert_eq!(looper.state(), LooperState::Clear);
    }

    #[test]
    fn test_cancel_playing_clears() {
        let looper = Looper::with_capacity_frames(1024);
        record(&looper, 64, 100);
        looper.cancel();
        assert_eq!(looper.state(), LooperState::Clear);
        assert_eq!(looper.len_frames(), 0);
    }

    #[test]
    fn test_recording_passes_input_through() {
        let looper = Looper::with_capacity_frames(1024);
        looper.tap();
        let out = feed(&looper, 32, 777);
        assert!(out.iter().all(|&s| s == 777), "recording must not add anything");
    }

    #[test]
    fn test_playback_wraparound() {
        let looper = Looper::with_capacity_frames(1024);
        record(&looper, 100, 1000);
        assert_eq!(looper.len_frames(), 100);
        assert_eq!(looper.position(), 0);

        feed(&looper, 105, 0);
        assert_eq!(looper.position(), 5);
    }

    #[test]
    fn test_playback_mixes_loop() {
        let looper = Looper::with_capacity_frames(1024);
        record(&looper, 10, 1000);
        let out = feed(&looper, 10, 0);
        assert!(out.iter().all(|&s| s == mix(0, 1000)));

        looper.set_gain(0.5);
        let out = feed(&looper, 10, 0);
        assert!(out.iter().all(|&s| s == mix(0, 500)));
    }

    #[test]
    fn test_overdub_decay() {
        let looper = Looper::with_capacity_frames(1024);
        record(&looper, 50, 8000);
        looper.set_decay(0.5);

        looper.tap();
        assert_eq!(looper.state(), LooperState::Overdubbing);
        let out = feed(&looper, 50, 3000);
        // Output still carries the committed loop
        assert_eq!(out[0], mix(3000, 8000));

        looper.tap();
        assert_eq!(looper.state(), LooperState::Playing);
        let expected = 0.5 * 8000.0 + 3000.0;
        let [l, r] = looper.frame_at(7).expect("frame recorded");
        assert!((l as f32 - expected).abs() <= 1.0, "got {}, want {}", l, expected);
        assert_eq!(l, r);
        assert_eq!(looper.len_frames(), 50, "overdub keeps the loop length");
    }

    #[test]
    fn test_cancel_overdub_keeps_committed_loop() {
        let looper = Looper::with_capacity_frames(1024);
        record(&looper, 20, 4000);

        looper.tap();
        feed(&looper, 20, 9000);
        looper.cancel();
        assert_eq!(looper.state(), LooperState::Playing);
        assert_eq!(looper.frame_at(3), Some([4000, 4000]));
        assert_eq!(looper.len_frames(), 20);
    }

    #[test]
    fn test_repeated_overdubs_fade() {
        let looper = Looper::with_capacity_frames(64);
        record(&looper, 8, 16000);
        looper.set_decay(0.5);
        for _ in 0..6 {
            looper.tap();
            feed(&looper, 8, 0);
            looper.tap();
        }
        let [l, _] = looper.frame_at(0).expect("frame recorded");
        assert!(l.abs() < 16000 / 32, "layer should fade, got {}", l);
    }

    #[test]
    fn test_stop_and_resume() {
        let looper = Looper::with_capacity_frames(1024);
        record(&looper, 40, 2000);
        feed(&looper, 10, 0);

        looper.stop();
        assert_eq!(looper.state(), LooperState::Stopped);
        let out = feed(&looper, 10, 0);
        assert!(out.iter().all(|&s| s == 0), "stopped loop is silent");

        looper.tap();
        assert_eq!(looper.state(), LooperState::Playing);
        assert_eq!(looper.position(), 0);
    }

    #[test]
    fn test_stop_ignored_outside_playing() {
        let looper = Looper::with_capacity_frames(1024);
        looper.stop();
        assert_eq!(looper.state(), LooperState::Clear);
        looper.tap();
        looper.stop();
        assert_eq!(looper.state(), LooperState::Recording);
    }

    #[test]
    fn test_recording_stops_at_capacity() {
        let looper = Looper::with_capacity_frames(100);
        looper.tap();
        feed(&looper, 64, 10);
        assert_eq!(looper.state(), LooperState::Recording);
        feed(&looper, 64, 20);
        assert_eq!(looper.state(), LooperState::Playing);
        assert_eq!(looper.len_frames(), 100);
        assert_eq!(looper.frame_at(99), Some([20, 20]));
    }

    #[test]
    fn test_empty_loop_renders_silence() {
        let looper = Looper::with_capacity_frames(16);
        looper.tap();
        looper.tap();
        assert_eq!(looper.state(), LooperState::Playing);
        assert_eq!(looper.len_frames(), 0);

        let out = feed(&looper, 8, 123);
        assert!(out.iter().all(|&s| s == 123));

        looper.tap();
        assert_eq!(looper.state(), LooperState::Overdubbing);
        let out = feed(&looper, 8, 123);
        assert!(out.iter().all(|&s| s == 123));
    }

    #[test]
    fn test_setters_clamp() {
        let looper = Looper::with_capacity_frames(16);
        looper.set_decay(1.7);
        assert_eq!(looper.decay(), 1.0);
        looper.set_decay(-0.2);
        assert_eq!(looper.decay(), 0.0);
        looper.set_gain(-3.0);
        assert_eq!(looper.gain(), 0.0);
    }

    #[test]
    fn test_non_finite_settings_ignored() {
        let looper = Looper::with_capacity_frames(64);
        record(&looper, 8, 8000);
        looper.set_decay(0.5);
        looper.set_decay(f32::NAN);
        looper.set_gain(f32::INFINITY);
        assert_eq!(looper.decay(), 0.5);
        assert_eq!(looper.gain(), 1.0);

        looper.tap();
        feed(&looper, 8, 0);
        looper.tap();
        assert_eq!(looper.frame_at(3), Some([4000, 4000]), "layer must survive");
    }

    #[test]
    fn test_overdub_copy_leaves_lock_free() {
        let looper = Looper::with_capacity_frames(1024);
        record(&looper, 64, 1000);

        // First half of a tap: snapshot the committed loop
        let snapshot = Arc::clone(&looper.lock().loop_buf);
        assert!(looper.inner.try_lock().is_ok(), "copy must not hold the lock");
        let out = feed(&looper, 4, 0);
        assert_eq!(out[0], mix(0, 1000), "audio keeps playing during the copy");

        assert!(looper.start_overdub(&snapshot, snapshot.to_vec()));
        assert_eq!(looper.state(), LooperState::Overdubbing);
        assert_eq!(looper.position(), 0);
    }

    #[test]
    fn test_stale_overdub_copy_rejected() {
        let looper = Looper::with_capacity_frames(1024);
        record(&looper, 64, 1000);
        let snapshot = Arc::clone(&looper.lock().loop_buf);

        looper.cancel();
        record(&looper, 32, 2000);
        assert!(!looper.start_overdub(&snapshot, snapshot.to_vec()));
        assert_eq!(looper.state(), LooperState::Playing);
        assert_eq!(looper.len_frames(), 32);
        assert_eq!(looper.frame_at(0), Some([2000, 2000]));
    }

    #[test]
    fn test_controls_race_with_render() {
        let looper = Looper::with_capacity_frames(4096);
        let done = AtomicBool::new(false);

        std::thread::scope(|scope| {
            scope.spawn(|| {
                let mut buf = vec![0; 128 * CHANNELS];
                while !done.load(Ordering::Relaxed) {
                    buf.fill(300);
                    looper.mix_stereo(&mut buf);
                }
            });

            for i in 0..2000 {
                match i % 8 {
                    0..=3 => looper.tap(),
                    4 => looper.cancel(),
                    5 => looper.stop(),
                    6 => looper.set_decay(0.3),
                    _ => std::thread::yield_now(),
                }
                let len = looper.len_frames();
                let position = looper.position();
                assert!(len <= 4096, "loop grew past capacity: {}", len);
                if len > 0 {
                    assert!(position < len, "position {} outside loop of {}", position, len);
                }
            }
            done.store(true, Ordering::Relaxed);
        });

        assert!(looper.len_frames() <= 4096);
    }
}
