//! Control events and the targets they act on

use std::path::{Path, PathBuf};
use std::sync::Arc;

use eno_core::engine::{Looper, Metronome, Synth};

/// One control operation, independent of the transport that produced it
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    SynthNoteOn { channel: u8, note: u8, velocity: u8 },
    SynthNoteOff { channel: u8, note: u8 },
    /// 14-bit bend, 8192 = centre
    SynthPitchBend { channel: u8, value: u16 },
    SynthControlChange { channel: u8, controller: u8, value: u8 },
    SynthProgramChange { channel: u8, program: u8 },
    SynthLoad(PathBuf),
    SynthGain(f32),
    SynthAllNotesOff,

    MetronomeTap,
    MetronomeBpm(u32),
    MetronomeGain(f32),

    LooperTap,
    LooperCancel,
    LooperStop,
    LooperGain(f32),
    LooperDecay(f32),
}

/// Handles to the three sound sources
#[derive(Clone)]
pub struct ControlTargets {
    pub synth: Arc<Synth>,
    pub looper: Arc<Looper>,
    pub metronome: Arc<Metronome>,
}

impl ControlEvent {
    /// Apply this event to its target
    pub fn apply(&self, targets: &ControlTargets) {
        match self {
            ControlEvent::SynthNoteOn { channel, note, velocity } => {
                targets.synth.note_on(*channel, *note, *velocity)
            }
            ControlEvent::SynthNoteOff { channel, note } => targets.synth.note_off(*channel, *note),
            ControlEvent::SynthPitchBend { channel, value } => {
                targets.synth.pitch_bend(*channel, *value)
            }
            ControlEvent::SynthControlChange { channel, controller, value } => {
                targets.synth.control_change(*channel, *controller, *value)
            }
            ControlEvent::SynthProgramChange { channel, program } => {
                targets.synth.program_change(*channel, *program)
            }
            ControlEvent::SynthLoad(path) => load_soundfont(&targets.synth, path),
            ControlEvent::SynthGain(gain) => targets.synth.set_gain(*gain),
            ControlEvent::SynthAllNotesOff => targets.synth.all_notes_off(),

            ControlEvent::MetronomeTap => targets.metronome.tap(),
            ControlEvent::MetronomeBpm(bpm) => targets.metronome.set_bpm(*bpm),
            ControlEvent::MetronomeGain(gain) => targets.metronome.set_gain(*gain),

            ControlEvent::LooperTap => targets.looper.tap(),
            ControlEvent::LooperCancel => targets.looper.cancel(),
            ControlEvent::LooperStop => targets.looper.stop(),
            ControlEvent::LooperGain(gain) => targets.looper.set_gain(*gain),
            ControlEvent::LooperDecay(decay) => targets.looper.set_decay(*decay),
        }
    }
}

/// Load a soundfont, logging failures (the synth goes silent)
pub(crate) fn load_soundfont(synth: &Synth, path: &Path) {
    if let Err(e) = synth.load(path) {
        log::warn!("Failed to load soundfont {:?}: {}", path, e);
    }
}

#[cfg(test)]
pub(crate) fn test_targets() -> ControlTargets {
    use eno_core::SAMPLE_RATE;
    ControlTargets {
        synth: Arc::new(Synth::new(SAMPLE_RATE)),
        looper: Arc::new(Looper::with_capacity_frames(1024)),
        metronome: Arc::new(Metronome::new(SAMPLE_RATE)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eno_core::engine::LooperState;

    #[test]
    fn test_looper_events() {
        let targets = test_targets();
        ControlEvent::LooperTap.apply(&targets);
        assert_eq!(targets.looper.state(), LooperState::Recording);
        ControlEvent::LooperTap.apply(&targets);
        assert_eq!(targets.looper.state(), LooperState::Playing);
        ControlEvent::LooperStop.apply(&targets);
        assert_eq!(targets.looper.state(), LooperState::Stopped);
        ControlEvent::LooperCancel.apply(&targets);
        assert_eq!(targets.looper.state(), LooperState::Clear);

        ControlEvent::LooperGain(0.25).apply(&targets);
        ControlEvent::LooperDecay(0.8).apply(&targets);
        assert_eq!(targets.looper.gain(), 0.25);
        assert_eq!(targets.looper.decay(), 0.8);
    }

    #[test]
    fn test_metronome_events() {
        let targets = test_targets();
        ControlEvent::MetronomeBpm(120).apply(&targets);
        ControlEvent::MetronomeGain(0.2).apply(&targets);
        assert_eq!(targets.metronome.bpm(), 120);
        assert_eq!(targets.metronome.gain(), 0.2);

        ControlEvent::MetronomeTap.apply(&targets);
        assert_eq!(targets.metronome.tap_count(), 1);
    }

    #[test]
    fn test_failed_load_leaves_synth_silent() {
        let targets = test_targets();
        ControlEvent::SynthLoad(PathBuf::from("/nonexistent/font.sf2")).apply(&targets);
        assert!(!targets.synth.is_loaded());

        ControlEvent::SynthGain(0.4).apply(&targets);
        assert_eq!(targets.synth.gain(), 0.4);
    }
}
