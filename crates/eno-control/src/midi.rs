//! MIDI input handling
//!
//! Receives raw MIDI bytes from the midir callback, parses them with midly,
//! and forwards [`ControlEvent`]s to the dispatcher via flume.
//!
//! Controls listed in the mapping config trigger looper/metronome actions on
//! press (note on, or CC value above 63) and are swallowed on release. Every
//! other channel message goes to the synth.

use std::collections::HashMap;

use flume::Sender;
use midir::{MidiInput, MidiInputConnection, MidiInputPort};
use midly::live::LiveEvent;
use midly::MidiMessage;

use crate::config::{MidiAction, MidiConfig, MidiControl, MidiMapping};
use crate::events::ControlEvent;
use crate::{ControlError, ControlResult};

/// Parsed channel message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiInputEvent {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8 },
    ControlChange { channel: u8, cc: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    /// Raw 14-bit bend, 8192 = centre
    PitchBend { channel: u8, value: u16 },
}

impl MidiInputEvent {
    /// Parse raw MIDI bytes
    ///
    /// Note On with velocity 0 is treated as Note Off. System and
    /// aftertouch messages are ignored.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let LiveEvent::Midi { channel, message } = LiveEvent::parse(data).ok()? else {
            return None;
        };
        let channel = channel.as_int();

        match message {
            MidiMessage::NoteOn { key, vel } if vel.as_int() == 0 => Some(Self::NoteOff {
                channel,
                note: key.as_int(),
            }),
            MidiMessage::NoteOn { key, vel } => Some(Self::NoteOn {
                channel,
                note: key.as_int(),
                velocity: vel.as_int(),
            }),
            MidiMessage::NoteOff { key, .. } => Some(Self::NoteOff {
                channel,
                note: key.as_int(),
            }),
            MidiMessage::Controller { controller, value } => Some(Self::ControlChange {
                channel,
                cc: controller.as_int(),
                value: value.as_int(),
            }),
            MidiMessage::ProgramChange { program } => Some(Self::ProgramChange {
                channel,
                program: program.as_int(),
            }),
            MidiMessage::PitchBend { bend } => Some(Self::PitchBend {
                channel,
                value: bend.0.as_int(),
            }),
            _ => None,
        }
    }

    /// The mappable control this event came from, if any
    fn control(&self) -> Option<MidiControl> {
        match *self {
            Self::NoteOn { channel, note, .. } | Self::NoteOff { channel, note } => {
                Some(MidiControl::note(channel, note))
            }
            Self::ControlChange { channel, cc, .. } => Some(MidiControl::cc(channel, cc)),
            _ => None,
        }
    }

    /// Check if this is a "press" event (Note On or CC > 63)
    fn is_press(&self) -> bool {
        match self {
            Self::NoteOn { .. } => true,
            Self::ControlChange { value, .. } => *value > 63,
            _ => false,
        }
    }

    /// Synth event for an unmapped message
    fn to_synth_event(self) -> ControlEvent {
        match self {
            Self::NoteOn { channel, note, velocity } => {
                ControlEvent::SynthNoteOn { channel, note, velocity }
            }
            Self::NoteOff { channel, note } => ControlEvent::SynthNoteOff { channel, note },
            Self::ControlChange { channel, cc, value } => ControlEvent::SynthControlChange {
                channel,
                controller: cc,
                value,
            },
            Self::ProgramChange { channel, program } => {
                ControlEvent::SynthProgramChange { channel, program }
            }
            Self::PitchBend { channel, value } => ControlEvent::SynthPitchBend { channel, value },
        }
    }
}

impl From<MidiAction> for ControlEvent {
    fn from(action: MidiAction) -> Self {
        match action {
            MidiAction::MetronomeTap => ControlEvent::MetronomeTap,
            MidiAction::LooperTap => ControlEvent::LooperTap,
            MidiAction::LooperCancel => ControlEvent::LooperCancel,
            MidiAction::LooperStop => ControlEvent::LooperStop,
        }
    }
}

/// Translates parsed MIDI into control events using the configured mappings
#[derive(Debug, Clone, Default)]
pub struct MidiRouter {
    mappings: HashMap<MidiControl, MidiAction>,
}

impl MidiRouter {
    pub fn new(mappings: &[MidiMapping]) -> Self {
        let mut table = HashMap::with_capacity(mappings.len());
        for mapping in mappings {
            if let Some(previous) = table.insert(mapping.control, mapping.action) {
                log::warn!(
                    "MIDI: {:?} mapped twice, {:?} replaced by {:?}",
                    mapping.control,
                    previous,
                    mapping.action
                );
            }
        }
        Self { mappings: table }
    }

    /// Map one event; None when a mapped control is released
    pub fn route(&self, event: MidiInputEvent) -> Option<ControlEvent> {
        let action = event.control().and_then(|c| self.mappings.get(&c));
        match action {
            Some(action) if event.is_press() => Some((*action).into()),
            Some(_) => None,
            None => Some(event.to_synth_event()),
        }
    }
}

/// Callback data passed to midir
struct CallbackData {
    events: Sender<ControlEvent>,
    router: MidiRouter,
}

/// MIDI input handler
///
/// Owns the midir connection; input stops when this is dropped.
pub struct MidiInputHandler {
    _connection: MidiInputConnection<CallbackData>,
}

impl MidiInputHandler {
    /// Connect to the configured input port
    ///
    /// With no `port_match` the first available port is used.
    pub fn connect(config: &MidiConfig, events: Sender<ControlEvent>) -> ControlResult<Self> {
        let (midi_in, port, port_name) = find_input_port(config.port_match.as_deref())?;

        let data = CallbackData {
            events,
            router: MidiRouter::new(&config.mappings),
        };

        let connection = midi_in
            .connect(&port, "eno-midi-input", Self::midi_callback, data)
            .map_err(|e| ControlError::MidiConnect(e.to_string()))?;

        log::info!(
            "MIDI: connected to {} ({} mappings)",
            port_name,
            config.mappings.len()
        );

        Ok(Self {
            _connection: connection,
        })
    }

    /// Called from the MIDI driver thread; must not block
    fn midi_callback(_timestamp: u64, data: &[u8], callback_data: &mut CallbackData) {
        let Some(event) = MidiInputEvent::parse(data) else {
            return;
        };
        log::trace!("[MIDI IN] {:?}", event);

        if let Some(control) = callback_data.router.route(event) {
            if callback_data.events.try_send(control).is_err() {
                log::warn!("MIDI: event channel full, dropping message");
            }
        }
    }
}

/// Find an input port by case-insensitive substring, or the first port
fn find_input_port(port_match: Option<&str>) -> ControlResult<(MidiInput, MidiInputPort, String)> {
    let midi_in =
        MidiInput::new("eno-midi-in").map_err(|e| ControlError::MidiInit(e.to_string()))?;

    let ports = midi_in.ports();
    if ports.is_empty() {
        return Err(ControlError::NoMidiPorts);
    }

    let pattern = port_match.map(str::to_lowercase);
    let found = ports.into_iter().find_map(|port| {
        let name = midi_in.port_name(&port).ok()?;
        match &pattern {
            Some(p) if !name.to_lowercase().contains(p.as_str()) => None,
            _ => Some((port, name)),
        }
    });

    match found {
        Some((port, name)) => {
            log::info!("MIDI: found input port: {}", name);
            Ok((midi_in, port, name))
        }
        None => Err(ControlError::MidiPortNotFound(
            port_match.unwrap_or_default().to_string(),
        )),
    }
}
