//! Control plane configuration
//!
//! Lives under the `control` section of the application config:
//!
//! ```yaml
//! control:
//!   osc:
//!     host: 127.0.0.1
//!     first_port: 7027
//!     last_port: 7029
//!   midi:
//!     port_match: keystation
//!     mappings:
//!       - control: { type: Note, channel: 9, note: 36 }
//!         action: looper_tap
//!       - control: { type: ControlChange, channel: 0, cc: 64 }
//!         action: metronome_tap
//! ```

use serde::{Deserialize, Serialize};

/// Root control configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub osc: OscConfig,
    pub midi: MidiConfig,
}

/// OSC server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OscConfig {
    pub enabled: bool,
    /// Interface to bind
    pub host: String,
    /// First port tried
    pub first_port: u16,
    /// Last port tried (inclusive)
    pub last_port: u16,
}

impl Default for OscConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            first_port: 7027,
            last_port: 7029,
        }
    }
}

/// MIDI input settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiConfig {
    pub enabled: bool,
    /// Port name substring to match (case-insensitive); None = first port
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_match: Option<String>,
    /// Controls bound to looper/metronome actions instead of the synth
    pub mappings: Vec<MidiMapping>,
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port_match: None,
            mappings: Vec::new(),
        }
    }
}

/// MIDI control identifier (Note or CC)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "type")]
pub enum MidiControl {
    /// Note On/Off message
    Note {
        /// MIDI channel (0-15)
        channel: u8,
        /// Note number (0-127)
        note: u8,
    },
    /// Control Change message
    ControlChange {
        /// MIDI channel (0-15)
        channel: u8,
        /// CC number (0-127)
        cc: u8,
    },
}

impl MidiControl {
    pub fn note(channel: u8, note: u8) -> Self {
        Self::Note { channel, note }
    }

    pub fn cc(channel: u8, cc: u8) -> Self {
        Self::ControlChange { channel, cc }
    }
}

/// What a mapped control does when pressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MidiAction {
    MetronomeTap,
    LooperTap,
    LooperCancel,
    LooperStop,
}

/// One control → action binding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MidiMapping {
    pub control: MidiControl,
    pub action: MidiAction,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ControlConfig::default();
        assert!(config.osc.enabled);
        assert_eq!(config.osc.host, "127.0.0.1");
        assert_eq!((config.osc.first_port, config.osc.last_port), (7027, 7029));
        assert!(config.midi.enabled);
        assert!(config.midi.mappings.is_empty());
    }

    #[test]
    fn test_parse_mappings() {
        let yaml = r#"
osc:
  first_port: 9000
midi:
  port_match: keystation
  mappings:
    - control: { type: Note, channel: 9, note: 36 }
      action: looper_tap
    - control: { type: ControlChange, channel: 0, cc: 64 }
      action: metronome_tap
"#;
        let config: ControlConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.osc.first_port, 9000);
        assert_eq!(config.osc.last_port, 7029, "unset keys keep defaults");
        assert_eq!(config.midi.port_match.as_deref(), Some("keystation"));
        assert_eq!(
            config.midi.mappings,
            vec![
                MidiMapping {
                    control: MidiControl::note(9, 36),
                    action: MidiAction::LooperTap
                },
                MidiMapping {
                    control: MidiControl::cc(0, 64),
                    action: MidiAction::MetronomeTap
                },
            ]
        );
    }
}
