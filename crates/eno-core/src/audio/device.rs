//! Audio device enumeration and lookup
//!
//! Devices are enumerated from every available cpal host (ALSA, PulseAudio,
//! CoreAudio, WASAPI, ...) so a host-qualified [`DeviceId`] can pick one.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Host, HostId};

use super::config::DeviceId;
use super::error::{AudioError, AudioResult};

/// Get a human-readable name for a host ID
fn host_name(host_id: HostId) -> String {
    let name = format!("{:?}", host_id);
    match name.as_str() {
        "Alsa" => "ALSA".to_string(),
        "Jack" => "JACK".to_string(),
        "Wasapi" => "WASAPI".to_string(),
        _ => name,
    }
}

/// Get a host by its display name (case-insensitive)
fn get_host_by_name(name: &str) -> Option<Host> {
    cpal::available_hosts()
        .into_iter()
        .find(|id| host_name(*id).eq_ignore_ascii_case(name))
        .and_then(|id| cpal::host_from_id(id).ok())
}

/// Information about an audio output device
#[derive(Debug, Clone)]
pub struct AudioDevice {
    /// Device identifier for configuration (includes host info)
    pub id: DeviceId,
    /// Whether this is the default device of its host
    pub is_default: bool,
    /// Common sample rates the device supports
    pub sample_rates: Vec<u32>,
    /// Maximum output channels
    pub max_channels: u16,
}

impl std::fmt::Display for AudioDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id.display_label())?;
        if self.is_default {
            write!(f, " (default)")?;
        }
        write!(f, " - {} ch, rates {:?}", self.max_channels, self.sample_rates)
    }
}

/// List output devices from all hosts, default devices first
pub fn list_output_devices() -> AudioResult<Vec<AudioDevice>> {
    let mut all_devices = Vec::new();

    for host_id in cpal::available_hosts() {
        let host = match cpal::host_from_id(host_id) {
            Ok(h) => h,
            Err(e) => {
                log::debug!("Could not initialize host {:?}: {}", host_id, e);
                continue;
            }
        };
        let host_label = host_name(host_id);

        let default_name = host
            .default_output_device()
            .and_then(|d: cpal::Device| d.name().ok());

        let devices = match host.output_devices() {
            Ok(d) => d,
            Err(e) => {
                log::debug!("Could not enumerate devices for {:?}: {}", host_id, e);
                continue;
            }
        };

        for device in devices {
            let Ok(name) = device.name() else { continue };
            let Ok(configs) = device.supported_output_configs() else {
                continue;
            };

            let mut sample_rates = Vec::new();
            let mut max_channels = 0;
            for config in configs {
                max_channels = max_channels.max(config.channels());
                for rate in [22050, 44100, 48000, 88200, 96000] {
                    if (config.min_sample_rate().0..=config.max_sample_rate().0).contains(&rate)
                        && !sample_rates.contains(&rate)
                    {
                        sample_rates.push(rate);
                    }
                }
            }
            if max_channels == 0 {
                continue;
            }
            sample_rates.sort_unstable();

            all_devices.push(AudioDevice {
                is_default: default_name.as_ref() == Some(&name),
                id: DeviceId::with_host(&name, &host_label),
                sample_rates,
                max_channels,
            });
        }
    }

    if all_devices.is_empty() {
        return Err(AudioError::NoDevices);
    }

    all_devices.sort_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then_with(|| a.id.host.cmp(&b.id.host))
            .then_with(|| a.id.name.cmp(&b.id.name))
    });

    Ok(all_devices)
}

/// Find a device by its ID
///
/// Uses the host named in the ID if there is one, otherwise searches every
/// host for a device with that name.
pub fn find_device_by_id(id: &DeviceId) -> AudioResult<cpal::Device> {
    if let Some(host) = id.host.as_deref().and_then(get_host_by_name) {
        return host
            .output_devices()
            .map_err(|_| AudioError::DeviceNotFound(id.display_label()))?
            .find(|d| d.name().ok().as_ref() == Some(&id.name))
            .ok_or_else(|| AudioError::DeviceNotFound(id.display_label()));
    }

    cpal::available_hosts()
        .into_iter()
        .filter_map(|host_id| cpal::host_from_id(host_id).ok())
        .filter_map(|host| host.output_devices().ok())
        .flatten()
        .find(|d| d.name().ok().as_ref() == Some(&id.name))
        .ok_or_else(|| AudioError::DeviceNotFound(id.display_label()))
}

/// Get the default output device of the default host
pub fn default_output_device() -> AudioResult<cpal::Device> {
    cpal::default_host()
        .default_output_device()
        .ok_or(AudioError::NoDefaultDevice)
}
