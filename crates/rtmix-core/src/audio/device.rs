//! Audio device enumeration
//!
//! Devices are listed from every available cpal host (ALSA, PulseAudio,
//! CoreAudio, WASAPI...), so a device of a non-default host can be picked
//! by its [`DeviceId`].

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Host, HostId};

use super::config::DeviceId;
use super::error::{AudioError, AudioResult};
use crate::error::Direction;

const COMMON_SAMPLE_RATES: [u32; 6] = [44100, 48000, 88200, 96000, 176400, 192000];

/// Human-readable name for a host ID
fn host_name(host_id: HostId) -> String {
    let name = format!("{:?}", host_id);
    match name.as_str() {
        "Alsa" => "ALSA".to_string(),
        "Jack" => "JACK".to_string(),
        "Wasapi" => "WASAPI".to_string(),
        _ => name,
    }
}

fn host_by_name(name: &str) -> Option<Host> {
    cpal::available_hosts()
        .into_iter()
        .find(|&host_id| host_name(host_id) == name)
        .and_then(|host_id| cpal::host_from_id(host_id).ok())
}

fn devices_of(host: &Host, direction: Direction) -> Option<Vec<cpal::Device>> {
    let devices: Result<Vec<cpal::Device>, cpal::DevicesError> = match direction {
        Direction::Output => host.output_devices().map(|d| d.collect()),
        Direction::Input => host.input_devices().map(|d| d.collect()),
    };
    match devices {
        Ok(devices) => Some(devices),
        Err(e) => {
            log::debug!("Could not enumerate {} devices for {:?}: {}", direction, host.id(), e);
            None
        }
    }
}

fn default_of(host: &Host, direction: Direction) -> Option<cpal::Device> {
    match direction {
        Direction::Output => host.default_output_device(),
        Direction::Input => host.default_input_device(),
    }
}

/// Information about an audio device
#[derive(Debug, Clone)]
pub struct AudioDevice {
    /// Identifier for configuration (includes host)
    pub id: DeviceId,
    pub name: String,
    /// Host backend name (e.g. "ALSA")
    pub host: String,
    pub direction: Direction,
    /// Whether this is the default device of its host
    pub is_default: bool,
    /// Common sample rates inside the supported ranges
    pub sample_rates: Vec<u32>,
    pub max_channels: u16,
}

impl std::fmt::Display for AudioDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {} ({} ch)", self.host, self.name, self.max_channels)?;
        if self.is_default {
            write!(f, " (default)")?;
        }
        Ok(())
    }
}

/// Summarize the supported configurations of one device
fn describe(device: &cpal::Device, direction: Direction) -> Option<(Vec<u32>, u16)> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> = match direction {
        Direction::Output => device.supported_output_configs().ok()?.collect(),
        Direction::Input => device.supported_input_configs().ok()?.collect(),
    };
    if ranges.is_empty() {
        return None;
    }

    let mut sample_rates = Vec::new();
    let mut max_channels = 0;
    for range in &ranges {
        max_channels = max_channels.max(range.channels());
        for rate in COMMON_SAMPLE_RATES {
            if rate >= range.min_sample_rate().0
                && rate <= range.max_sample_rate().0
                && !sample_rates.contains(&rate)
            {
                sample_rates.push(rate);
            }
        }
    }
    sample_rates.sort_unstable();
    Some((sample_rates, max_channels))
}

/// List devices of one direction from all hosts
///
/// Default devices come first, then devices sorted by host and name.
pub fn list_devices(direction: Direction) -> AudioResult<Vec<AudioDevice>> {
    let mut all_devices = Vec::new();

    for host_id in cpal::available_hosts() {
        let host = match cpal::host_from_id(host_id) {
            Ok(host) => host,
            Err(e) => {
                log::debug!("Could not initialize host {:?}: {}", host_id, e);
                continue;
            }
        };
        let host_label = host_name(host_id);
        let default_name = default_of(&host, direction).and_then(|d| d.name().ok());

        for device in devices_of(&host, direction).unwrap_or_default() {
            let Ok(name) = device.name() else { continue };
            let Some((sample_rates, max_channels)) = describe(&device, direction) else {
                continue;
            };
            all_devices.push(AudioDevice {
                id: DeviceId::with_host(&name, &host_label),
                is_default: default_name.as_ref() == Some(&name),
                name,
                host: host_label.clone(),
                direction,
                sample_rates,
                max_channels,
            });
        }
    }

    if all_devices.is_empty() {
        return Err(AudioError::NoDevices(direction));
    }

    all_devices.sort_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then_with(|| a.host.cmp(&b.host))
            .then_with(|| a.name.cmp(&b.name))
    });

    log::info!("Enumerated {} audio {} devices", all_devices.len(), direction);
    Ok(all_devices)
}

pub fn list_output_devices() -> AudioResult<Vec<AudioDevice>> {
    list_devices(Direction::Output)
}

pub fn list_input_devices() -> AudioResult<Vec<AudioDevice>> {
    list_devices(Direction::Input)
}

/// Resolve a configured device, falling back to the default host's default
pub(crate) fn open_device(id: Option<&DeviceId>, direction: Direction) -> AudioResult<cpal::Device> {
    match id {
        Some(id) => find_device(id, direction),
        None => default_of(&cpal::default_host(), direction)
            .ok_or(AudioError::NoDefaultDevice(direction)),
    }
}

/// Find a device by its ID
///
/// Uses the host named in the ID if it is available, otherwise searches
/// all hosts by name.
pub fn find_device(id: &DeviceId, direction: Direction) -> AudioResult<cpal::Device> {
    let matches = |d: &cpal::Device| d.name().ok().as_ref() == Some(&id.name);

    if let Some(host) = id.host.as_deref().and_then(host_by_name) {
        return devices_of(&host, direction)
            .and_then(|devices| devices.into_iter().find(matches))
            .ok_or_else(|| AudioError::DeviceNotFound(id.display_label()));
    }

    cpal::available_hosts()
        .into_iter()
        .filter_map(|host_id| cpal::host_from_id(host_id).ok())
        .find_map(|host| devices_of(&host, direction)?.into_iter().find(matches))
        .ok_or_else(|| AudioError::DeviceNotFound(id.display_label()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_enumeration() {
        // Machines without audio hardware (CI) report NoDevices
        for direction in [Direction::Output, Direction::Input] {
            match list_devices(direction) {
                Ok(devices) => {
                    assert!(devices.iter().all(|d| d.direction == direction));
                    for device in &devices {
                        println!("  {} {}", direction, device);
                    }
                }
                Err(AudioError::NoDevices(d)) => assert_eq!(d, direction),
                Err(e) => println!("Error enumerating {} devices: {}", direction, e),
            }
        }
    }

    #[test]
    fn test_unknown_device_not_found() {
        let id = DeviceId::with_host("no such device 1234", "NoSuchHost");
        assert!(find_device(&id, Direction::Output).is_err());
    }
}
