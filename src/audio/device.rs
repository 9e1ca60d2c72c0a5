//! Audio device enumeration
//!
//! Point-in-time snapshots of the hardware audio endpoints visible through
//! cpal. Snapshots are rebuilt on every call and never cached.

use cpal::traits::{DeviceTrait, HostTrait};
use serde::{Deserialize, Serialize};

/// Sample rates probed against each device's supported ranges.
const COMMON_SAMPLE_RATES: [u32; 10] = [
    8_000, 11_025, 16_000, 22_050, 32_000, 44_100, 48_000, 88_200, 96_000, 192_000,
];

/// A snapshot of one audio device.
///
/// `index` is the device's position in the current enumeration order. It is
/// NOT a stable hardware identifier: unplugging and replugging devices in a
/// different order is indistinguishable from a genuine device swap. Callers
/// must re-enumerate rather than hold onto indices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioDeviceInfo {
    pub index: usize,
    pub name: String,
    pub sample_rates: Vec<u32>,
    pub default_sample_rate: u32,
    pub input_channels: u16,
    pub output_channels: u16,
}

/// Enumerate all audio devices visible through the default cpal host.
pub fn list_audio_devices() -> Result<Vec<AudioDeviceInfo>, String> {
    let host = cpal::default_host();
    let devices = host
        .devices()
        .map_err(|e| format!("Failed to enumerate devices: {}", e))?;

    let mut result = Vec::new();
    for (index, device) in devices.enumerate() {
        result.push(describe_device(index, &device));
    }

    Ok(result)
}

/// Build a snapshot for a single cpal device.
///
/// Devices that refuse to report a config for a direction are treated as
/// having zero channels in that direction rather than failing the whole
/// enumeration.
fn describe_device(index: usize, device: &cpal::Device) -> AudioDeviceInfo {
    let name = device
        .name()
        .unwrap_or_else(|_| format!("Unknown Device {}", index));

    let output_config = device.default_output_config().ok();
    let input_config = device.default_input_config().ok();

    let output_channels = output_config.as_ref().map(|c| c.channels()).unwrap_or(0);
    let input_channels = input_config.as_ref().map(|c| c.channels()).unwrap_or(0);

    // Prefer the output side for the default rate; input-only devices fall
    // back to their input config.
    let default_sample_rate = output_config
        .as_ref()
        .or(input_config.as_ref())
        .map(|c| c.sample_rate().0)
        .unwrap_or(0);

    AudioDeviceInfo {
        index,
        name,
        sample_rates: supported_sample_rates(device),
        default_sample_rate,
        input_channels,
        output_channels,
    }
}

/// Collect the common sample rates that fall inside any of the device's
/// supported config ranges, output side first, input side as fallback.
fn supported_sample_rates(device: &cpal::Device) -> Vec<u32> {
    let mut ranges: Vec<(u32, u32)> = Vec::new();

    if let Ok(configs) = device.supported_output_configs() {
        for config in configs {
            ranges.push((config.min_sample_rate().0, config.max_sample_rate().0));
        }
    }
    if ranges.is_empty() {
        if let Ok(configs) = device.supported_input_configs() {
            for config in configs {
                ranges.push((config.min_sample_rate().0, config.max_sample_rate().0));
            }
        }
    }

    COMMON_SAMPLE_RATES
        .iter()
        .copied()
        .filter(|rate| ranges.iter().any(|(min, max)| rate >= min && rate <= max))
        .collect()
}
