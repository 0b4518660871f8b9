//! Input device enumeration through the cpal default host.

use cpal::traits::{DeviceTrait, HostTrait};

use multichannel_capture_core::models::audio_models::DeviceInfo;
use multichannel_capture_core::models::config::DeviceSelector;
use multichannel_capture_core::models::error::CaptureError;

/// Lists and resolves input devices on one cpal host.
pub struct DeviceEnumerator {
    host: cpal::Host,
}

impl Default for DeviceEnumerator {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceEnumerator {
    /// Enumerator for the platform's default host (ALSA, CoreAudio, WASAPI).
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    pub fn host_name(&self) -> &'static str {
        self.host.id().name()
    }

    /// All input devices, in host order.
    pub fn list_input_devices(&self) -> Result<Vec<DeviceInfo>, CaptureError> {
        let default_name = self.default_device_name();
        let devices = self
            .host
            .input_devices()
            .map_err(|e| CaptureError::Device(format!("failed to list input devices: {}", e)))?;

        Ok(devices
            .enumerate()
            .map(|(index, device)| self.describe(index, &device, default_name.as_deref()))
            .collect())
    }

    /// Find the device `selector` names.
    pub fn resolve(&self, selector: &DeviceSelector) -> Result<(cpal::Device, DeviceInfo), CaptureError> {
        let default_name = self.default_device_name();

        if *selector == DeviceSelector::Default {
            let device = self
                .host
                .default_input_device()
                .ok_or(CaptureError::DeviceNotAvailable)?;
            let index = self.position_of(&device).unwrap_or(0);
            let info = self.describe(index, &device, default_name.as_deref());
            return Ok((device, info));
        }

        let devices = self
            .host
            .input_devices()
            .map_err(|e| CaptureError::Device(format!("failed to list input devices: {}", e)))?;

        for (index, device) in devices.enumerate() {
            let matches = match selector {
                DeviceSelector::Index(wanted) => index == *wanted,
                DeviceSelector::Name(wanted) => device.name().map(|n| n == *wanted).unwrap_or(false),
                DeviceSelector::Default => false,
            };
            if matches {
                let info = self.describe(index, &device, default_name.as_deref());
                return Ok((device, info));
            }
        }

        log::warn!("No input device matches {}", selector);
        Err(CaptureError::DeviceNotAvailable)
    }

    fn default_device_name(&self) -> Option<String> {
        self.host.default_input_device().and_then(|d| d.name().ok())
    }

    fn position_of(&self, device: &cpal::Device) -> Option<usize> {
        let name = device.name().ok()?;
        self.host
            .input_devices()
            .ok()?
            .position(|d| d.name().map(|n| n == name).unwrap_or(false))
    }

    fn describe(&self, index: usize, device: &cpal::Device, default_name: Option<&str>) -> DeviceInfo {
        let name = device.name().unwrap_or_else(|_| "unknown".to_string());
        DeviceInfo {
            id: format!("{}:{}", self.host_name(), index),
            is_default: default_name == Some(name.as_str()),
            max_input_channels: max_input_channels(device),
            name,
        }
    }
}

/// Largest channel count across the device's input configurations.
pub fn max_input_channels(device: &cpal::Device) -> Option<u16> {
    device
        .supported_input_configs()
        .ok()?
        .map(|config| config.channels())
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore = "requires audio hardware"]
    fn lists_input_devices() {
        let enumerator = DeviceEnumerator::new();
        let devices = enumerator.list_input_devices().unwrap();
        for device in &devices {
            println!("{} {} (default: {})", device.id, device.name, device.is_default);
        }
        assert!(devices.iter().filter(|d| d.is_default).count() <= 1);
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn resolves_default_device() {
        let enumerator = DeviceEnumerator::new();
        let (_, info) = enumerator.resolve(&DeviceSelector::Default).unwrap();
        assert!(info.is_default);
    }

    #[test]
    fn unknown_name_is_not_available() {
        let enumerator = DeviceEnumerator::new();
        let selector = DeviceSelector::Name("no such device \u{1F3A4}".into());
        assert!(matches!(
            enumerator.resolve(&selector),
            Err(CaptureError::DeviceNotAvailable) | Err(CaptureError::Device(_))
        ));
    }
}
