use cpal::{
    Device,
    traits::{DeviceTrait, HostTrait},
};

use crate::errors::CaptureError;

pub fn get_default_input_device() -> Result<Device, CaptureError> {
    let host = cpal::default_host();
    match host.default_input_device() {
        Some(device) => Ok(device),
        None => {
            tracing::error!("Failed to get default input device");
            Err(CaptureError::NoInputDevice)
        }
    }
}

/// Looks up an input device by the name `list_input_devices` reports.
pub fn find_input_device(name: &str) -> Result<Device, CaptureError> {
    let host = cpal::default_host();
    let devices = match host.input_devices() {
        Ok(devices) => devices,
        Err(e) => {
            tracing::error!("Failed to enumerate input devices: {}", e);
            return Err(CaptureError::DeviceUnavailable(e.to_string()));
        }
    };

    for device in devices {
        if device.name().is_ok_and(|device_name| device_name == name) {
            return Ok(device);
        }
    }

    tracing::error!("No input device named '{}'", name);
    Err(CaptureError::DeviceNotFound(name.to_string()))
}

pub fn list_input_devices() -> Vec<String> {
    let host = cpal::default_host();
    match host.input_devices() {
        Ok(devices) => devices.filter_map(|device| device.name().ok()).collect(),
        Err(e) => {
            tracing::warn!("Failed to enumerate input devices: {}", e);
            Vec::new()
        }
    }
}
