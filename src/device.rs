//! # Device Selection
//!
//! Picks the compute device for Whisper inference from the configured
//! preference. A GPU that cannot be opened always falls back to the CPU, so a
//! default `cuda` setting still starts on a machine without one.

use candle_core::Device;
use tracing::{debug, info, warn};

/// Device preferences for model inference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePreference {
    /// Try CUDA, then Metal, then CPU
    #[default]
    Auto,
    Cpu,
    /// CUDA GPU, CPU if unavailable
    Cuda,
    /// Metal GPU, CPU if unavailable
    Metal,
}

impl std::str::FromStr for DevicePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" | "automatic" => Ok(DevicePreference::Auto),
            "cpu" => Ok(DevicePreference::Cpu),
            "cuda" | "gpu" => Ok(DevicePreference::Cuda),
            "metal" | "mps" => Ok(DevicePreference::Metal),
            _ => Err(format!("Unknown device preference: {}", s)),
        }
    }
}

/// Resolve a configured device string to a usable device.
pub fn resolve_device(preference: &str) -> Device {
    let preference = preference.parse::<DevicePreference>().unwrap_or_else(|e| {
        warn!("{}, using auto", e);
        DevicePreference::Auto
    });

    let device = match preference {
        DevicePreference::Cpu => Device::Cpu,
        DevicePreference::Cuda => cuda_device().unwrap_or(Device::Cpu),
        DevicePreference::Metal => metal_device().unwrap_or(Device::Cpu),
        DevicePreference::Auto => cuda_device().or_else(metal_device).unwrap_or(Device::Cpu),
    };

    info!(?preference, device = device_label(&device), "Selected compute device");
    device
}

fn cuda_device() -> Option<Device> {
    match Device::new_cuda(0) {
        Ok(device) => Some(device),
        Err(e) => {
            debug!("CUDA not available: {}", e);
            None
        }
    }
}

fn metal_device() -> Option<Device> {
    match Device::new_metal(0) {
        Ok(device) => Some(device),
        Err(e) => {
            debug!("Metal not available: {}", e);
            None
        }
    }
}

/// Short device name for health output and logs.
pub fn device_label(device: &Device) -> &'static str {
    match device {
        Device::Cpu => "cpu",
        Device::Cuda(_) => "cuda",
        Device::Metal(_) => "metal",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_preference_parsing() {
        assert_eq!("auto".parse::<DevicePreference>().unwrap(), DevicePreference::Auto);
        assert_eq!("CPU".parse::<DevicePreference>().unwrap(), DevicePreference::Cpu);
        assert_eq!("gpu".parse::<DevicePreference>().unwrap(), DevicePreference::Cuda);
        assert_eq!("metal".parse::<DevicePreference>().unwrap(), DevicePreference::Metal);
        assert!("tpu".parse::<DevicePreference>().is_err());
    }

    #[test]
    fn test_cpu_is_always_available() {
        let device = resolve_device("cpu");
        assert!(matches!(device, Device::Cpu));
        assert_eq!(device_label(&device), "cpu");
    }

    #[test]
    fn test_unknown_preference_still_resolves() {
        let device = resolve_device("quantum");
        assert!(!device_label(&device).is_empty());
    }
}
