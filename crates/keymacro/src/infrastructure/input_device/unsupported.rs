//! Fallback adapter for targets without a raw input device boundary.
//!
//! Recording and playback are gated to Linux.  On every other OS this adapter
//! makes both operations fail loudly with
//! [`DeviceError::CapabilityUnavailable`], which the manager forwards to the
//! failure channel.

use keymacro_core::{CapabilitySet, DeviceIdentity};

use super::{DeviceError, DeviceSource, InputPlatform, VirtualSink};

/// Platform adapter that supports nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedPlatform;

impl UnsupportedPlatform {
    fn reason() -> String {
        format!(
            "raw input capture and virtual devices are not available on {}",
            std::env::consts::OS
        )
    }
}

impl InputPlatform for UnsupportedPlatform {
    fn open_sources(&self) -> Result<Vec<Box<dyn DeviceSource>>, DeviceError> {
        Err(DeviceError::CapabilityUnavailable(Self::reason()))
    }

    fn create_sink(
        &self,
        _identity: &DeviceIdentity,
        _capabilities: &CapabilitySet,
    ) -> Result<Box<dyn VirtualSink>, DeviceError> {
        Err(DeviceError::CapabilityUnavailable(Self::reason()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_sources_reports_capability_unavailable() {
        let result = UnsupportedPlatform.open_sources();
        assert!(matches!(result, Err(DeviceError::CapabilityUnavailable(_))));
    }

    #[test]
    fn test_create_sink_reports_capability_unavailable_with_os_name() {
        // Act
        let result = UnsupportedPlatform.create_sink(&DeviceIdentity::default(), &CapabilitySet::full());

        // Assert
        match result {
            Err(DeviceError::CapabilityUnavailable(reason)) => {
                assert!(reason.contains(std::env::consts::OS));
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("unsupported platform must not create sinks"),
        }
    }
}
