//! The capability set and identity a virtual input device registers.
//!
//! The kernel's uinput model requires every category and code a virtual
//! device will ever emit to be declared *before* the device is created.
//! Capabilities cannot be added afterwards, so the player registers the
//! full union up front: every key code, the relative axes a mouse uses,
//! every absolute axis, and synchronization.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use super::event::categories;

/// Maximum length of a virtual device name, excluding the NUL terminator.
pub const MAX_DEVICE_NAME_LEN: usize = 79;

/// Bus type reported for the virtual device (`BUS_USB`).
pub const BUS_USB: u16 = 0x03;

/// The categories and codes a virtual device is permitted to emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    /// Key and button codes.
    pub keys: Range<u16>,
    /// Relative axis codes.
    pub relative_axes: Vec<u16>,
    /// Absolute axis codes.
    pub absolute_axes: Range<u16>,
    /// Whether synchronization markers are declared.
    pub synchronization: bool,
}

impl CapabilitySet {
    /// The full set used for macro playback.
    pub fn full() -> Self {
        Self {
            keys: 0..categories::KEY_COUNT,
            relative_axes: vec![categories::REL_X, categories::REL_Y, categories::REL_WHEEL],
            absolute_axes: 0..categories::ABS_MAX,
            synchronization: true,
        }
    }

    /// Event categories that must be enabled, in registration order.
    pub fn categories(&self) -> Vec<u16> {
        let mut out = Vec::with_capacity(4);
        if !self.keys.is_empty() {
            out.push(categories::KEY);
        }
        if !self.relative_axes.is_empty() {
            out.push(categories::REL);
        }
        if !self.absolute_axes.is_empty() {
            out.push(categories::ABS);
        }
        if self.synchronization {
            out.push(categories::SYN);
        }
        out
    }
}

impl Default for CapabilitySet {
    fn default() -> Self {
        Self::full()
    }
}

/// How the virtual device identifies itself to the OS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Human-readable device name.
    pub name: String,
    /// Bus type (see [`BUS_USB`]).
    pub bus_type: u16,
    /// Vendor identifier.
    pub vendor: u16,
    /// Product identifier.
    pub product: u16,
    /// Device version.
    pub version: u16,
}

impl DeviceIdentity {
    /// The device name truncated to [`MAX_DEVICE_NAME_LEN`] bytes on a
    /// character boundary.
    pub fn truncated_name(&self) -> &str {
        if self.name.len() <= MAX_DEVICE_NAME_LEN {
            return &self.name;
        }
        let mut end = MAX_DEVICE_NAME_LEN;
        while !self.name.is_char_boundary(end) {
            end -= 1;
        }
        &self.name[..end]
    }
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self {
            name: "Virtual POS Device".to_string(),
            bus_type: BUS_USB,
            vendor: 0x1234,
            product: 0x5678,
            version: 1,
        }
    }
}
