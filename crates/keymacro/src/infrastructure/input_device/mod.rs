//! Raw input device boundary.
//!
//! Recording reads from every physical input device the process can open;
//! playback writes into one virtual device that it creates and destroys.  Both
//! sides are OS-specific, so the application layer only sees the three traits
//! defined here:
//!
//! - [`InputPlatform`] – enumerates/opens sources and creates sinks.
//! - [`DeviceSource`] – one readable device opened in non-blocking mode.
//! - [`VirtualSink`] – one writable virtual device with a fixed capability set.
//!
//! # Platform selection
//!
//! The Linux evdev/uinput adapter is selected at compile time via
//! `#[cfg(target_os = "linux")]`.  Every other target gets the
//! [`unsupported::UnsupportedPlatform`], which reports
//! [`DeviceError::CapabilityUnavailable`] instead of silently doing nothing.
//!
//! # Testability
//!
//! The [`mock`] module provides scripted sources and an in-memory sink so the
//! recorder, player, and manager can be tested without `/dev/input` access.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use keymacro_core::{CapabilitySet, DeviceIdentity, RawEvent};
use thiserror::Error;

pub mod mock;
pub mod unsupported;

#[cfg(target_os = "linux")]
pub mod linux;

/// Error type for device operations.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// A device node could not be opened (permission, missing, busy).
    #[error("device {path} unavailable: {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The device directory could not be listed.
    #[error("cannot enumerate devices in {dir}: {source}")]
    Enumerate {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The virtual device could not be registered.
    #[error("virtual device creation failed: {0}")]
    CreateFailed(#[source] std::io::Error),
    /// A device disappeared while in use.
    #[error("device {device} was lost")]
    Lost { device: String },
    /// Any other I/O failure on an open device.
    #[error("device I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// This platform has no raw input device boundary.
    #[error("input device capability unavailable: {0}")]
    CapabilityUnavailable(String),
}

/// One readable raw input device.
///
/// Dropping a source closes its handle.
pub trait DeviceSource: Send {
    /// Identifies the device in logs and error reports.
    fn name(&self) -> &str;

    /// Waits up to `timeout` for data; returns `true` when an event can be read.
    fn poll(&mut self, timeout: Duration) -> Result<bool, DeviceError>;

    /// Reads exactly one event.
    ///
    /// Returns `Ok(None)` when no complete event is available right now; a
    /// partial read is reported the same way, never as corruption.
    fn read_event(&mut self) -> Result<Option<RawEvent>, DeviceError>;
}

/// One writable virtual input device.
pub trait VirtualSink: Send {
    /// Writes one event.  Call order is the wire order seen by listeners.
    fn emit(&mut self, event: RawEvent) -> Result<(), DeviceError>;

    /// Unregisters the device from the OS.
    fn destroy(&mut self) -> Result<(), DeviceError>;
}

/// The OS capability the recorder and player are built on.
#[cfg_attr(test, mockall::automock)]
pub trait InputPlatform: Send + Sync {
    /// Opens every currently present readable input device.
    ///
    /// Devices that cannot be opened are skipped; the result may be empty.
    fn open_sources(&self) -> Result<Vec<Box<dyn DeviceSource>>, DeviceError>;

    /// Creates a virtual device that may emit exactly `capabilities`.
    fn create_sink(
        &self,
        identity: &DeviceIdentity,
        capabilities: &CapabilitySet,
    ) -> Result<Box<dyn VirtualSink>, DeviceError>;
}

/// Where the platform adapter finds its device nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformConfig {
    /// Directory holding the raw input device nodes.
    pub device_dir: PathBuf,
    /// File-name prefix of the nodes to open inside `device_dir`.
    pub device_prefix: String,
    /// The virtual-device creation node.
    pub uinput_path: PathBuf,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            device_dir: PathBuf::from("/dev/input"),
            device_prefix: "event".to_string(),
            uinput_path: PathBuf::from("/dev/uinput"),
        }
    }
}

/// Returns the platform adapter for the compile target.
#[cfg(target_os = "linux")]
pub fn default_platform(config: PlatformConfig) -> Arc<dyn InputPlatform> {
    Arc::new(linux::LinuxInputPlatform::new(config))
}

/// Returns the platform adapter for the compile target.
#[cfg(not(target_os = "linux"))]
pub fn default_platform(_config: PlatformConfig) -> Arc<dyn InputPlatform> {
    Arc::new(unsupported::UnsupportedPlatform)
}
