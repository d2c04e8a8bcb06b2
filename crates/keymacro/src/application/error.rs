//! Failures reported by recording and playback workers.
//!
//! Workers never return errors to the caller of `start_*`; the call has
//! already returned by the time anything goes wrong.  Instead each failure is
//! wrapped in a [`MacroFailure`] and sent on the manager's failure channel.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use super::session::SessionRole;
use crate::infrastructure::input_device::DeviceError;

/// Everything that can end a session early.
#[derive(Debug, Error)]
pub enum MacroError {
    /// Recording found no input device it could open.
    #[error("no input devices available")]
    NoDevicesAvailable,

    /// The macro file could not be created for recording.
    #[error("cannot open {path} for writing: {source}")]
    OutputUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The virtual device for playback could not be created.
    #[error("cannot create virtual input device: {0}")]
    DeviceCreateFailed(#[source] DeviceError),

    /// The macro file could not be opened for playback.
    #[error("cannot open {path} for reading: {source}")]
    InputUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// This platform cannot capture or inject raw input.
    #[error("{0}")]
    CapabilityUnavailable(String),

    /// An input device disappeared during recording.
    #[error("input device {device} was lost")]
    DeviceLost { device: String },

    /// Appending to the macro file failed during recording.
    #[error("write to {path} failed: {source}")]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading the macro file failed during playback.
    #[error("read from {path} failed: {source}")]
    InputRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The virtual device rejected an event during playback.
    #[error("virtual device write failed: {0}")]
    EmitFailed(#[source] DeviceError),

    /// The worker thread could not be started.
    #[error("cannot start worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}

/// A failure as delivered on the manager's channel.
#[derive(Debug)]
pub struct MacroFailure {
    pub role: SessionRole,
    pub session_id: Uuid,
    pub error: MacroError,
}

impl fmt::Display for MacroFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.role, self.error)
    }
}

impl std::error::Error for MacroFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
