//! PlayerSession: replays a macro file through a virtual input device.
//!
//! Playback creates one virtual device with the full [`CapabilitySet`], waits
//! a short settle delay so listeners can attach to it, and then streams the
//! file record by record: sleep `delay`, emit the event.  With looping
//! enabled the file is reopened and replayed until the session is stopped.
//!
//! The virtual device is destroyed exactly once on every exit path, including
//! errors and panics, by [`SinkGuard`].

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use keymacro_core::{CapabilitySet, DeviceIdentity, MacroReader};
use tracing::{debug, info, warn};

use super::error::MacroError;
use super::session::CancelToken;
use crate::infrastructure::input_device::{DeviceError, InputPlatform, VirtualSink};

/// Tunables for a playback session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSettings {
    /// Pause between creating the virtual device and the first event.
    pub settle_delay: Duration,
    pub identity: DeviceIdentity,
    pub capabilities: CapabilitySet,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(100),
            identity: DeviceIdentity::default(),
            capabilities: CapabilitySet::full(),
        }
    }
}

/// Outcome of a playback that ended without error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackSummary {
    /// Passes played through to the end of the file.
    pub passes: u64,
    pub events: u64,
}

/// Destroys the wrapped sink when dropped, unless already destroyed.
struct SinkGuard {
    sink: Box<dyn VirtualSink>,
    destroyed: bool,
}

impl SinkGuard {
    fn new(sink: Box<dyn VirtualSink>) -> Self {
        Self {
            sink,
            destroyed: false,
        }
    }

    fn emit(&mut self, event: keymacro_core::RawEvent) -> Result<(), DeviceError> {
        self.sink.emit(event)
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        if let Err(e) = self.sink.destroy() {
            warn!("failed to destroy virtual device: {e}");
        }
    }
}

impl Drop for SinkGuard {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// How one pass over the file ended.
struct PassOutcome {
    emitted: u64,
    completed: bool,
}

/// One playback run, from device creation to device destruction.
pub struct PlayerSession {
    platform: Arc<dyn InputPlatform>,
    path: PathBuf,
    looping: bool,
    settings: PlayerSettings,
}

impl PlayerSession {
    pub fn new(
        platform: Arc<dyn InputPlatform>,
        path: PathBuf,
        looping: bool,
        settings: PlayerSettings,
    ) -> Self {
        Self {
            platform,
            path,
            looping,
            settings,
        }
    }

    /// Plays until the file ends (or forever when looping) unless `cancel`
    /// is set first.
    ///
    /// # Errors
    ///
    /// - [`MacroError::CapabilityUnavailable`] on platforms without uinput.
    /// - [`MacroError::DeviceCreateFailed`] when the virtual device cannot be created.
    /// - [`MacroError::InputUnavailable`] when the file cannot be opened.
    /// - [`MacroError::InputRead`] / [`MacroError::EmitFailed`] mid-run.
    pub fn run(self, cancel: &CancelToken) -> Result<PlaybackSummary, MacroError> {
        let sink = self
            .platform
            .create_sink(&self.settings.identity, &self.settings.capabilities)
            .map_err(|e| match e {
                DeviceError::CapabilityUnavailable(reason) => {
                    MacroError::CapabilityUnavailable(reason)
                }
                other => MacroError::DeviceCreateFailed(other),
            })?;
        let mut sink = SinkGuard::new(sink);
        info!(
            path = %self.path.display(),
            device = %self.settings.identity.name,
            looping = self.looping,
            "playback started"
        );

        let mut summary = PlaybackSummary::default();
        if cancel.sleep(self.settings.settle_delay) {
            loop {
                let pass = self.play_pass(&mut sink, cancel)?;
                summary.events += pass.emitted;
                if pass.completed {
                    summary.passes += 1;
                }
                if !self.looping || cancel.is_cancelled() {
                    break;
                }
                if pass.emitted == 0 {
                    warn!(path = %self.path.display(), "macro file has no playable records; stopping loop");
                    break;
                }
            }
        }

        sink.destroy();
        info!(passes = summary.passes, events = summary.events, "playback finished");
        Ok(summary)
    }

    fn play_pass(&self, sink: &mut SinkGuard, cancel: &CancelToken) -> Result<PassOutcome, MacroError> {
        let file = File::open(&self.path).map_err(|source| MacroError::InputUnavailable {
            path: self.path.clone(),
            source,
        })?;
        let mut reader = MacroReader::new(BufReader::new(file));
        let mut emitted = 0;

        for item in &mut reader {
            let record = item.map_err(|source| MacroError::InputRead {
                path: self.path.clone(),
                source,
            })?;
            if record.delay_ms > 0 && !cancel.sleep(record.delay()) {
                return Ok(PassOutcome {
                    emitted,
                    completed: false,
                });
            }
            if cancel.is_cancelled() {
                return Ok(PassOutcome {
                    emitted,
                    completed: false,
                });
            }
            sink.emit(record.event).map_err(MacroError::EmitFailed)?;
            emitted += 1;
        }

        if reader.skipped() > 0 {
            debug!(skipped = reader.skipped(), "skipped unreadable macro lines");
        }
        Ok(PassOutcome {
            emitted,
            completed: true,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
