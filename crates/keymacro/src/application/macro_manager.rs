//! MacroManager: the public façade over recording and playback.
//!
//! # Lifecycle (for beginners)
//!
//! The manager owns one *slot* per role.  A slot is either empty or holds the
//! [`SessionHandle`] of a worker thread:
//!
//! ```text
//!   start_recording ──► [slot empty?] ──yes──► spawn worker ──► slot = handle
//!                            │
//!                            no ──► worker still running? ──yes──► no-op
//!                                          │
//!                                          no ──► join it, then spawn a new one
//!
//!   stop_recording ──► take handle ──► cancel + unpark ──► join ──► return
//! ```
//!
//! The `start_*` calls return at once.  Whatever goes wrong afterwards
//! arrives as a [`MacroFailure`] on the receiver returned by
//! [`MacroManager::new`].

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info};
use uuid::Uuid;

use super::error::{MacroError, MacroFailure};
use super::play_macro::{PlayerSession, PlayerSettings};
use super::record_macro::{RecorderSession, RecorderSettings};
use super::session::{CancelToken, SessionHandle, SessionRole};
use crate::infrastructure::input_device::InputPlatform;

/// Settings for both roles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MacroSettings {
    pub recorder: RecorderSettings,
    pub player: PlayerSettings,
}

type Slot = Mutex<Option<SessionHandle>>;

/// Owns at most one recording and one playback session.
pub struct MacroManager {
    platform: Arc<dyn InputPlatform>,
    settings: MacroSettings,
    failures: UnboundedSender<MacroFailure>,
    recorder: Slot,
    player: Slot,
}

impl MacroManager {
    /// Creates an idle manager and the receiving end of its failure channel.
    pub fn new(
        platform: Arc<dyn InputPlatform>,
        settings: MacroSettings,
    ) -> (Self, UnboundedReceiver<MacroFailure>) {
        let (failures, rx) = mpsc::unbounded_channel();
        let manager = Self {
            platform,
            settings,
            failures,
            recorder: Mutex::new(None),
            player: Mutex::new(None),
        };
        (manager, rx)
    }

    /// Starts recording every input device into `path`.  No-op while a
    /// recording is already running.
    pub fn start_recording(&self, path: impl Into<PathBuf>) {
        let session =
            RecorderSession::new(Arc::clone(&self.platform), path.into(), self.settings.recorder.clone());
        self.start(SessionRole::Recording, &self.recorder, move |token| {
            session.run(token).map(|summary| {
                debug!(records = summary.records, devices = summary.devices, "recorder worker done");
            })
        });
    }

    /// Stops the recording and waits until every device and the file are closed.
    pub fn stop_recording(&self) {
        self.stop(SessionRole::Recording, &self.recorder);
    }

    /// Starts replaying `path`; with `looping` the file repeats until stopped.
    /// No-op while a playback is already running.
    pub fn start_playing(&self, path: impl Into<PathBuf>, looping: bool) {
        let session = PlayerSession::new(
            Arc::clone(&self.platform),
            path.into(),
            looping,
            self.settings.player.clone(),
        );
        self.start(SessionRole::Playing, &self.player, move |token| {
            session.run(token).map(|summary| {
                debug!(passes = summary.passes, events = summary.events, "player worker done");
            })
        });
    }

    /// Stops playback and waits until the virtual device is destroyed.
    pub fn stop_playing(&self) {
        self.stop(SessionRole::Playing, &self.player);
    }

    pub fn is_recording(&self) -> bool {
        Self::is_active(&self.recorder)
    }

    pub fn is_playing(&self) -> bool {
        Self::is_active(&self.player)
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn lock(slot: &Slot) -> MutexGuard<'_, Option<SessionHandle>> {
        slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_active(slot: &Slot) -> bool {
        Self::lock(slot).as_ref().is_some_and(|handle| !handle.is_finished())
    }

    fn start<F>(&self, role: SessionRole, slot: &Slot, body: F)
    where
        F: FnOnce(&CancelToken) -> Result<(), MacroError> + Send + 'static,
    {
        let mut guard = Self::lock(slot);
        if let Some(handle) = guard.as_ref() {
            if !handle.is_finished() {
                debug!(session = %handle.id(), "{role} already active; start ignored");
                return;
            }
        }
        if let Some(finished) = guard.take() {
            finished.join();
        }

        let session_id = Uuid::new_v4();
        let failures = self.failures.clone();
        let spawned = SessionHandle::spawn(role, session_id, move |token| {
            if let Err(error) = body(&token) {
                error!(session = %session_id, "{role} failed: {error}");
                let _ = failures.send(MacroFailure {
                    role,
                    session_id,
                    error,
                });
            }
        });

        match spawned {
            Ok(handle) => {
                info!(session = %session_id, "{role} session started");
                *guard = Some(handle);
            }
            Err(e) => {
                let failure = MacroFailure {
                    role,
                    session_id,
                    error: MacroError::WorkerSpawn(e),
                };
                error!(session = %session_id, "{failure}");
                let _ = self.failures.send(failure);
            }
        }
    }

    fn stop(&self, role: SessionRole, slot: &Slot) {
        // The lock is held until the worker is joined, so a concurrent start
        // cannot overlap the old session.
        let mut guard = Self::lock(slot);
        match guard.take() {
            Some(handle) => {
                let id = handle.id();
                handle.stop();
                info!(session = %id, "{role} session stopped");
            }
            None => debug!("{role} not active; stop ignored"),
        }
    }
}

impl Drop for MacroManager {
    fn drop(&mut self) {
        self.stop(SessionRole::Recording, &self.recorder);
        self.stop(SessionRole::Playing, &self.player);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
