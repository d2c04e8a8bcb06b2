//! RecorderSession: captures raw events from every input device into a macro file.
//!
//! # Multiplexing
//!
//! Each opened device gets its own reader thread.  A reader polls its device
//! with a short timeout, drains every complete event, and sends it, stamped
//! with the [`Instant`] it was read, into one shared bounded channel.  The
//! session loop receives from that channel, turns each timestamp into a
//! delay, and appends a record to the file.
//!
//! ```text
//!  kbd ──reader──┐
//!  mouse ─reader─┼──► sync_channel ──► session loop ──► MacroWriter ──► macro.txt
//!  pad ──reader──┘
//! ```
//!
//! Per-device order is preserved.  Across devices, order is arrival order at
//! the channel, which matches wall-clock order to within a poll interval.
//!
//! # Stopping
//!
//! A full channel blocks the readers, so a slow file throttles the devices
//! instead of growing memory.  On stop the readers quit reading, and the
//! session keeps receiving until every reader has exited.  Every event a
//! reader took off its device therefore reaches the file.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use keymacro_core::{DelayTracker, EventRecord, MacroWriter, RawEvent};
use tracing::{debug, info, warn};

use super::error::MacroError;
use super::session::CancelToken;
use crate::infrastructure::input_device::{DeviceError, DeviceSource, InputPlatform};

/// Events the readers may queue ahead of the session loop.
const READER_QUEUE_CAPACITY: usize = 1024;

/// Tunables for a recording session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecorderSettings {
    /// How long a reader or the session loop blocks before re-checking for a
    /// stop request.
    pub poll_interval: Duration,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
        }
    }
}

/// Outcome of a recording that ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingSummary {
    pub records: u64,
    pub devices: usize,
}

/// What a reader thread sends to the session loop.
#[derive(Debug)]
enum SourceMessage {
    Event { at: Instant, event: RawEvent },
    Lost { device: String },
}

/// One recording run, from device enumeration to the closed file.
pub struct RecorderSession {
    platform: Arc<dyn InputPlatform>,
    path: PathBuf,
    settings: RecorderSettings,
}

impl RecorderSession {
    pub fn new(platform: Arc<dyn InputPlatform>, path: PathBuf, settings: RecorderSettings) -> Self {
        Self {
            platform,
            path,
            settings,
        }
    }

    /// Records until `cancel` is set or an error occurs.
    ///
    /// # Errors
    ///
    /// - [`MacroError::CapabilityUnavailable`] on platforms without raw input.
    /// - [`MacroError::NoDevicesAvailable`] when nothing could be opened; no
    ///   file is created in that case.
    /// - [`MacroError::OutputUnavailable`] when the file cannot be created.
    /// - [`MacroError::DeviceLost`] / [`MacroError::OutputWrite`] mid-run.
    pub fn run(self, cancel: &CancelToken) -> Result<RecordingSummary, MacroError> {
        let sources = match self.platform.open_sources() {
            Ok(sources) if !sources.is_empty() => sources,
            Ok(_) => return Err(MacroError::NoDevicesAvailable),
            Err(DeviceError::CapabilityUnavailable(reason)) => {
                return Err(MacroError::CapabilityUnavailable(reason))
            }
            Err(e) => {
                warn!("input device enumeration failed: {e}");
                return Err(MacroError::NoDevicesAvailable);
            }
        };
        let devices = sources.len();

        // Sources are dropped (and closed) on the early return.
        let file = File::create(&self.path).map_err(|source| MacroError::OutputUnavailable {
            path: self.path.clone(),
            source,
        })?;
        let mut writer = MacroWriter::new(BufWriter::new(file));

        let pool =
            ReaderPool::start(sources, READER_QUEUE_CAPACITY, self.settings.poll_interval)
                .map_err(MacroError::WorkerSpawn)?;
        info!(path = %self.path.display(), devices, "recording started");

        let clock = Instant::now();
        let mut tracker = DelayTracker::new();
        let mut outcome = self.capture(&pool, &mut writer, &mut tracker, clock, cancel);

        // Events already read from a device are kept unless the file itself failed.
        let mut writable = !matches!(outcome, Err(MacroError::OutputWrite { .. }));
        let mut drained = 0u64;
        for message in pool.shutdown() {
            match message {
                SourceMessage::Event { at, event } if writable => {
                    match self.append(&mut writer, &mut tracker, clock, at, event) {
                        Ok(()) => drained += 1,
                        Err(e) => {
                            writable = false;
                            if outcome.is_ok() {
                                outcome = Err(e);
                            }
                        }
                    }
                }
                SourceMessage::Event { .. } => {}
                SourceMessage::Lost { device } => {
                    debug!(device = %device, "device lost while stopping");
                }
            }
        }
        if drained > 0 {
            debug!(drained, "recorded events queued before stop");
        }

        // Readers release their devices before the file is closed.
        drop(pool);
        let records = writer.records_written();
        let closed = writer.finish().map_err(|source| MacroError::OutputWrite {
            path: self.path.clone(),
            source,
        });

        outcome?;
        closed?;
        info!(path = %self.path.display(), records, "recording finished");
        Ok(RecordingSummary { records, devices })
    }

    fn capture(
        &self,
        pool: &ReaderPool,
        writer: &mut MacroWriter<BufWriter<File>>,
        tracker: &mut DelayTracker,
        clock: Instant,
        cancel: &CancelToken,
    ) -> Result<(), MacroError> {
        while !cancel.is_cancelled() {
            match pool.recv_timeout(self.settings.poll_interval) {
                Ok(SourceMessage::Event { at, event }) => {
                    self.append(writer, tracker, clock, at, event)?;
                }
                Ok(SourceMessage::Lost { device }) => return Err(MacroError::DeviceLost { device }),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("every reader exited");
                    break;
                }
            }
        }
        Ok(())
    }

    fn append(
        &self,
        writer: &mut MacroWriter<BufWriter<File>>,
        tracker: &mut DelayTracker,
        clock: Instant,
        at: Instant,
        event: RawEvent,
    ) -> Result<(), MacroError> {
        let delay = tracker.next_delay(at.saturating_duration_since(clock));
        writer
            .append(&EventRecord::new(delay, event))
            .map_err(|source| MacroError::OutputWrite {
                path: self.path.clone(),
                source,
            })
    }
}

// ── Reader threads ────────────────────────────────────────────────────────────

/// The per-device reader threads of one session and the channel they feed.
///
/// Dropping the pool stops the readers, drops the receiver so that a reader
/// blocked on a full channel wakes up, and joins every reader.  Every device
/// is closed once the pool is gone.
struct ReaderPool {
    stop: CancelToken,
    readers: Vec<JoinHandle<()>>,
    messages: Option<Receiver<SourceMessage>>,
}

impl ReaderPool {
    fn start(
        sources: Vec<Box<dyn DeviceSource>>,
        capacity: usize,
        poll_interval: Duration,
    ) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::sync_channel(capacity);
        let mut pool = Self {
            stop: CancelToken::new(),
            readers: Vec::with_capacity(sources.len()),
            messages: Some(rx),
        };
        for (index, source) in sources.into_iter().enumerate() {
            let tx = tx.clone();
            let stop = pool.stop.clone();
            // On error the readers started so far are joined by Drop.
            let reader = thread::Builder::new()
                .name(format!("keymacro-src-{index}"))
                .spawn(move || read_source(source, &tx, &stop, poll_interval))?;
            pool.readers.push(reader);
        }
        Ok(pool)
    }

    fn recv_timeout(&self, timeout: Duration) -> Result<SourceMessage, RecvTimeoutError> {
        match &self.messages {
            Some(rx) => rx.recv_timeout(timeout),
            None => Err(RecvTimeoutError::Disconnected),
        }
    }

    /// Tells every reader to stop and yields what they queued until the last
    /// one has exited.
    fn shutdown(&self) -> impl Iterator<Item = SourceMessage> + '_ {
        self.stop.cancel();
        self.messages.iter().flat_map(|rx| rx.iter())
    }
}

impl Drop for ReaderPool {
    fn drop(&mut self) {
        self.stop.cancel();
        drop(self.messages.take());
        for reader in self.readers.drain(..) {
            if reader.join().is_err() {
                warn!("input reader thread panicked");
            }
        }
    }
}

fn read_source(
    mut source: Box<dyn DeviceSource>,
    tx: &SyncSender<SourceMessage>,
    stop: &CancelToken,
    poll_interval: Duration,
) {
    debug!(device = source.name(), "reader started");
    while !stop.is_cancelled() {
        match source.poll(poll_interval) {
            Ok(false) => {}
            Ok(true) => {
                while !stop.is_cancelled() {
                    match source.read_event() {
                        Ok(Some(event)) => {
                            let message = SourceMessage::Event {
                                at: Instant::now(),
                                event,
                            };
                            if tx.send(message).is_err() {
                                return;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => return report_lost(&*source, tx, &e),
                    }
                }
            }
            Err(e) => return report_lost(&*source, tx, &e),
        }
    }
    debug!(device = source.name(), "reader stopped");
}

fn report_lost(source: &dyn DeviceSource, tx: &SyncSender<SourceMessage>, error: &DeviceError) {
    warn!(device = source.name(), "input device failed: {error}");
    let _ = tx.send(SourceMessage::Lost {
        device: source.name().to_string(),
    });
}

// ── Tests ─────────────────────────────────────────────────────────────────────
