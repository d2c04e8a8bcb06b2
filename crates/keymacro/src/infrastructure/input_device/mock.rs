//! Scripted input devices for testing.
//!
//! # Why scripted devices?
//!
//! The real adapter reads `/dev/input/event*` and writes `/dev/uinput`, which:
//!
//! - Require permissions a test runner usually does not have.
//! - Would inject real keystrokes into the machine running the tests.
//! - Produce events only when a human touches the hardware.
//!
//! [`ScriptedPlatform`] replaces both sides.  Each [`SourceScript`] describes
//! the events one fake device produces, as offsets from the moment it is
//! opened, plus an optional time at which the device "disappears".  Every
//! `open_sources` call creates fresh sources from the scripts, so a platform
//! can serve several recording sessions in a row.
//!
//! The sink side records every emitted event with an [`Instant`] timestamp
//! into a shared [`SinkLog`], along with how many sinks were created and
//! destroyed, so tests can assert ordering, pacing, and cleanup.
//!
//! # Usage in tests
//!
//! ```ignore
//! let platform = Arc::new(
//!     ScriptedPlatform::new().with_source(
//!         SourceScript::new("kbd")
//!             .event_at(Duration::ZERO, RawEvent::new(1, 30, 1))
//!             .event_at(Duration::from_millis(120), RawEvent::new(1, 30, 0)),
//!     ),
//! );
//! let log = platform.sink_log();
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use keymacro_core::{CapabilitySet, DeviceIdentity, RawEvent};

use super::{DeviceError, DeviceSource, InputPlatform, VirtualSink};

// ── Scripts ───────────────────────────────────────────────────────────────────

/// The behaviour of one fake input device.
#[derive(Debug, Clone)]
pub struct SourceScript {
    name: String,
    events: Vec<(Duration, RawEvent)>,
    lost_after: Option<Duration>,
}

impl SourceScript {
    /// Creates a device that produces nothing.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            events: Vec::new(),
            lost_after: None,
        }
    }

    /// Adds an event that becomes readable `offset` after the device is opened.
    pub fn event_at(mut self, offset: Duration, event: RawEvent) -> Self {
        self.events.push((offset, event));
        self.events.sort_by_key(|(at, _)| *at);
        self
    }

    /// Makes the device report [`DeviceError::Lost`] once `offset` has elapsed.
    pub fn lost_after(mut self, offset: Duration) -> Self {
        self.lost_after = Some(offset);
        self
    }
}

/// Counters shared between a platform and the sources it handed out.
#[derive(Debug, Default)]
struct SourceStats {
    opened: AtomicUsize,
    closed: AtomicUsize,
    delivered: AtomicUsize,
}

// ── Platform ──────────────────────────────────────────────────────────────────

/// A platform whose devices are driven by scripts.
#[derive(Default)]
pub struct ScriptedPlatform {
    scripts: Vec<SourceScript>,
    sink_failure: Option<String>,
    emit_failure_after: Option<usize>,
    open_calls: AtomicUsize,
    stats: Arc<SourceStats>,
    sink_log: Arc<SinkLog>,
}

impl ScriptedPlatform {
    /// Creates a platform with no input devices and a working sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a device to every future `open_sources` result.
    pub fn with_source(mut self, script: SourceScript) -> Self {
        self.scripts.push(script);
        self
    }

    /// Makes `create_sink` fail with [`DeviceError::CreateFailed`].
    pub fn with_failing_sink(mut self, reason: impl Into<String>) -> Self {
        self.sink_failure = Some(reason.into());
        self
    }

    /// Makes every sink fail its `emit` call after `count` successful emits.
    pub fn with_emit_failure_after(mut self, count: usize) -> Self {
        self.emit_failure_after = Some(count);
        self
    }

    /// The log shared by every sink this platform creates.
    pub fn sink_log(&self) -> Arc<SinkLog> {
        Arc::clone(&self.sink_log)
    }

    /// Number of times `open_sources` was called.
    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    /// Number of sources handed out so far.
    pub fn sources_opened(&self) -> usize {
        self.stats.opened.load(Ordering::SeqCst)
    }

    /// Number of handed-out sources that have since been dropped.
    pub fn sources_closed(&self) -> usize {
        self.stats.closed.load(Ordering::SeqCst)
    }

    /// Number of events the sources have returned from `read_event`.
    pub fn events_delivered(&self) -> usize {
        self.stats.delivered.load(Ordering::SeqCst)
    }
}

impl InputPlatform for ScriptedPlatform {
    fn open_sources(&self) -> Result<Vec<Box<dyn DeviceSource>>, DeviceError> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        let opened_at = Instant::now();
        let sources = self
            .scripts
            .iter()
            .map(|script| {
                self.stats.opened.fetch_add(1, Ordering::SeqCst);
                Box::new(ScriptedSource {
                    name: script.name.clone(),
                    opened_at,
                    pending: script.events.iter().copied().collect(),
                    lost_after: script.lost_after,
                    stats: Arc::clone(&self.stats),
                }) as Box<dyn DeviceSource>
            })
            .collect();
        Ok(sources)
    }

    fn create_sink(
        &self,
        identity: &DeviceIdentity,
        capabilities: &CapabilitySet,
    ) -> Result<Box<dyn VirtualSink>, DeviceError> {
        if let Some(reason) = &self.sink_failure {
            return Err(DeviceError::CreateFailed(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                reason.clone(),
            )));
        }
        self.sink_log.record_created(identity, capabilities);
        Ok(Box::new(RecordingSink {
            log: Arc::clone(&self.sink_log),
            emitted: 0,
            fail_after: self.emit_failure_after,
            destroyed: false,
        }))
    }
}

// ── Source ────────────────────────────────────────────────────────────────────

/// A fake device that releases scripted events as their offsets elapse.
pub struct ScriptedSource {
    name: String,
    opened_at: Instant,
    pending: VecDeque<(Duration, RawEvent)>,
    lost_after: Option<Duration>,
    stats: Arc<SourceStats>,
}

impl ScriptedSource {
    fn next_due(&self) -> Option<Duration> {
        self.pending.front().map(|(at, _)| *at)
    }

    fn is_lost(&self, now: Duration) -> bool {
        self.lost_after.is_some_and(|lost| now >= lost)
    }

    fn lost(&self) -> DeviceError {
        DeviceError::Lost {
            device: self.name.clone(),
        }
    }
}

impl DeviceSource for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn poll(&mut self, timeout: Duration) -> Result<bool, DeviceError> {
        let now = self.opened_at.elapsed();
        if self.next_due().is_some_and(|due| due <= now) {
            return Ok(true);
        }
        if self.is_lost(now) {
            return Err(self.lost());
        }

        let mut wake = now + timeout;
        if let Some(due) = self.next_due() {
            wake = wake.min(due);
        }
        if let Some(lost) = self.lost_after {
            wake = wake.min(lost);
        }
        thread::sleep(wake.saturating_sub(now));

        let now = self.opened_at.elapsed();
        if self.next_due().is_some_and(|due| due <= now) {
            return Ok(true);
        }
        if self.is_lost(now) {
            return Err(self.lost());
        }
        Ok(false)
    }

    fn read_event(&mut self) -> Result<Option<RawEvent>, DeviceError> {
        let now = self.opened_at.elapsed();
        match self.pending.front() {
            Some((due, _)) if *due <= now => {
                self.stats.delivered.fetch_add(1, Ordering::SeqCst);
                Ok(self.pending.pop_front().map(|(_, event)| event))
            }
            _ => Ok(None),
        }
    }
}

impl Drop for ScriptedSource {
    fn drop(&mut self) {
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Sink ──────────────────────────────────────────────────────────────────────

/// Everything the scripted sinks observed.
#[derive(Debug, Default)]
pub struct SinkLog {
    state: Mutex<SinkLogState>,
}

#[derive(Debug, Default)]
struct SinkLogState {
    events: Vec<(Instant, RawEvent)>,
    created: usize,
    destroyed: usize,
    created_at: Option<Instant>,
    identity: Option<DeviceIdentity>,
    capabilities: Option<CapabilitySet>,
}

impl SinkLog {
    fn state(&self) -> MutexGuard<'_, SinkLogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_created(&self, identity: &DeviceIdentity, capabilities: &CapabilitySet) {
        let mut state = self.state();
        state.created += 1;
        state.created_at = Some(Instant::now());
        state.identity = Some(identity.clone());
        state.capabilities = Some(capabilities.clone());
    }

    /// Every emitted event, in emission order.
    pub fn events(&self) -> Vec<RawEvent> {
        let state = self.state();
        state.events.iter().map(|(_, event)| *event).collect()
    }

    /// Every emitted event with the instant it was emitted.
    pub fn timed_events(&self) -> Vec<(Instant, RawEvent)> {
        self.state().events.clone()
    }

    /// Number of sinks created.
    pub fn created(&self) -> usize {
        self.state().created
    }

    /// Number of `destroy` calls that actually unregistered a sink.
    pub fn destroyed(&self) -> usize {
        self.state().destroyed
    }

    /// When the most recent sink was created.
    pub fn created_at(&self) -> Option<Instant> {
        self.state().created_at
    }

    /// Identity passed to the most recent `create_sink`.
    pub fn identity(&self) -> Option<DeviceIdentity> {
        self.state().identity.clone()
    }

    /// Capabilities passed to the most recent `create_sink`.
    pub fn capabilities(&self) -> Option<CapabilitySet> {
        self.state().capabilities.clone()
    }
}

/// A virtual sink that appends to a [`SinkLog`] instead of touching the OS.
///
/// It deliberately does not destroy itself on drop, so tests can verify that
/// callers call [`VirtualSink::destroy`] themselves.
pub struct RecordingSink {
    log: Arc<SinkLog>,
    emitted: usize,
    fail_after: Option<usize>,
    destroyed: bool,
}

impl VirtualSink for RecordingSink {
    fn emit(&mut self, event: RawEvent) -> Result<(), DeviceError> {
        if self.destroyed {
            return Err(DeviceError::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "emit after destroy",
            )));
        }
        if self.fail_after.is_some_and(|limit| self.emitted >= limit) {
            return Err(DeviceError::Lost {
                device: "scripted sink".to_string(),
            });
        }
        self.emitted += 1;
        self.log.state().events.push((Instant::now(), event));
        Ok(())
    }

    fn destroy(&mut self) -> Result<(), DeviceError> {
        if !self.destroyed {
            self.destroyed = true;
            self.log.state().destroyed += 1;
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: u16, value: i32) -> RawEvent {
        RawEvent::new(keymacro_core::categories::KEY, code, value)
    }

    #[test]
    fn test_scripted_source_releases_events_when_due() {
        // Arrange
        let platform = ScriptedPlatform::new().with_source(
            SourceScript::new("kbd")
                .event_at(Duration::ZERO, key(30, 1))
                .event_at(Duration::from_millis(40), key(30, 0)),
        );
        let mut sources = platform.open_sources().unwrap();
        let source = &mut sources[0];

        // Act
        let ready_now = source.poll(Duration::from_millis(1)).unwrap();
        let first = source.read_event().unwrap();
        let early = source.read_event().unwrap();
        let ready_later = source.poll(Duration::from_millis(200)).unwrap();
        let second = source.read_event().unwrap();

        // Assert
        assert!(ready_now);
        assert_eq!(first, Some(key(30, 1)));
        assert_eq!(early, None, "second event is not due yet");
        assert!(ready_later);
        assert_eq!(second, Some(key(30, 0)));
    }

    #[test]
    fn test_scripted_source_poll_times_out_when_idle() {
        // Arrange
        let platform = ScriptedPlatform::new().with_source(SourceScript::new("idle"));
        let mut sources = platform.open_sources().unwrap();

        // Act
        let started = Instant::now();
        let ready = sources[0].poll(Duration::from_millis(30)).unwrap();

        // Assert
        assert!(!ready);
        assert!(started.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn test_scripted_source_reports_loss() {
        // Arrange
        let platform = ScriptedPlatform::new()
            .with_source(SourceScript::new("usb-kbd").lost_after(Duration::from_millis(10)));
        let mut sources = platform.open_sources().unwrap();

        // Act
        let result = sources[0].poll(Duration::from_millis(100));

        // Assert
        assert!(matches!(result, Err(DeviceError::Lost { device }) if device == "usb-kbd"));
    }

    #[test]
    fn test_platform_tracks_opened_and_closed_sources() {
        // Arrange
        let platform = ScriptedPlatform::new()
            .with_source(SourceScript::new("a"))
            .with_source(SourceScript::new("b"));

        // Act
        let sources = platform.open_sources().unwrap();
        let opened = platform.sources_opened();
        drop(sources);

        // Assert
        assert_eq!(opened, 2);
        assert_eq!(platform.sources_closed(), 2);
        assert_eq!(platform.open_calls(), 1);
    }

    #[test]
    fn test_recording_sink_logs_events_and_counts_destroy_once() {
        // Arrange
        let platform = ScriptedPlatform::new();
        let log = platform.sink_log();
        let mut sink = platform
            .create_sink(&DeviceIdentity::default(), &CapabilitySet::full())
            .unwrap();

        // Act
        sink.emit(key(30, 1)).unwrap();
        sink.emit(key(30, 0)).unwrap();
        sink.destroy().unwrap();
        sink.destroy().unwrap();

        // Assert
        assert_eq!(log.events(), vec![key(30, 1), key(30, 0)]);
        assert_eq!(log.created(), 1);
        assert_eq!(log.destroyed(), 1);
        assert!(sink.emit(key(1, 1)).is_err(), "destroyed sink rejects events");
    }

    #[test]
    fn test_failing_sink_reports_create_failed() {
        let platform = ScriptedPlatform::new().with_failing_sink("no uinput access");
        let result = platform.create_sink(&DeviceIdentity::default(), &CapabilitySet::full());
        assert!(matches!(result, Err(DeviceError::CreateFailed(_))));
        assert_eq!(platform.sink_log().created(), 0);
    }

    #[test]
    fn test_emit_failure_after_limit() {
        // Arrange
        let platform = ScriptedPlatform::new().with_emit_failure_after(1);
        let mut sink = platform
            .create_sink(&DeviceIdentity::default(), &CapabilitySet::full())
            .unwrap();

        // Act / Assert
        assert!(sink.emit(key(30, 1)).is_ok());
        assert!(sink.emit(key(30, 0)).is_err());
    }
}
