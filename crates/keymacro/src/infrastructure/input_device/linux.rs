//! Linux evdev capture and uinput emulation.
//!
//! # Capture: evdev
//!
//! Every physical keyboard, mouse, touchpad and button panel appears as a
//! character device `/dev/input/event<N>`.  Reading one returns a stream of
//! fixed-size `struct input_event` records (timestamp, type, code, value).
//! The recorder opens every node it is permitted to read with `O_NONBLOCK` so
//! a `read(2)` on an idle device returns `EAGAIN` instead of blocking, and
//! uses `poll(2)` with a bounded timeout to wait for data.
//!
//! # Emulation: uinput
//!
//! `/dev/uinput` lets a process create a *virtual* input device.  Creation is
//! a three-step protocol:
//!
//! 1. Register capabilities with `UI_SET_EVBIT` / `UI_SET_KEYBIT` /
//!    `UI_SET_RELBIT` / `UI_SET_ABSBIT` ioctls.
//! 2. Write a `struct uinput_user_dev` describing the device identity.
//! 3. Issue `UI_DEV_CREATE`.  The device becomes visible to the OS a short
//!    time later (udev and the compositor pick it up asynchronously).
//!
//! Events written to the file descriptor afterwards are delivered to every
//! listener exactly as if a real device had produced them.  `UI_DEV_DESTROY`
//! removes the device; closing the descriptor also removes it.
//!
//! # Permissions
//!
//! Reading `/dev/input/event*` normally requires membership in the `input`
//! group; writing `/dev/uinput` usually requires root or a udev rule granting
//! access.  Nodes that cannot be opened are skipped during capture; a uinput
//! node that cannot be opened fails playback with `CreateFailed`.
//!
//! # Safety
//!
//! This module uses `unsafe` code exclusively for libc FFI calls and for
//! converting between `input_event` and its byte representation.  All
//! `unsafe` blocks are annotated with `// SAFETY:` comments.

#![cfg(target_os = "linux")]

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::mem;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;

use keymacro_core::{CapabilitySet, DeviceIdentity, RawEvent};
use tracing::{debug, info, warn};

use super::{DeviceError, DeviceSource, InputPlatform, PlatformConfig, VirtualSink};

// ── uinput ioctl requests (linux/uinput.h) ───────────────────────────────────

/// `_IO('U', 1)`
const UI_DEV_CREATE: libc::c_ulong = 0x5501;
/// `_IO('U', 2)`
const UI_DEV_DESTROY: libc::c_ulong = 0x5502;
/// `_IOW('U', 100, int)`
const UI_SET_EVBIT: libc::c_ulong = 0x4004_5564;
/// `_IOW('U', 101, int)`
const UI_SET_KEYBIT: libc::c_ulong = 0x4004_5565;
/// `_IOW('U', 102, int)`
const UI_SET_RELBIT: libc::c_ulong = 0x4004_5566;
/// `_IOW('U', 103, int)`
const UI_SET_ABSBIT: libc::c_ulong = 0x4004_5567;

const UINPUT_MAX_NAME_SIZE: usize = 80;
const ABS_CNT: usize = 64;

/// `sizeof(struct uinput_user_dev)`: name, 4×u16 id, u32 ff_effects_max,
/// then absmax/absmin/absfuzz/absflat arrays of `ABS_CNT` i32 each.
const USER_DEV_SIZE: usize = UINPUT_MAX_NAME_SIZE + 4 * 2 + 4 + 4 * ABS_CNT * 4;

const INPUT_EVENT_SIZE: usize = mem::size_of::<libc::input_event>();

// ── Platform ──────────────────────────────────────────────────────────────────

/// The Linux evdev/uinput platform adapter.
#[derive(Debug, Clone)]
pub struct LinuxInputPlatform {
    config: PlatformConfig,
}

impl LinuxInputPlatform {
    /// Creates an adapter reading from `config.device_dir` and creating
    /// virtual devices through `config.uinput_path`.
    pub fn new(config: PlatformConfig) -> Self {
        Self { config }
    }

    /// Lists `<device_dir>/<prefix>*`, sorted by path.
    fn candidate_nodes(&self) -> Result<Vec<PathBuf>, DeviceError> {
        let dir = &self.config.device_dir;
        let entries = std::fs::read_dir(dir).map_err(|source| DeviceError::Enumerate {
            dir: dir.clone(),
            source,
        })?;

        let mut nodes: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.starts_with(&self.config.device_prefix))
            })
            .map(|entry| entry.path())
            .collect();
        nodes.sort();
        Ok(nodes)
    }
}

impl InputPlatform for LinuxInputPlatform {
    fn open_sources(&self) -> Result<Vec<Box<dyn DeviceSource>>, DeviceError> {
        let nodes = self.candidate_nodes()?;
        let total = nodes.len();

        let mut sources: Vec<Box<dyn DeviceSource>> = Vec::with_capacity(total);
        for path in nodes {
            match EvdevSource::open(&path) {
                Ok(source) => {
                    debug!("opened input device {}", path.display());
                    sources.push(Box::new(source));
                }
                Err(e) => debug!("skipping input device: {e}"),
            }
        }

        info!(
            "opened {} of {total} input devices in {}",
            sources.len(),
            self.config.device_dir.display()
        );
        Ok(sources)
    }

    fn create_sink(
        &self,
        identity: &DeviceIdentity,
        capabilities: &CapabilitySet,
    ) -> Result<Box<dyn VirtualSink>, DeviceError> {
        let sink = UinputSink::create(&self.config.uinput_path, identity, capabilities)?;
        Ok(Box::new(sink))
    }
}

// ── Source ────────────────────────────────────────────────────────────────────

/// One `/dev/input/event*` node opened for non-blocking reads.
#[derive(Debug)]
pub struct EvdevSource {
    name: String,
    file: File,
}

impl EvdevSource {
    /// Opens `path` read-only with `O_NONBLOCK`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Unavailable`] if the node cannot be opened.
    pub fn open(path: &Path) -> Result<Self, DeviceError> {
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
            .map_err(|source| DeviceError::Unavailable {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            name: path.display().to_string(),
            file,
        })
    }

    fn lost(&self) -> DeviceError {
        DeviceError::Lost {
            device: self.name.clone(),
        }
    }
}

impl DeviceSource for EvdevSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn poll(&mut self, timeout: Duration) -> Result<bool, DeviceError> {
        let mut pfd = libc::pollfd {
            fd: self.file.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let timeout_ms = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);

        // SAFETY: `pfd` is a valid, initialised pollfd that lives for the whole
        // call, and the count passed is exactly one.
        let ret = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(DeviceError::Io(err));
        }
        if ret == 0 {
            return Ok(false);
        }
        if pfd.revents & libc::POLLIN != 0 {
            return Ok(true);
        }
        if pfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
            return Err(self.lost());
        }
        Ok(false)
    }

    fn read_event(&mut self) -> Result<Option<RawEvent>, DeviceError> {
        let mut buf = [0u8; INPUT_EVENT_SIZE];
        match self.file.read(&mut buf) {
            Ok(n) if n == INPUT_EVENT_SIZE => Ok(Some(decode_input_event(&buf))),
            // Short read: try again on the next poll.
            Ok(_) => Ok(None),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(e) if e.raw_os_error() == Some(libc::ENODEV) => Err(self.lost()),
            Err(e) => Err(DeviceError::Io(e)),
        }
    }
}

// ── Sink ──────────────────────────────────────────────────────────────────────

/// A virtual device created through `/dev/uinput`.
#[derive(Debug)]
pub struct UinputSink {
    name: String,
    file: File,
    destroyed: bool,
}

impl UinputSink {
    /// Registers `capabilities`, writes the device identity, and creates the
    /// device.
    ///
    /// Dropping the half-built descriptor on any error path closes it, which
    /// leaves no virtual device behind.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::CreateFailed`] if the node cannot be opened or
    /// any registration step is rejected.
    pub fn create(
        path: &Path,
        identity: &DeviceIdentity,
        capabilities: &CapabilitySet,
    ) -> Result<Self, DeviceError> {
        let mut file = OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
            .map_err(DeviceError::CreateFailed)?;
        let fd = file.as_raw_fd();

        for category in capabilities.categories() {
            set_bit(fd, UI_SET_EVBIT, category)?;
        }
        for key in capabilities.keys.clone() {
            set_bit(fd, UI_SET_KEYBIT, key)?;
        }
        for axis in &capabilities.relative_axes {
            set_bit(fd, UI_SET_RELBIT, *axis)?;
        }
        for axis in capabilities.absolute_axes.clone() {
            set_bit(fd, UI_SET_ABSBIT, axis)?;
        }

        file.write_all(&encode_user_dev(identity))
            .map_err(DeviceError::CreateFailed)?;

        // SAFETY: `fd` is an open uinput descriptor and UI_DEV_CREATE takes no argument.
        let ret = unsafe { libc::ioctl(fd, UI_DEV_CREATE as _) };
        if ret < 0 {
            return Err(DeviceError::CreateFailed(io::Error::last_os_error()));
        }

        info!("virtual device {:?} created", identity.truncated_name());
        Ok(Self {
            name: identity.truncated_name().to_string(),
            file,
            destroyed: false,
        })
    }
}

impl VirtualSink for UinputSink {
    fn emit(&mut self, event: RawEvent) -> Result<(), DeviceError> {
        self.file
            .write_all(&encode_input_event(event))
            .map_err(DeviceError::Io)
    }

    fn destroy(&mut self) -> Result<(), DeviceError> {
        if self.destroyed {
            return Ok(());
        }
        self.destroyed = true;

        // SAFETY: the descriptor is still open (owned by `self.file`) and
        // UI_DEV_DESTROY takes no argument.
        let ret = unsafe { libc::ioctl(self.file.as_raw_fd(), UI_DEV_DESTROY as _) };
        if ret < 0 {
            return Err(DeviceError::Io(io::Error::last_os_error()));
        }
        info!("virtual device {:?} destroyed", self.name);
        Ok(())
    }
}

impl Drop for UinputSink {
    fn drop(&mut self) {
        if let Err(e) = self.destroy() {
            warn!("failed to destroy virtual device {:?}: {e}", self.name);
        }
    }
}

// ── FFI helpers ───────────────────────────────────────────────────────────────

/// Issues one `UI_SET_*BIT` registration ioctl.
fn set_bit(fd: libc::c_int, request: libc::c_ulong, bit: u16) -> Result<(), DeviceError> {
    // SAFETY: `fd` is an open uinput descriptor and every UI_SET_*BIT request
    // takes a plain int argument by value.
    let ret = unsafe { libc::ioctl(fd, request as _, libc::c_int::from(bit)) };
    if ret < 0 {
        return Err(DeviceError::CreateFailed(io::Error::last_os_error()));
    }
    Ok(())
}

/// Serialises a legacy `struct uinput_user_dev` with zeroed axis ranges.
fn encode_user_dev(identity: &DeviceIdentity) -> Vec<u8> {
    let mut buf = Vec::with_capacity(USER_DEV_SIZE);

    let mut name = [0u8; UINPUT_MAX_NAME_SIZE];
    let bytes = identity.truncated_name().as_bytes();
    name[..bytes.len()].copy_from_slice(bytes);
    buf.extend_from_slice(&name);

    for field in [
        identity.bus_type,
        identity.vendor,
        identity.product,
        identity.version,
    ] {
        buf.extend_from_slice(&field.to_ne_bytes());
    }
    // ff_effects_max, then absmax/absmin/absfuzz/absflat
    buf.resize(USER_DEV_SIZE, 0);
    buf
}

fn decode_input_event(buf: &[u8; INPUT_EVENT_SIZE]) -> RawEvent {
    // SAFETY: `buf` holds exactly size_of::<input_event>() bytes, every bit
    // pattern is a valid input_event, and read_unaligned does not require the
    // byte array to be aligned for the struct.
    let ev: libc::input_event = unsafe { std::ptr::read_unaligned(buf.as_ptr().cast()) };
    RawEvent::new(ev.type_, ev.code, ev.value)
}

fn encode_input_event(event: RawEvent) -> [u8; INPUT_EVENT_SIZE] {
    // SAFETY: input_event is plain old data; all-zero is a valid value.
    let mut ev: libc::input_event = unsafe { mem::zeroed() };
    // SAFETY: `ev.time` is a valid, writable timeval and a null timezone is allowed.
    unsafe {
        libc::gettimeofday(&mut ev.time, std::ptr::null_mut());
    }
    ev.type_ = event.category;
    ev.code = event.code;
    ev.value = event.value;

    let mut buf = [0u8; INPUT_EVENT_SIZE];
    // SAFETY: source and destination are both INPUT_EVENT_SIZE bytes long and
    // do not overlap.
    unsafe {
        std::ptr::copy_nonoverlapping(
            (&ev as *const libc::input_event).cast::<u8>(),
            buf.as_mut_ptr(),
            INPUT_EVENT_SIZE,
        );
    }
    buf
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use keymacro_core::categories;
    use uuid::Uuid;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("keymacro_dev_{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn platform_for(dir: &Path) -> LinuxInputPlatform {
        LinuxInputPlatform::new(PlatformConfig {
            device_dir: dir.to_path_buf(),
            device_prefix: "event".to_string(),
            uinput_path: dir.join("uinput-does-not-exist"),
        })
    }

    #[test]
    fn test_user_dev_layout_matches_kernel_struct_size() {
        // Arrange
        let identity = DeviceIdentity::default();

        // Act
        let buf = encode_user_dev(&identity);

        // Assert
        assert_eq!(buf.len(), 1116);
        assert_eq!(&buf[..18], b"Virtual POS Device");
        assert_eq!(buf[18], 0, "name must be NUL-terminated");
        assert_eq!(&buf[80..82], &0x03u16.to_ne_bytes());
        assert_eq!(&buf[82..84], &0x1234u16.to_ne_bytes());
        assert_eq!(&buf[84..86], &0x5678u16.to_ne_bytes());
        assert_eq!(&buf[86..88], &1u16.to_ne_bytes());
        assert!(buf[88..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_candidate_nodes_filters_by_prefix_and_sorts() {
        // Arrange
        let dir = temp_dir();
        for name in ["event3", "mouse0", "event1", "js0"] {
            File::create(dir.join(name)).unwrap();
        }

        // Act
        let nodes = platform_for(&dir).candidate_nodes().unwrap();

        // Assert
        assert_eq!(nodes, vec![dir.join("event1"), dir.join("event3")]);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_open_sources_on_missing_directory_reports_enumerate_error() {
        let dir = std::env::temp_dir().join(format!("keymacro_missing_{}", Uuid::new_v4()));
        let result = platform_for(&dir).open_sources();
        assert!(matches!(result, Err(DeviceError::Enumerate { .. })));
    }

    #[test]
    fn test_open_sources_with_no_matching_nodes_is_empty() {
        // Arrange
        let dir = temp_dir();
        File::create(dir.join("mice")).unwrap();

        // Act
        let sources = platform_for(&dir).open_sources().unwrap();

        // Assert
        assert!(sources.is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_source_reads_whole_input_events_and_ignores_trailing_partial() {
        // Arrange – two complete events followed by a truncated third
        let dir = temp_dir();
        let path = dir.join("event0");
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&encode_input_event(RawEvent::new(categories::KEY, 30, 1)));
        bytes.extend_from_slice(&encode_input_event(RawEvent::new(categories::SYN, 0, 0)));
        bytes.extend_from_slice(&encode_input_event(RawEvent::new(categories::KEY, 30, 0))[..5]);
        std::fs::write(&path, &bytes).unwrap();
        let mut source = EvdevSource::open(&path).unwrap();

        // Act
        let ready = source.poll(Duration::from_millis(10)).unwrap();
        let first = source.read_event().unwrap();
        let second = source.read_event().unwrap();
        let partial = source.read_event().unwrap();

        // Assert
        assert!(ready);
        assert_eq!(first, Some(RawEvent::new(categories::KEY, 30, 1)));
        assert_eq!(second, Some(RawEvent::new(categories::SYN, 0, 0)));
        assert_eq!(partial, None, "partial read must be treated as no data");
        assert_eq!(source.name(), path.display().to_string());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_open_missing_node_reports_unavailable() {
        let result = EvdevSource::open(Path::new("/nonexistent/keymacro/event0"));
        assert!(matches!(result, Err(DeviceError::Unavailable { .. })));
    }

    #[test]
    fn test_create_sink_without_uinput_node_fails() {
        // Arrange
        let dir = temp_dir();

        // Act
        let result = platform_for(&dir).create_sink(&DeviceIdentity::default(), &CapabilitySet::full());

        // Assert
        assert!(matches!(result, Err(DeviceError::CreateFailed(_))));

        std::fs::remove_dir_all(&dir).ok();
    }
}
