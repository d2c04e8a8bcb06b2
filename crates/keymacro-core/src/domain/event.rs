//! Raw input events and the timestamped records stored in a macro file.
//!
//! # What is a raw input event? (for beginners)
//!
//! The Linux kernel reports every keyboard and mouse action as a small,
//! fixed-size `input_event` struct carrying three integers:
//!
//! | Field      | Meaning                                  | Example            |
//! |------------|------------------------------------------|--------------------|
//! | `type`     | Coarse category (key, relative, ...)     | `1` = key/button   |
//! | `code`     | Which control inside the category        | `30` = the A key   |
//! | `value`    | State or magnitude                       | `1` press, `0` release |
//!
//! A single physical action usually produces several events followed by a
//! synchronization marker (`type = 0`) that tells listeners "this group is
//! complete".  KeyMacro records and replays *all* of them, markers included,
//! without interpreting them.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Well-known event categories from the kernel input protocol.
///
/// These are used only to declare virtual-device capabilities.  Recorded
/// events are never filtered or interpreted by category.
pub mod categories {
    /// Synchronization marker separating groups of events.
    pub const SYN: u16 = 0x00;
    /// Keys and buttons.
    pub const KEY: u16 = 0x01;
    /// Relative axes (mouse motion, wheel).
    pub const REL: u16 = 0x02;
    /// Absolute axes (touchpads, tablets, joysticks).
    pub const ABS: u16 = 0x03;

    /// Relative X motion.
    pub const REL_X: u16 = 0x00;
    /// Relative Y motion.
    pub const REL_Y: u16 = 0x01;
    /// Vertical wheel.
    pub const REL_WHEEL: u16 = 0x08;

    /// Highest absolute axis code defined by the kernel.
    pub const ABS_MAX: u16 = 0x3f;
    /// Number of key codes a virtual device registers.
    pub const KEY_COUNT: u16 = 256;
}

/// One raw event exactly as read from, or written to, an input device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawEvent {
    /// Event category (the kernel's `type` field).
    pub category: u16,
    /// Control within the category.
    pub code: u16,
    /// State or magnitude.
    pub value: i32,
}

impl RawEvent {
    /// Creates a raw event from its three fields.
    pub const fn new(category: u16, code: u16, value: i32) -> Self {
        Self {
            category,
            code,
            value,
        }
    }
}

/// A raw event plus the delay that elapsed since the previous record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Milliseconds since the previous record in the same sequence.
    /// Always `0` for the first record.
    pub delay_ms: u64,
    /// The event to replay once the delay has elapsed.
    pub event: RawEvent,
}

impl EventRecord {
    /// Creates a record from a delay in milliseconds and a raw event.
    pub const fn new(delay_ms: u64, event: RawEvent) -> Self {
        Self { delay_ms, event }
    }

    /// The delay as a [`Duration`].
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Formats the record as one macro-file line, without the trailing newline.
impl fmt::Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.delay_ms, self.event.category, self.event.code, self.event.value
        )
    }
}
