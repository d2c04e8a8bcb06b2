//! # keymacro-core
//!
//! Shared library for KeyMacro containing the raw input event model, the
//! virtual-device capability declaration, and the macro file codec.
//!
//! This crate has zero dependencies on OS APIs or device handles.  Everything
//! here can be compiled and tested on any platform.
//!
//! # Architecture overview (for beginners)
//!
//! KeyMacro records what your keyboard and mouse do and plays it back later.
//! Recording listens to the kernel's raw input devices; playback creates a
//! *virtual* input device and writes the same events into it, so every
//! application sees them as if a human were typing.
//!
//! This crate (`keymacro-core`) is the shared foundation.  It defines:
//!
//! - **`domain`** – The data passed between recorder and player: a
//!   [`RawEvent`] (category/code/value triple), an [`EventRecord`] (a raw
//!   event plus the delay since the previous one), the [`CapabilitySet`] a
//!   virtual device declares, and the [`DelayTracker`] that turns a clock
//!   into per-record delays.
//!
//! - **`protocol`** – How records are stored: one line of text per record,
//!   `"<delay> <category> <code> <value>"`.  See [`protocol::codec`].

pub mod domain;
pub mod protocol;

pub use domain::capabilities::{CapabilitySet, DeviceIdentity};
pub use domain::event::{categories, EventRecord, RawEvent};
pub use domain::timing::DelayTracker;
pub use protocol::codec::{decode, decode_line, encode, CodecError, MacroReader, MacroWriter};
