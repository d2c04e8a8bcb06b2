//! keymacro library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does keymacro do? (for beginners)
//!
//! A *macro* here is a recording of raw keyboard and mouse activity, such as
//! the key presses a cashier makes to ring up a common order.  The library:
//!
//! 1. Opens every input device under `/dev/input` and records each event
//!    with the delay since the previous one, one line per event.
//! 2. Later creates a virtual input device through `/dev/uinput` and writes
//!    the same events into it with the same spacing, so every application
//!    sees them as real typing.
//!
//! Both run on background threads owned by a
//! [`MacroManager`](application::macro_manager::MacroManager); failures are
//! reported on a channel instead of being returned from the `start_*` calls.

/// Application layer: recording, playback, and the manager façade.
pub mod application;

/// Infrastructure layer: device adapters and configuration storage.
pub mod infrastructure;

pub use application::error::{MacroError, MacroFailure};
pub use application::macro_manager::{MacroManager, MacroSettings};
pub use application::session::SessionRole;
