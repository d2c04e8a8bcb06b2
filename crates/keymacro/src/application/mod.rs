//! Application layer use cases for KeyMacro.
//!
//! # What use cases does KeyMacro have?
//!
//! - **`record_macro`** – Opens every readable input device, timestamps each
//!   event as it arrives, and appends it to a macro file.  Devices are
//!   reached through an injected `InputPlatform`, so the same code runs
//!   against real hardware and against scripted test devices.
//!
//! - **`play_macro`** – Creates a virtual input device, then streams a macro
//!   file through it, sleeping each recorded delay.  Optionally loops.
//!
//! - **`macro_manager`** – The façade the binary talks to.  It owns at most
//!   one recording and one playback session, starts each on its own worker
//!   thread, and reports worker failures on a channel.
//!
//! `session` holds the worker-thread plumbing shared by all three, and
//! `error` the failure types they report.

pub mod error;
pub mod macro_manager;
pub mod play_macro;
pub mod record_macro;
pub mod session;
