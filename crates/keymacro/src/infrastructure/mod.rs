//! Infrastructure layer for KeyMacro.
//!
//! Contains OS-facing adapters: raw input devices (evdev sources and the
//! uinput sink) and file-system storage for the configuration.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `keymacro_core`.  The application layer only sees the traits in
//! [`input_device`], never a concrete adapter.

pub mod input_device;
pub mod storage;
