//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the TOML configuration from the
//! platform-appropriate directory, falls back to defaults on first run, and
//! turns the file's sections into the settings the manager and the device
//! adapter take.
//!
//! Macro files themselves are written by the recorder through
//! `keymacro_core::MacroWriter`; they are not managed here.

pub mod config;
