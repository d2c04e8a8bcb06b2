//! Domain entities for KeyMacro.
//!
//! This module contains pure data and bookkeeping with no infrastructure
//! dependencies.  The application crate builds recorder and player sessions
//! on top of these types; the device adapters translate them to and from the
//! kernel's `input_event` layout.

/// Raw events and timestamped records.
pub mod event;

/// What a virtual device declares before it becomes visible.
pub mod capabilities;

/// Relative-delay bookkeeping for recordings.
pub mod timing;
