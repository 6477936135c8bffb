//! Foundational low-level utilities shared across ghrun crates.
//!
//! Provides the atomic file-write helper used by the token file store and the
//! time helpers used for entry timestamps and temp-file naming.

pub mod atomic_io;
pub mod time_utils;

pub use atomic_io::write_text_atomic;
pub use time_utils::{current_unix_timestamp, current_unix_timestamp_ms};
