//! Foundational low-level utilities shared across forge crates.
//!
//! Provides the atomic file-write helper behind session persistence and the
//! millisecond Unix-time helper behind metadata timestamps, retention sweeps,
//! and container-name derivation.

pub mod atomic_io;
pub mod time_utils;

pub use atomic_io::write_text_atomic;
pub use time_utils::current_unix_timestamp_ms;
