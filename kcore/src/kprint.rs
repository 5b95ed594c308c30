//! Kernel print utilities.
//!
//! The kernel reports through the [`log`] facade so that whoever hosts the
//! kernel decides where messages go. Without an installed logger every
//! message is discarded.

#[doc(hidden)]
pub use log as __log;

/// Log target used by every kernel message.
pub const TARGET: &str = "kernel";

/// Display an information message.
///
/// Use the format! syntax to build the message.
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => ($crate::kprint::__log::info!(target: $crate::kprint::TARGET, $($arg)*));
}

/// Display a warning message.
///
/// Use the format! syntax to build the message.
#[macro_export]
macro_rules! warning {
    ($($arg:tt)*) => ($crate::kprint::__log::warn!(target: $crate::kprint::TARGET, $($arg)*));
}

/// Display a debug message.
///
/// Use the format! syntax to build the message.
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => ($crate::kprint::__log::debug!(target: $crate::kprint::TARGET, $($arg)*));
}
