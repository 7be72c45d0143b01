//! Logging facade
//!
//! With the `log` feature the macros of the [`log`] crate are used, without it
//! every call compiles to nothing.

#[cfg(feature = "log")]
#[allow(unused_imports)]
pub(crate) use log::{debug, error, info, log_enabled, trace, warn, Level};

#[cfg(not(feature = "log"))]
macro_rules! log_mock {
    (target: $target:expr, $($arg:tt)+) => {};
    ($($arg:tt)+) => {};
}

#[cfg(not(feature = "log"))]
macro_rules! log_enabled {
    (target: $target:expr, $($arg:tt)+) => {
        false
    };
    ($($arg:tt)+) => {
        false
    };
}

/// Verbosity levels, mirrors `log::Level` for `log_enabled!` checks.
#[cfg(not(feature = "log"))]
#[allow(dead_code)]
#[repr(usize)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub(crate) enum Level {
    Error = 1,
    Warn,
    Info,
    Debug,
    Trace,
}

#[cfg(not(feature = "log"))]
#[allow(unused_imports)]
pub(crate) use {
    log_enabled, log_mock as debug, log_mock as error, log_mock as info, log_mock as trace,
    log_mock as warn,
};
