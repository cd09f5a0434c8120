//! Per-instance log level.
//!
//! The source used a single global debug switch shared by every axis in the
//! process. Here each [`crate::coordinator::AxisCore`] carries its own level,
//! captured at construction, so one binary can run a handful of axes with
//! most at `Warn` and the one under commissioning at `Trace`.

/// Verbosity threshold for an axis instance's internal `defmt` tracing.
///
/// Ordered so `level >= LogLevel::Debug` reads naturally: `Trace` is the most
/// verbose, `Off` suppresses everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Warn
    }
}

// `defmt`'s macros need exactly one `#[global_logger]` linked into the final
// binary (e.g. `defmt-rtt` on target hardware); a plain host build never
// provides one, so `defmt` is an opt-in feature (off by default, the same
// "optional defmt" shape as `other_examples/FrenchPOC-tmc2209-rs`'s
// `default = ["blocking"]` feature table) and these macros expand to a real
// `defmt::*!` call only when it's enabled, and to a no-op (that still uses
// `$level`, so it's never flagged unused) otherwise.

/// Emit a `defmt::error!` call if `$level` permits it.
#[macro_export]
macro_rules! axis_error {
    ($level:expr, $($arg:tt)*) => {
        #[cfg(feature = "defmt")]
        if $level >= $crate::log::LogLevel::Error {
            defmt::error!($($arg)*);
        }
        #[cfg(not(feature = "defmt"))]
        let _ = $level;
    };
}

/// Emit a `defmt::warn!` call if `$level` permits it.
#[macro_export]
macro_rules! axis_warn {
    ($level:expr, $($arg:tt)*) => {
        #[cfg(feature = "defmt")]
        if $level >= $crate::log::LogLevel::Warn {
            defmt::warn!($($arg)*);
        }
        #[cfg(not(feature = "defmt"))]
        let _ = $level;
    };
}

/// Emit a `defmt::info!` call if `$level` permits it.
#[macro_export]
macro_rules! axis_info {
    ($level:expr, $($arg:tt)*) => {
        #[cfg(feature = "defmt")]
        if $level >= $crate::log::LogLevel::Info {
            defmt::info!($($arg)*);
        }
        #[cfg(not(feature = "defmt"))]
        let _ = $level;
    };
}

/// Emit a `defmt::debug!` call if `$level` permits it.
#[macro_export]
macro_rules! axis_debug {
    ($level:expr, $($arg:tt)*) => {
        #[cfg(feature = "defmt")]
        if $level >= $crate::log::LogLevel::Debug {
            defmt::debug!($($arg)*);
        }
        #[cfg(not(feature = "defmt"))]
        let _ = $level;
    };
}

/// Emit a `defmt::trace!` call if `$level` permits it.
#[macro_export]
macro_rules! axis_trace {
    ($level:expr, $($arg:tt)*) => {
        #[cfg(feature = "defmt")]
        if $level >= $crate::log::LogLevel::Trace {
            defmt::trace!($($arg)*);
        }
        #[cfg(not(feature = "defmt"))]
        let _ = $level;
    };
}
