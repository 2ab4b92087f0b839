//! Leveled logging facade for the PGO exporter.
//!
//! The exporter runs inside the kernel, where the log backend (serial,
//! ring buffer, framebuffer console) belongs to whoever embeds it. Messages
//! go through [`pgo_log!`] and the `pgo_err!` .. `pgo_trace!` convenience
//! macros to a sink registered with [`set_log_fn`]. Until a sink is
//! registered, output is silently discarded.

use core::fmt;
use core::sync::atomic::{AtomicPtr, AtomicU8, Ordering};

// ---------------------------------------------------------------------------
// Log levels: lower = more severe
// ---------------------------------------------------------------------------

/// Log severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    /// Something failed and the request was abandoned.
    Error = 1,
    /// Unexpected condition, not necessarily an error.
    Warn = 2,
    /// High-level progress messages.
    Info = 3,
    /// Detailed diagnostic information.
    Debug = 4,
    /// Very verbose, per-item tracing.
    Trace = 5,
}

impl LogLevel {
    /// Returns the human-readable name (fixed-width for aligned output).
    pub const fn name(self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN ",
            Self::Info => "INFO ",
            Self::Debug => "DEBUG",
            Self::Trace => "TRACE",
        }
    }

    const fn from_u8(v: u8) -> Self {
        match v {
            0 | 1 => Self::Error,
            2 => Self::Warn,
            3 => Self::Info,
            4 => Self::Debug,
            _ => Self::Trace,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name().trim_end())
    }
}

// ---------------------------------------------------------------------------
// Sink registration
// ---------------------------------------------------------------------------

/// The signature of the log sink.
///
/// `target` is the module path of the call site.
pub type LogFn = fn(LogLevel, &'static str, fmt::Arguments<'_>);

fn null_log(_level: LogLevel, _target: &'static str, _args: fmt::Arguments<'_>) {}

static LOG_FN: AtomicPtr<()> = AtomicPtr::new(null_log as *mut ());

/// Most verbose level that reaches the sink.
static MAX_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

/// Registers the log sink.
///
/// # Safety
///
/// The provided function must be safe to call from any context the
/// exporter runs in, including with interrupts disabled while the profile
/// lock is held. It must not call back into the exporter.
pub unsafe fn set_log_fn(f: LogFn) {
    LOG_FN.store(f as *mut (), Ordering::Release);
}

/// Sets the most verbose level that is forwarded to the sink.
pub fn set_max_level(level: LogLevel) {
    MAX_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Returns the most verbose level that is forwarded to the sink.
pub fn max_level() -> LogLevel {
    LogLevel::from_u8(MAX_LEVEL.load(Ordering::Relaxed))
}

/// Returns whether a message at `level` would reach the sink.
#[inline]
pub fn enabled(level: LogLevel) -> bool {
    level <= max_level()
}

#[inline]
fn load_log_fn() -> LogFn {
    let ptr = LOG_FN.load(Ordering::Acquire);
    // SAFETY: Only valid `LogFn` pointers (or the initial `null_log`) are
    // ever stored into LOG_FN.
    unsafe { core::mem::transmute::<*mut (), LogFn>(ptr) }
}

/// Implementation detail for [`pgo_log!`]. Not public API.
#[doc(hidden)]
pub fn _log(level: LogLevel, target: &'static str, args: fmt::Arguments<'_>) {
    if enabled(level) {
        load_log_fn()(level, target, args);
    }
}

// ---------------------------------------------------------------------------
// Macros
// ---------------------------------------------------------------------------

/// Logs a message at the given level.
#[macro_export]
macro_rules! pgo_log {
    ($level:expr, $($arg:tt)*) => {
        $crate::log::_log($level, ::core::module_path!(), ::core::format_args!($($arg)*))
    };
}

/// Logs an error-level message.
#[macro_export]
macro_rules! pgo_err {
    ($($arg:tt)*) => { $crate::pgo_log!($crate::log::LogLevel::Error, $($arg)*) };
}

/// Logs a warning-level message.
#[macro_export]
macro_rules! pgo_warn {
    ($($arg:tt)*) => { $crate::pgo_log!($crate::log::LogLevel::Warn, $($arg)*) };
}

/// Logs a warning at most once per call site.
///
/// Used on hot instrumentation paths where a persistent condition (such as
/// an exhausted node pool) would otherwise flood the log.
#[macro_export]
macro_rules! pgo_warn_once {
    ($($arg:tt)*) => {{
        static WARNED: ::core::sync::atomic::AtomicBool =
            ::core::sync::atomic::AtomicBool::new(false);
        if !WARNED.swap(true, ::core::sync::atomic::Ordering::Relaxed) {
            $crate::pgo_warn!($($arg)*);
        }
    }};
}

/// Logs an info-level message.
#[macro_export]
macro_rules! pgo_info {
    ($($arg:tt)*) => { $crate::pgo_log!($crate::log::LogLevel::Info, $($arg)*) };
}

/// Logs a debug-level message.
#[macro_export]
macro_rules! pgo_debug {
    ($($arg:tt)*) => { $crate::pgo_log!($crate::log::LogLevel::Debug, $($arg)*) };
}

/// Logs a trace-level message.
#[macro_export]
macro_rules! pgo_trace {
    ($($arg:tt)*) => { $crate::pgo_log!($crate::log::LogLevel::Trace, $($arg)*) };
}
