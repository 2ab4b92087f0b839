//! Compile-time configuration.
//!
//! The values here are fixed by the raw-profile format or by the compiler
//! runtime contract; changing any of them produces profiles that
//! `llvm-profdata` rejects.

use kpgo_core::log::LogLevel;

/// Maximum number of samples kept per call site.
///
/// The per-site count array in the raw profile is one byte wide, so both
/// the probes and the serializer clamp at this value.
pub const MAX_VALUES_PER_SITE: usize = u8::MAX as usize;

/// Alignment of the value section and of every record inside it.
pub const DATA_ALIGNMENT: usize = 8;

/// Most verbose level forwarded to the log sink installed by
/// [`crate::init_logging`].
pub const MAX_LOG_LEVEL: LogLevel = LogLevel::Info;
