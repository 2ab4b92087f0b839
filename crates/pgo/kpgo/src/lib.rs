//! Kernel PGO exporter.
//!
//! Clang's IR-level profile instrumentation leaves three parallel regions
//! in the kernel image: per-function metadata records, the counter array,
//! and the function-name blob. Indirect-call and memory-intrinsic size
//! probes additionally build per-call-site linked lists of sampled values.
//! This crate linearizes all of it into a single LLVM raw profile
//! (`.profraw`, version 5) that `llvm-profdata merge` consumes unchanged.
//!
//! The pieces, leaves first:
//!
//! - [`format`]: raw-profile constants, header layout and the byte cursor
//! - [`region`]: read-only views over the instrumentation regions
//! - [`value`]: the value-section sizer and writer, which share one walk
//! - [`snapshot`]: the blob assembler
//! - [`profiler`]: the lock that keeps counter resets out of a snapshot
//! - [`instrument`]: the value-profiling probes that build the lists
//! - [`endpoint`]: the `profraw` / `reset` file semantics
//!
//! The live regions are injected through [`region::ProfileRegions`], so
//! everything here can be exercised against in-memory fixtures on the host.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

#[cfg(not(target_pointer_width = "64"))]
compile_error!("the raw profile layout assumes 64-bit pointers");

extern crate alloc;

pub mod config;
pub mod endpoint;
pub mod format;
pub mod instrument;
pub mod profiler;
pub mod region;
#[cfg(target_os = "none")]
pub mod section;
pub mod snapshot;
pub mod value;

#[cfg(test)]
pub(crate) mod testutil;

pub use profiler::Profiler;
pub use region::{ProfData, ProfileRegions, ValueNode};
pub use snapshot::{Snapshot, SnapshotError};

use kpgo_core::log::{LogFn, set_log_fn, set_max_level};

/// Routes exporter diagnostics to `sink`, filtered at
/// [`config::MAX_LOG_LEVEL`].
///
/// # Safety
///
/// Same contract as [`kpgo_core::log::set_log_fn`]: `sink` must be callable
/// with interrupts disabled and must not call back into the exporter.
pub unsafe fn init_logging(sink: LogFn) {
    // SAFETY: Forwarded from the caller.
    unsafe { set_log_fn(sink) };
    set_max_level(config::MAX_LOG_LEVEL);
}
