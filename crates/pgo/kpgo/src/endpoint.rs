//! File semantics of the `pgo` directory.
//!
//! The kernel exposes the exporter as two pseudo-files:
//!
//! - `pgo/profraw` (0644): opening it takes a snapshot; reads at any
//!   offset are served from that snapshot; closing it frees the snapshot.
//! - `pgo/reset` (0666): any write zeroes the counters and reports the
//!   whole payload as consumed. Reads return nothing, so recursive copies
//!   of the directory do not fail on it.
//!
//! Mounting these into a concrete filesystem is left to the kernel.

use crate::profiler::Profiler;
use crate::region::ProfileRegions;
use crate::snapshot::{Snapshot, SnapshotError, ZeroedAlloc};

/// Name of the directory holding both files.
pub const PGO_DIR: &str = "pgo";

/// Name of the raw profile file.
pub const PROFRAW_NAME: &str = "profraw";

/// Permission bits of the raw profile file.
pub const PROFRAW_MODE: u16 = 0o644;

/// Name of the counter reset file.
pub const RESET_NAME: &str = "reset";

/// Permission bits of the counter reset file.
pub const RESET_MODE: u16 = 0o666;

/// An open handle on `pgo/profraw`.
///
/// Holds one snapshot for its whole lifetime; dropping the handle releases
/// it.
#[derive(Debug)]
pub struct ProfrawFile {
    snapshot: Snapshot,
}

impl ProfrawFile {
    /// Opens the file, taking a fresh snapshot.
    pub fn open<R, A>(profiler: &Profiler<R, A>) -> Result<Self, SnapshotError>
    where
        R: ProfileRegions,
        A: ZeroedAlloc,
    {
        Ok(Self {
            snapshot: profiler.snapshot()?,
        })
    }

    /// Size of the file contents.
    pub fn len(&self) -> usize {
        self.snapshot.len()
    }

    /// Always `false`.
    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }

    /// Reads from `offset`, returning the number of bytes copied.
    pub fn read(&self, offset: usize, buf: &mut [u8]) -> usize {
        self.snapshot.read_at(offset, buf)
    }

    /// The snapshot backing this handle.
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }
}

/// The `pgo/reset` file.
pub struct ResetFile<'a, R, A> {
    profiler: &'a Profiler<R, A>,
}

impl<'a, R: ProfileRegions, A: ZeroedAlloc> ResetFile<'a, R, A> {
    /// Binds the reset file to an exporter.
    pub fn new(profiler: &'a Profiler<R, A>) -> Self {
        Self { profiler }
    }

    /// Resets the counters. The payload is ignored and reported as
    /// consumed in full.
    pub fn write(&self, buf: &[u8]) -> usize {
        self.profiler.reset();
        buf.len()
    }

    /// Always reads zero bytes.
    pub fn read(&self, _buf: &mut [u8]) -> usize {
        0
    }
}
