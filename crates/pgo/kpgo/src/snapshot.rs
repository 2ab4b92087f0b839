//! Blob assembler.
//!
//! A snapshot is a complete, private copy of the instrumentation state in
//! raw-profile form. Assembly sizes the whole blob up front, allocates it
//! zero-filled in one piece, and then fills it front to back:
//!
//! 1. header
//! 2. data, counter and name regions, verbatim
//! 3. zero padding to an 8-byte boundary
//! 4. one value record per metadata record that has value sites
//!
//! Either every byte is written or the caller gets an error before
//! anything is copied.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::Ordering;

use kpgo_core::{pgo_debug, pgo_err};

use crate::format::{Cursor, HEADER_SIZE, RawHeader, padding};
use crate::region::{ProfileRegions, data_bytes};
use crate::value::{total_value_size, write_value_data};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from snapshot assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotError {
    /// The output buffer could not be allocated.
    OutOfMemory {
        /// Size of the buffer that was requested.
        requested: usize,
    },
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory { requested } => {
                write!(f, "out of memory allocating {requested} byte profile")
            }
        }
    }
}

impl core::error::Error for SnapshotError {}

// ---------------------------------------------------------------------------
// Allocation
// ---------------------------------------------------------------------------

/// Source of zero-initialized output buffers.
///
/// The value writer skips count arrays that have nothing to record and
/// relies on them already being zero, so implementations must hand back
/// exactly `len` zero bytes or nothing.
pub trait ZeroedAlloc {
    /// Allocates `len` zero bytes, or returns `None` if memory is short.
    fn alloc_zeroed(&self, len: usize) -> Option<Box<[u8]>>;
}

/// [`ZeroedAlloc`] backed by the global allocator.
///
/// Never aborts on allocation failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalZeroed;

impl ZeroedAlloc for GlobalZeroed {
    fn alloc_zeroed(&self, len: usize) -> Option<Box<[u8]>> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(len).ok()?;
        buf.resize(len, 0);
        Some(buf.into_boxed_slice())
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// An assembled raw profile.
///
/// Owns its bytes; nothing in it aliases the live regions.
pub struct Snapshot {
    buf: Box<[u8]>,
}

impl Snapshot {
    /// The raw profile bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Length of the raw profile in bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Always `false`: even an empty image produces a header.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Copies bytes starting at `offset` into `buf`.
    ///
    /// Returns the number of bytes copied, which is zero at or past the end.
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> usize {
        if offset >= self.buf.len() {
            return 0;
        }
        let available = &self.buf[offset..];
        let to_copy = buf.len().min(available.len());
        buf[..to_copy].copy_from_slice(&available[..to_copy]);
        to_copy
    }

    /// Consumes the snapshot and returns its bytes.
    pub fn into_bytes(self) -> Box<[u8]> {
        self.buf
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot").field("len", &self.len()).finish()
    }
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

/// Computes the exact size of a snapshot of `regions`.
pub fn snapshot_size<R: ProfileRegions + ?Sized>(regions: &R) -> usize {
    let names_size = regions.names_size();
    HEADER_SIZE
        + regions.data_size()
        + regions.counters_size()
        + names_size
        + padding(names_size)
        + total_value_size(regions.data())
}

/// Assembles a snapshot of `regions`.
///
/// Callers that can race with a counter reset must hold the profile lock;
/// [`crate::Profiler::snapshot`] does so.
pub fn assemble<R, A>(regions: &R, alloc: &A) -> Result<Snapshot, SnapshotError>
where
    R: ProfileRegions + ?Sized,
    A: ZeroedAlloc + ?Sized,
{
    let size = snapshot_size(regions);
    let Some(mut buf) = alloc.alloc_zeroed(size) else {
        pgo_err!("cannot allocate {size} bytes for profile snapshot");
        return Err(SnapshotError::OutOfMemory { requested: size });
    };
    debug_assert_eq!(buf.len(), size, "allocator returned a short buffer");

    let data = regions.data();
    let counters = regions.counters();
    let names = regions.names();

    let mut cursor = Cursor::new(&mut buf);

    RawHeader::new(
        data.len(),
        counters.len(),
        names.len(),
        regions.counters_delta(),
        regions.names_delta(),
    )
    .write(&mut cursor);

    cursor.put_bytes(data_bytes(data));
    for counter in counters {
        cursor.put_u64(counter.load(Ordering::Relaxed));
    }
    cursor.put_bytes(names);
    cursor.skip(padding(names.len()));

    let values_start = cursor.position();
    for record in data {
        write_value_data(record, &mut cursor);
    }

    debug_assert_eq!(cursor.position(), size, "snapshot size mismatch");
    pgo_debug!(
        "profile snapshot: {} records, {} counters, {} name bytes, {} value bytes",
        data.len(),
        counters.len(),
        names.len(),
        size - values_start
    );

    Ok(Snapshot { buf })
}
