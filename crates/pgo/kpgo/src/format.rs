//! LLVM raw profile (version 5) layout.
//!
//! Layout of a snapshot (all integers native-endian):
//!
//! ```text
//! HEADER (80 bytes): ten u64 fields
//!   magic, version, data_size, padding_bytes_before_counters,
//!   counters_size, padding_bytes_after_counters, names_size,
//!   counters_delta, names_delta, value_kind_last
//!
//! DATA      data_size * 48 bytes      (metadata records, verbatim)
//! COUNTERS  counters_size * 8 bytes   (counter array, verbatim)
//! NAMES     names_size bytes          (name blob, verbatim)
//! PADDING   zero bytes up to the next 8-byte boundary
//!
//! VALUES    for each metadata record with at least one value site:
//!   total_size:u32, num_value_kinds:u32
//!   for each kind with sites:
//!     kind:u32, num_value_sites:u32, counts:[u8; roundup(sites, 8)]
//!     for each site, counts[site] * (value:u64, count:u64)
//! ```

use bitflags::bitflags;
use kpgo_core::static_assert;

use crate::config::DATA_ALIGNMENT;

// ---------------------------------------------------------------------------
// Header constants
// ---------------------------------------------------------------------------

/// Raw profile magic for 64-bit producers: `\xfflprofr\x81`.
pub const RAW_MAGIC_64: u64 = (255 << 56)
    | ((b'l' as u64) << 48)
    | ((b'p' as u64) << 40)
    | ((b'r' as u64) << 32)
    | ((b'o' as u64) << 24)
    | ((b'f' as u64) << 16)
    | ((b'r' as u64) << 8)
    | 129;

/// Raw profile format version understood by `llvm-profdata`.
pub const RAW_VERSION: u64 = 5;

bitflags! {
    /// Variant bits OR-ed into the high byte of the header version.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VariantFlags: u64 {
        /// Profile was produced by IR-level instrumentation.
        const IR = 1 << 56;
        /// Profile was produced by context-sensitive IR instrumentation.
        const CSIR = 1 << 57;
    }
}

/// Size of [`RawHeader`] on the wire.
pub const HEADER_SIZE: usize = 10 * 8;

static_assert!(HEADER_SIZE % DATA_ALIGNMENT == 0, "header must keep the data region aligned");

/// Size of one counter.
pub const COUNTER_SIZE: usize = 8;

/// Size of the per-record value header (`total_size`, `num_value_kinds`).
pub const VALUE_DATA_HEADER_SIZE: usize = 8;

/// Size of a per-kind record header (`kind`, `num_value_sites`).
pub const VALUE_RECORD_HEADER_SIZE: usize = 8;

/// Size of one emitted sample (`value`, `count`).
pub const VALUE_NODE_DATA_SIZE: usize = 16;

// ---------------------------------------------------------------------------
// Value kinds
// ---------------------------------------------------------------------------

/// Kind of value sampled at a call site.
///
/// The discriminants are part of the format and index
/// [`crate::ProfData`]'s per-kind site counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u32)]
pub enum ValueKind {
    /// Targets of indirect calls.
    IndirectCallTarget = 0,
    /// Length arguments of `memcpy`/`memset`-style intrinsics.
    MemOpSize = 1,
}

impl ValueKind {
    /// Every kind, in tag order. This is the order kinds are serialized in.
    pub const ALL: [Self; 2] = [Self::IndirectCallTarget, Self::MemOpSize];

    /// Number of value kinds.
    pub const COUNT: usize = Self::ALL.len();

    /// Highest kind tag, reported in the header as `value_kind_last`.
    pub const LAST: Self = Self::MemOpSize;

    /// Returns the wire tag.
    pub const fn tag(self) -> u32 {
        self as u32
    }
}

// ---------------------------------------------------------------------------
// Size helpers
// ---------------------------------------------------------------------------

/// Number of zero bytes needed after `size` bytes to reach the next
/// 8-byte boundary.
pub const fn padding(size: usize) -> usize {
    (DATA_ALIGNMENT - 1) & (DATA_ALIGNMENT - size % DATA_ALIGNMENT)
}

/// Size of the per-site count array for `sites` sites.
pub const fn site_count_array_size(sites: usize) -> usize {
    sites.next_multiple_of(DATA_ALIGNMENT)
}

/// Size of a per-kind record header plus its count array.
pub const fn value_record_size(sites: usize) -> usize {
    VALUE_RECORD_HEADER_SIZE + site_count_array_size(sites)
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// The raw profile header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawHeader {
    /// Always [`RAW_MAGIC_64`].
    pub magic: u64,
    /// [`RAW_VERSION`] OR-ed with [`VariantFlags`].
    pub version: u64,
    /// Number of metadata records.
    pub data_size: u64,
    /// Reserved, always zero.
    pub padding_bytes_before_counters: u64,
    /// Number of counters.
    pub counters_size: u64,
    /// Reserved, always zero.
    pub padding_bytes_after_counters: u64,
    /// Length of the name blob in bytes.
    pub names_size: u64,
    /// Base address of the live counter region.
    pub counters_delta: u64,
    /// Base address of the live name region.
    pub names_delta: u64,
    /// Highest value-kind tag.
    pub value_kind_last: u64,
}

impl RawHeader {
    /// Builds an IR-variant header for the given region sizes and deltas.
    pub const fn new(
        data_count: usize,
        counters_count: usize,
        names_size: usize,
        counters_delta: u64,
        names_delta: u64,
    ) -> Self {
        Self {
            magic: RAW_MAGIC_64,
            version: VariantFlags::IR.bits() | RAW_VERSION,
            data_size: data_count as u64,
            padding_bytes_before_counters: 0,
            counters_size: counters_count as u64,
            padding_bytes_after_counters: 0,
            names_size: names_size as u64,
            counters_delta,
            names_delta,
            value_kind_last: ValueKind::LAST.tag() as u64,
        }
    }

    /// Writes the header at the cursor.
    pub fn write(&self, cursor: &mut Cursor<'_>) {
        cursor.put_u64(self.magic);
        cursor.put_u64(self.version);
        cursor.put_u64(self.data_size);
        cursor.put_u64(self.padding_bytes_before_counters);
        cursor.put_u64(self.counters_size);
        cursor.put_u64(self.padding_bytes_after_counters);
        cursor.put_u64(self.names_size);
        cursor.put_u64(self.counters_delta);
        cursor.put_u64(self.names_delta);
        cursor.put_u64(self.value_kind_last);
    }
}

// ---------------------------------------------------------------------------
// Cursor
// ---------------------------------------------------------------------------

/// Forward-only writer over a pre-sized buffer.
///
/// Writing past the end of the buffer is a sizing bug and panics.
pub struct Cursor<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    /// Creates a cursor at the start of `buf`.
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Returns the current write offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Returns the number of bytes left before the end of the buffer.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Copies `data` at the cursor.
    pub fn put_bytes(&mut self, data: &[u8]) {
        self.buf[self.pos..self.pos + data.len()].copy_from_slice(data);
        self.pos += data.len();
    }

    /// Writes a native-endian `u32`.
    pub fn put_u32(&mut self, v: u32) {
        self.put_bytes(&v.to_ne_bytes());
    }

    /// Writes a native-endian `u64`.
    pub fn put_u64(&mut self, v: u64) {
        self.put_bytes(&v.to_ne_bytes());
    }

    /// Advances past `len` bytes without writing them and returns the
    /// offset of the first skipped byte.
    ///
    /// The skipped bytes keep whatever the buffer held, which for a
    /// snapshot buffer is zero.
    pub fn skip(&mut self, len: usize) -> usize {
        assert!(len <= self.remaining(), "cursor skip past end of buffer");
        let at = self.pos;
        self.pos += len;
        at
    }

    /// Overwrites one byte at an absolute offset already passed by the cursor.
    pub fn patch_u8(&mut self, offset: usize, v: u8) {
        debug_assert!(offset < self.pos, "patch ahead of the cursor");
        self.buf[offset] = v;
    }
}
