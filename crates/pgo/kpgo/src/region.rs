//! Read-only views over the instrumentation regions.
//!
//! The compiler emits one [`ProfData`] per instrumented function into a
//! contiguous data region, one `u64` per counter into the counter region,
//! and the (possibly compressed) function names into the name region.
//! Value profiling adds a pool of [`ValueNode`]s that the probes link into
//! per-site lists hanging off each record.
//!
//! None of these are owned by the exporter. [`ProfileRegions`] is the
//! handle through which they are injected: the kernel implements it over
//! the linker sections (see `section`), tests over heap fixtures.

use core::ffi::c_void;
use core::ptr;
use core::sync::atomic::{AtomicPtr, AtomicU64, Ordering};

use kpgo_core::assert_layout;

use crate::format::{COUNTER_SIZE, ValueKind};

// ---------------------------------------------------------------------------
// ValueNode
// ---------------------------------------------------------------------------

/// One sampled value at a call site, linked into that site's list.
///
/// The first two fields are emitted verbatim as the sample payload.
#[repr(C)]
pub struct ValueNode {
    value: AtomicU64,
    count: AtomicU64,
    next: AtomicPtr<ValueNode>,
}

assert_layout!(ValueNode, size = 24, align = 8);

impl ValueNode {
    /// Creates an unlinked node.
    pub const fn new(value: u64, count: u64) -> Self {
        Self {
            value: AtomicU64::new(value),
            count: AtomicU64::new(count),
            next: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Returns the sampled value.
    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Returns how many times the value was observed.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Returns the next node in the site's list.
    pub fn next(&self) -> Option<&ValueNode> {
        let next = self.next.load(Ordering::Acquire);
        // SAFETY: `next` is either null or was stored by `link`, whose
        // contract requires the target to outlive this node.
        unsafe { next.as_ref() }
    }

    /// Links `next` after this node, replacing any existing successor.
    ///
    /// # Safety
    ///
    /// `next` must stay valid, and must not move, for as long as this node
    /// can be reached from a [`ProfData`].
    pub unsafe fn link(&self, next: &ValueNode) {
        self.next
            .store(ptr::from_ref(next).cast_mut(), Ordering::Release);
    }

    /// The 16-byte `(value, count)` payload as written to the profile.
    pub(crate) fn payload(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[..8].copy_from_slice(&self.value().to_ne_bytes());
        out[8..].copy_from_slice(&self.count().to_ne_bytes());
        out
    }

    pub(crate) fn set_sample(&self, value: u64, count: u64) {
        self.value.store(value, Ordering::Relaxed);
        self.count.store(count, Ordering::Relaxed);
    }

    pub(crate) fn count_cell(&self) -> &AtomicU64 {
        &self.count
    }

    pub(crate) fn has_next(&self) -> bool {
        !self.next.load(Ordering::Acquire).is_null()
    }
}

/// Loads a list head or link without dereferencing it.
pub(crate) fn load_node(slot: &AtomicPtr<ValueNode>) -> Option<&ValueNode> {
    let head = slot.load(Ordering::Acquire);
    // SAFETY: Head slots only ever hold null or pointers to nodes that
    // outlive the owning record (contract of `ProfData::with_values` and
    // of the node pool).
    unsafe { head.as_ref() }
}

// ---------------------------------------------------------------------------
// ProfData
// ---------------------------------------------------------------------------

/// Per-function metadata record, laid out exactly as clang emits it.
///
/// The serializer copies the whole data region verbatim, so the field
/// order and widths here are part of the raw-profile format.
#[repr(C, align(8))]
pub struct ProfData {
    name_ref: u64,
    func_hash: u64,
    counter_ptr: *const u64,
    function_ptr: *const c_void,
    values: *const AtomicPtr<ValueNode>,
    num_counters: u32,
    num_value_sites: [u16; ValueKind::COUNT],
}

assert_layout!(ProfData, size = 48, align = 8);

// SAFETY: The raw pointers are never written through by the exporter
// except via the atomic head slots behind `values`.
unsafe impl Send for ProfData {}
unsafe impl Sync for ProfData {}

impl ProfData {
    /// Creates a record whose value sites have no list storage.
    ///
    /// `counter_ptr` and `function_ptr` are opaque to the exporter and are
    /// only copied into the profile.
    pub const fn new(
        name_ref: u64,
        func_hash: u64,
        counter_ptr: *const u64,
        function_ptr: *const c_void,
        num_counters: u32,
        num_value_sites: [u16; ValueKind::COUNT],
    ) -> Self {
        Self {
            name_ref,
            func_hash,
            counter_ptr,
            function_ptr,
            values: ptr::null(),
            num_counters,
            num_value_sites,
        }
    }

    /// Attaches the per-site list heads.
    ///
    /// # Safety
    ///
    /// `values` must be null or point to [`Self::total_sites`] head slots,
    /// one per site in kind order, that stay valid for the lifetime of the
    /// record. Every node reachable from those slots must do the same.
    pub const unsafe fn with_values(mut self, values: *const AtomicPtr<ValueNode>) -> Self {
        self.values = values;
        self
    }

    /// Hash of the function name, used to look the name up.
    pub fn name_ref(&self) -> u64 {
        self.name_ref
    }

    /// Structural hash of the function's control flow graph.
    pub fn func_hash(&self) -> u64 {
        self.func_hash
    }

    /// Number of counters belonging to the function.
    pub fn num_counters(&self) -> u32 {
        self.num_counters
    }

    /// Number of call sites of the given kind.
    pub fn num_value_sites(&self, kind: ValueKind) -> u16 {
        self.num_value_sites[kind as usize]
    }

    /// Number of call sites across all kinds.
    pub fn total_sites(&self) -> usize {
        self.num_value_sites.iter().map(|&n| usize::from(n)).sum()
    }

    /// Returns the per-site list heads, or `None` if the record has no list
    /// storage.
    ///
    /// Slots are ordered by kind, then by site index within the kind.
    pub fn site_heads(&self) -> Option<&[AtomicPtr<ValueNode>]> {
        if self.values.is_null() {
            return None;
        }
        // SAFETY: `with_values` requires `values` to point to
        // `total_sites()` valid slots for the lifetime of `self`.
        Some(unsafe { core::slice::from_raw_parts(self.values, self.total_sites()) })
    }
}

/// Views a data region as the bytes that are copied into the profile.
pub fn data_bytes(data: &[ProfData]) -> &[u8] {
    // SAFETY: `ProfData` is `repr(C)` with no padding (pinned by
    // `assert_layout!`), so every byte of the slice is initialized.
    unsafe { core::slice::from_raw_parts(data.as_ptr().cast::<u8>(), size_of_val(data)) }
}

// ---------------------------------------------------------------------------
// ProfileRegions
// ---------------------------------------------------------------------------

/// Handle to the instrumentation regions of a running image.
///
/// Implementations hand out the same slices on every call; the exporter
/// relies on the regions neither moving nor changing length.
pub trait ProfileRegions: Sync {
    /// The metadata records, in address order.
    fn data(&self) -> &[ProfData];

    /// The counter array. Probes increment these concurrently.
    fn counters(&self) -> &[AtomicU64];

    /// The function-name blob.
    fn names(&self) -> &[u8];

    /// Preallocated nodes for the value-profiling probes.
    fn value_nodes(&self) -> &[ValueNode] {
        &[]
    }

    /// Value reported as `counters_delta`: the counter region's base address.
    fn counters_delta(&self) -> u64 {
        self.counters().as_ptr() as u64
    }

    /// Value reported as `names_delta`: the name region's base address.
    fn names_delta(&self) -> u64 {
        self.names().as_ptr() as u64
    }

    /// Byte length of the data region.
    fn data_size(&self) -> usize {
        size_of_val(self.data())
    }

    /// Byte length of the counter region.
    fn counters_size(&self) -> usize {
        self.counters().len() * COUNTER_SIZE
    }

    /// Byte length of the name region.
    fn names_size(&self) -> usize {
        self.names().len()
    }

    /// Returns whether `record` lives inside [`Self::data`].
    fn contains_record(&self, record: &ProfData) -> bool {
        self.data()
            .as_ptr_range()
            .contains(&ptr::from_ref(record))
    }
}
