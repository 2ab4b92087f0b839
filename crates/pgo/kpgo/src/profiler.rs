//! Profile lock and the snapshot/reset entry points.
//!
//! One [`IrqSpinLock`] serializes everything that must not interleave:
//!
//! - sizing and copying a snapshot
//! - zeroing the counters
//! - taking a node from the value pool and linking it into a site list
//!
//! The last point is what keeps the sizer and writer in agreement: list
//! structure only changes under the lock, so both passes of a snapshot see
//! the same lists. Probes still bump counts and recycle nodes without the
//! lock; those only change payload bytes, never sizes.
//!
//! Concurrent snapshots serialize on the lock as well. Each one still gets
//! its own buffer.

use core::sync::atomic::Ordering;

use kpgo_core::pgo_info;
use kpgo_core::sync::IrqSpinLock;

use crate::region::ProfileRegions;
use crate::snapshot::{GlobalZeroed, Snapshot, SnapshotError, ZeroedAlloc, assemble};

/// State protected by the profile lock.
pub(crate) struct PoolState {
    /// Index of the next unused node in [`ProfileRegions::value_nodes`].
    pub(crate) next_node: usize,
}

/// Exporter bound to one set of instrumentation regions.
pub struct Profiler<R, A = GlobalZeroed> {
    regions: R,
    alloc: A,
    pub(crate) lock: IrqSpinLock<PoolState>,
}

impl<R: ProfileRegions> Profiler<R> {
    /// Creates an exporter that allocates snapshots from the global heap.
    ///
    /// Snapshots allocate with the profile lock held and interrupts
    /// disabled, so the kernel's global allocator must not sleep. Use
    /// [`Self::with_allocator`] otherwise.
    pub const fn new(regions: R) -> Self {
        Self::with_allocator(regions, GlobalZeroed)
    }
}

impl<R: ProfileRegions, A: ZeroedAlloc> Profiler<R, A> {
    /// Creates an exporter with a custom snapshot allocator.
    ///
    /// `alloc` is called with the profile lock held and interrupts
    /// disabled, so it must not sleep.
    pub const fn with_allocator(regions: R, alloc: A) -> Self {
        Self {
            regions,
            alloc,
            lock: IrqSpinLock::named("pgo", PoolState { next_node: 0 }),
        }
    }

    /// The instrumentation regions.
    pub fn regions(&self) -> &R {
        &self.regions
    }

    /// Produces a raw profile of the current instrumentation state.
    ///
    /// The counters in the result are either all from before or all from
    /// after any concurrent [`Self::reset`].
    pub fn snapshot(&self) -> Result<Snapshot, SnapshotError> {
        let _guard = self.lock.lock();
        assemble(&self.regions, &self.alloc)
    }

    /// Zeroes every counter.
    ///
    /// Value lists are left alone.
    pub fn reset(&self) {
        let counters = self.regions.counters();
        {
            let _guard = self.lock.lock();
            for counter in counters {
                counter.store(0, Ordering::Relaxed);
            }
        }
        pgo_info!("reset {} profile counters", counters.len());
    }

    /// Number of value nodes handed out from the pool so far.
    pub fn nodes_used(&self) -> usize {
        self.lock.lock().next_node
    }
}
