//! Value-profiling probes.
//!
//! Clang lowers value-profiling sites to calls into these hooks. Each
//! call site owns a singly linked list of [`ValueNode`]s holding the
//! distinct values seen there and how often. Lists are capped at
//! [`MAX_VALUES_PER_SITE`] nodes; once full, a new value can only take
//! over the least-frequent node after that node's count has decayed to
//! zero.
//!
//! Nodes come from the preallocated pool in
//! [`ProfileRegions::value_nodes`] and are never freed.

use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

use kpgo_core::pgo_warn_once;

use crate::config::MAX_VALUES_PER_SITE;
use crate::profiler::{PoolState, Profiler};
use crate::region::{ProfData, ProfileRegions, ValueNode, load_node};
use crate::snapshot::ZeroedAlloc;

/// What the lock-free pass over a site's list found.
enum Scan<'a> {
    /// The value was already present; its count has been bumped.
    Hit,
    /// The list is full; `min` is its least-frequent node.
    Full { min: &'a ValueNode },
    /// The value is absent and the list has room.
    Miss,
}

fn scan(head: &AtomicPtr<ValueNode>, value: u64) -> Scan<'_> {
    let mut node = load_node(head);
    let mut min: Option<&ValueNode> = None;
    let mut len = 0;

    while let Some(n) = node {
        if n.value() == value {
            n.count_cell().fetch_add(1, Ordering::Relaxed);
            return Scan::Hit;
        }
        if min.is_none_or(|m| n.count() < m.count()) {
            min = Some(n);
        }
        len += 1;
        node = n.next();
    }

    match min {
        Some(min) if len >= MAX_VALUES_PER_SITE => Scan::Full { min },
        _ => Scan::Miss,
    }
}

impl<R: ProfileRegions, A: ZeroedAlloc> Profiler<R, A> {
    /// Records one observation of `value` at site `index` of `record`.
    ///
    /// `index` counts sites across all kinds, in kind order. Records
    /// without list storage and out-of-range indices are ignored.
    pub fn instrument_target(&self, record: &ProfData, value: u64, index: u32) {
        let Some(heads) = record.site_heads() else {
            return;
        };
        let Some(head) = heads.get(index as usize) else {
            return;
        };

        match scan(head, value) {
            Scan::Hit => {}
            Scan::Full { min } => {
                // Decay the least-frequent value; take its slot once it
                // reaches zero.
                let count = min.count();
                if count <= 1 {
                    min.set_sample(value, 1);
                } else {
                    min.count_cell().fetch_sub(1, Ordering::Relaxed);
                }
            }
            Scan::Miss => self.insert(record, head, value),
        }
    }

    /// Records one observation of a memory-intrinsic size.
    ///
    /// Sizes in `[precise_start, precise_last]` are recorded exactly.
    /// Sizes of at least `large_value` collapse to `large_value` unless it
    /// is `i64::MIN`, which disables that bucket. Everything else collapses
    /// to `precise_last + 1`.
    pub fn instrument_range(
        &self,
        record: &ProfData,
        value: u64,
        index: u32,
        precise_start: i64,
        precise_last: i64,
        large_value: i64,
    ) {
        let signed = value as i64;
        let bucket = if large_value != i64::MIN && signed >= large_value {
            large_value
        } else if signed < precise_start || signed > precise_last {
            precise_last.wrapping_add(1)
        } else {
            signed
        };
        self.instrument_target(record, bucket as u64, index);
    }

    /// Appends a fresh node for `value`, unless another CPU beat us to it.
    fn insert(&self, record: &ProfData, head: &AtomicPtr<ValueNode>, value: u64) {
        let mut pool = self.lock.lock();

        // Re-walk under the lock: the list may have grown since `scan`.
        let mut tail: Option<&ValueNode> = None;
        let mut len = 0;
        let mut node = load_node(head);
        while let Some(n) = node {
            if n.value() == value {
                n.count_cell().fetch_add(1, Ordering::Relaxed);
                return;
            }
            len += 1;
            tail = Some(n);
            node = n.next();
        }
        if len >= MAX_VALUES_PER_SITE {
            return;
        }

        let Some(new) = self.allocate_node(&mut pool, record) else {
            return;
        };
        new.set_sample(value, 1);

        match tail {
            Some(tail) => {
                debug_assert!(!tail.has_next());
                // SAFETY: Pool nodes live in the image for as long as the
                // records that point at them.
                unsafe { tail.link(new) };
            }
            None => head.store(ptr::from_ref(new).cast_mut(), Ordering::Release),
        }
    }

    /// Takes the next node from the pool.
    fn allocate_node(&self, pool: &mut PoolState, record: &ProfData) -> Option<&ValueNode> {
        // Only records inside the image's data region may take nodes; the
        // pool has no way to get them back from anyone else.
        if !self.regions().contains_record(record) {
            return None;
        }

        let nodes = self.regions().value_nodes();
        let Some(node) = nodes.get(pool.next_node) else {
            pgo_warn_once!(
                "value node pool exhausted ({} nodes), dropping samples",
                nodes.len()
            );
            return None;
        };
        pool.next_node += 1;
        Some(node)
    }
}
