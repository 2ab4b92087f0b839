//! Heap-backed instrumentation fixtures for unit tests.

use core::ptr;
use core::sync::atomic::{AtomicPtr, AtomicU64, Ordering};

use crate::format::ValueKind;
use crate::region::{ProfData, ProfileRegions, ValueNode};

/// Per-site value lists with stable addresses.
pub(crate) struct SiteLists {
    heads: Box<[AtomicPtr<ValueNode>]>,
    _nodes: Vec<Box<ValueNode>>,
}

impl SiteLists {
    /// Builds one list per entry of `lengths`. Node `i` of site `s` holds
    /// [`Self::value_of`]`(s, i)` with count `i + 1`.
    pub(crate) fn new(lengths: &[usize]) -> Self {
        let heads: Box<[AtomicPtr<ValueNode>]> = lengths
            .iter()
            .map(|_| AtomicPtr::new(ptr::null_mut()))
            .collect();
        let mut nodes = Vec::new();
        for (site, &len) in lengths.iter().enumerate() {
            let mut prev: Option<*const ValueNode> = None;
            for i in 0..len {
                let node = Box::new(ValueNode::new(Self::value_of(site, i), i as u64 + 1));
                let raw = ptr::from_ref(&*node);
                match prev {
                    // SAFETY: Boxed nodes never move and live in `nodes`.
                    Some(p) => unsafe { (*p).link(&*raw) },
                    None => heads[site].store(raw.cast_mut(), Ordering::Release),
                }
                prev = Some(raw);
                nodes.push(node);
            }
        }
        Self {
            heads,
            _nodes: nodes,
        }
    }

    /// Value stored in node `i` of site `site`.
    pub(crate) fn value_of(site: usize, i: usize) -> u64 {
        ((site as u64) << 32) | (i as u64 + 0x100)
    }

    /// Builds a record whose value storage is these lists.
    pub(crate) fn record(&self, name_ref: u64, sites: [u16; ValueKind::COUNT]) -> ProfData {
        let total: usize = sites.iter().map(|&n| usize::from(n)).sum();
        assert_eq!(total, self.heads.len(), "site counts must match list count");
        let record = ProfData::new(name_ref, 0, ptr::null(), ptr::null(), 0, sites);
        // SAFETY: The heads and nodes are boxed and outlive the record in
        // every test that uses it.
        unsafe { record.with_values(self.heads.as_ptr()) }
    }
}

/// In-memory stand-in for the linker regions.
pub(crate) struct MemRegions {
    data: Vec<ProfData>,
    counters: Vec<AtomicU64>,
    names: Vec<u8>,
    nodes: Vec<ValueNode>,
    _lists: Vec<SiteLists>,
}

impl MemRegions {
    pub(crate) fn builder() -> MemRegionsBuilder {
        MemRegionsBuilder::default()
    }

    pub(crate) fn counter_values(&self) -> Vec<u64> {
        self.counters
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .collect()
    }
}

impl ProfileRegions for MemRegions {
    fn data(&self) -> &[ProfData] {
        &self.data
    }

    fn counters(&self) -> &[AtomicU64] {
        &self.counters
    }

    fn names(&self) -> &[u8] {
        &self.names
    }

    fn value_nodes(&self) -> &[ValueNode] {
        &self.nodes
    }
}

#[derive(Default)]
pub(crate) struct MemRegionsBuilder {
    data: Vec<ProfData>,
    counters: Vec<u64>,
    names: Vec<u8>,
    pool: usize,
    lists: Vec<SiteLists>,
}

impl MemRegionsBuilder {
    pub(crate) fn record(mut self, record: ProfData) -> Self {
        self.data.push(record);
        self
    }

    pub(crate) fn record_with_lists(
        mut self,
        name_ref: u64,
        sites: [u16; ValueKind::COUNT],
        lists: SiteLists,
    ) -> Self {
        self.data.push(lists.record(name_ref, sites));
        self.lists.push(lists);
        self
    }

    pub(crate) fn counters(mut self, counters: &[u64]) -> Self {
        self.counters = counters.to_vec();
        self
    }

    pub(crate) fn names(mut self, names: &[u8]) -> Self {
        self.names = names.to_vec();
        self
    }

    pub(crate) fn pool(mut self, nodes: usize) -> Self {
        self.pool = nodes;
        self
    }

    pub(crate) fn build(self) -> MemRegions {
        MemRegions {
            data: self.data,
            counters: self.counters.into_iter().map(AtomicU64::new).collect(),
            names: self.names,
            nodes: (0..self.pool).map(|_| ValueNode::new(0, 0)).collect(),
            _lists: self.lists,
        }
    }
}
