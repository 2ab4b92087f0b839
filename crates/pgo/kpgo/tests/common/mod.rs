//! Shared fixtures and an independent raw-profile reader.

// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering};

use anyhow::{Result, bail, ensure};
use kpgo::{ProfData, ProfileRegions, ValueNode};

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

/// Value lists for one record, with stable heap addresses.
pub struct Lists {
    heads: Box<[AtomicPtr<ValueNode>]>,
    nodes: Vec<Box<ValueNode>>,
}

impl Lists {
    /// One list per site; each list holds the given `(value, count)` pairs
    /// in order.
    pub fn new(sites: &[&[(u64, u64)]]) -> Self {
        let heads: Box<[AtomicPtr<ValueNode>]> = sites
            .iter()
            .map(|_| AtomicPtr::new(ptr::null_mut()))
            .collect();
        let mut nodes: Vec<Box<ValueNode>> = Vec::new();
        for (site, samples) in sites.iter().enumerate() {
            let first = nodes.len();
            for &(value, count) in *samples {
                nodes.push(Box::new(ValueNode::new(value, count)));
            }
            for pair in nodes[first..].windows(2) {
                // SAFETY: Boxed nodes are kept alive by `self.nodes`.
                unsafe { pair[0].link(&pair[1]) };
            }
            if let Some(head) = nodes.get(first) {
                heads[site].store(ptr::from_ref(&**head).cast_mut(), Ordering::Release);
            }
        }
        Self { heads, nodes }
    }

    /// Empty lists for `sites` sites.
    pub fn empty(sites: usize) -> Self {
        Self::new(&vec![&[][..]; sites])
    }
}

/// Heap-backed [`ProfileRegions`].
pub struct Fixture {
    data: Vec<ProfData>,
    counters: Vec<AtomicU64>,
    names: Vec<u8>,
    pool: Vec<ValueNode>,
    lists: Vec<Lists>,
}

impl Fixture {
    pub fn new(counters: &[u64], names: &[u8]) -> Self {
        Self {
            data: Vec::new(),
            counters: counters.iter().map(|&c| AtomicU64::new(c)).collect(),
            names: names.to_vec(),
            pool: Vec::new(),
            lists: Vec::new(),
        }
    }

    /// Adds a record without value storage.
    pub fn record(mut self, name_ref: u64, num_counters: u32, sites: [u16; 2]) -> Self {
        self.data.push(ProfData::new(
            name_ref,
            name_ref ^ 0xabcd,
            ptr::null(),
            ptr::null(),
            num_counters,
            sites,
        ));
        self
    }

    /// Adds a record whose value storage is `lists`.
    pub fn record_with_lists(
        mut self,
        name_ref: u64,
        num_counters: u32,
        sites: [u16; 2],
        lists: Lists,
    ) -> Self {
        assert_eq!(
            sites.iter().map(|&s| usize::from(s)).sum::<usize>(),
            lists.heads.len()
        );
        let record = ProfData::new(
            name_ref,
            name_ref ^ 0xabcd,
            ptr::null(),
            ptr::null(),
            num_counters,
            sites,
        );
        // SAFETY: `lists` moves into the fixture, which owns the records.
        self.data
            .push(unsafe { record.with_values(lists.heads.as_ptr()) });
        self.lists.push(lists);
        self
    }

    /// Preallocates `nodes` pool nodes for the probes.
    pub fn pool(mut self, nodes: usize) -> Self {
        self.pool = (0..nodes).map(|_| ValueNode::new(0, 0)).collect();
        self
    }
}

impl ProfileRegions for Fixture {
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
        &self.pool
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

pub const MAGIC: u64 = 0xff6c_7072_6f66_7281;
const RECORD_SIZE: usize = 48;

/// Decoded raw profile.
#[derive(Debug)]
pub struct RawProfile {
    pub version: u64,
    pub data_size: u64,
    pub counters_size: u64,
    pub names_size: u64,
    pub counters_delta: u64,
    pub names_delta: u64,
    pub value_kind_last: u64,
    pub records: Vec<u8>,
    pub counters: Vec<u64>,
    pub names: Vec<u8>,
    /// Offset of the first value record.
    pub values_offset: usize,
    pub values: Vec<ValueData>,
}

/// One record's value data.
#[derive(Debug, PartialEq, Eq)]
pub struct ValueData {
    pub total_size: u32,
    pub kinds: Vec<KindRecord>,
}

/// One kind inside a record's value data.
#[derive(Debug, PartialEq, Eq)]
pub struct KindRecord {
    pub kind: u32,
    pub counts: Vec<u8>,
    pub samples: Vec<(u64, u64)>,
}

/// Parses a raw profile, including every value record up to the end.
pub fn parse(data: &[u8]) -> Result<RawProfile> {
    let mut pos = 0;
    ensure!(data.len() >= 80, "header truncated");

    let magic = read_u64(data, &mut pos);
    ensure!(magic == MAGIC, "bad magic {magic:#x}");
    let version = read_u64(data, &mut pos);
    let data_size = read_u64(data, &mut pos);
    let before_counters = read_u64(data, &mut pos);
    let counters_size = read_u64(data, &mut pos);
    let after_counters = read_u64(data, &mut pos);
    let names_size = read_u64(data, &mut pos);
    let counters_delta = read_u64(data, &mut pos);
    let names_delta = read_u64(data, &mut pos);
    let value_kind_last = read_u64(data, &mut pos);
    ensure!(before_counters == 0 && after_counters == 0, "nonzero header padding");

    let records = take(data, &mut pos, data_size as usize * RECORD_SIZE)?.to_vec();
    let counters = take(data, &mut pos, counters_size as usize * 8)?
        .chunks_exact(8)
        .map(|c| u64::from_ne_bytes(c.try_into().unwrap()))
        .collect();
    let names = take(data, &mut pos, names_size as usize)?.to_vec();

    let pad_len = (8 - pos % 8) % 8;
    let pad = take(data, &mut pos, pad_len)?;
    ensure!(pad.iter().all(|&b| b == 0), "nonzero padding after names");
    let values_offset = pos;

    let mut values = Vec::new();
    while pos < data.len() {
        values.push(parse_value_data(data, &mut pos, value_kind_last)?);
    }

    Ok(RawProfile {
        version,
        data_size,
        counters_size,
        names_size,
        counters_delta,
        names_delta,
        value_kind_last,
        records,
        counters,
        names,
        values_offset,
        values,
    })
}

fn parse_value_data(data: &[u8], pos: &mut usize, kind_last: u64) -> Result<ValueData> {
    let start = *pos;
    ensure!(*pos + 8 <= data.len(), "value header truncated");
    let total_size = read_u32(data, pos);
    let num_kinds = read_u32(data, pos);
    ensure!(num_kinds > 0, "value record without kinds at {start}");

    let mut kinds = Vec::new();
    for _ in 0..num_kinds {
        ensure!(*pos + 8 <= data.len(), "kind header truncated");
        let kind = read_u32(data, pos);
        if u64::from(kind) > kind_last {
            bail!("kind {kind} above value_kind_last {kind_last}");
        }
        let sites = read_u32(data, pos) as usize;
        let padded = take(data, pos, sites.next_multiple_of(8))?;
        ensure!(padded[sites..].iter().all(|&b| b == 0), "nonzero count padding");
        let counts = padded[..sites].to_vec();

        let n: usize = counts.iter().map(|&c| usize::from(c)).sum();
        let mut samples = Vec::with_capacity(n);
        for _ in 0..n {
            ensure!(*pos + 16 <= data.len(), "sample truncated");
            let value = read_u64(data, pos);
            let count = read_u64(data, pos);
            samples.push((value, count));
        }
        kinds.push(KindRecord {
            kind,
            counts,
            samples,
        });
    }

    ensure!(
        *pos - start == total_size as usize,
        "total_size {total_size} but record spans {} bytes",
        *pos - start
    );
    Ok(ValueData { total_size, kinds })
}

fn take<'a>(data: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8]> {
    ensure!(*pos + len <= data.len(), "truncated at {} (+{len})", *pos);
    let out = &data[*pos..*pos + len];
    *pos += len;
    Ok(out)
}

fn read_u32(data: &[u8], pos: &mut usize) -> u32 {
    let v = u32::from_ne_bytes(data[*pos..*pos + 4].try_into().unwrap());
    *pos += 4;
    v
}

fn read_u64(data: &[u8], pos: &mut usize) -> u64 {
    let v = u64::from_ne_bytes(data[*pos..*pos + 8].try_into().unwrap());
    *pos += 8;
    v
}
