//! Value-section sizer and writer.
//!
//! The value section is the only variable-length part of a snapshot: its
//! size depends on how long each call site's sample list is at the moment
//! the snapshot is taken. The assembler sizes the buffer with
//! [`value_size`] and fills it with [`write_value_data`]; if the two ever
//! disagreed by a single byte every record after the mismatch would be
//! misparsed.
//!
//! Both passes are therefore folds over the same [`walk`], and differ only
//! in what they do with each [`Step`].

use kpgo_core::pgo_trace;

use crate::config::MAX_VALUES_PER_SITE;
use crate::format::{
    Cursor, VALUE_DATA_HEADER_SIZE, VALUE_NODE_DATA_SIZE, ValueKind, site_count_array_size,
    value_record_size,
};
use crate::region::{ProfData, ValueNode, load_node};

// ---------------------------------------------------------------------------
// Traversal
// ---------------------------------------------------------------------------

/// One event of the value-section walk.
#[derive(Clone, Copy)]
pub(crate) enum Step<'a> {
    /// Start of a kind with at least one site.
    Kind {
        /// The kind.
        kind: ValueKind,
        /// Number of sites of this kind.
        sites: u16,
    },
    /// A sample within the per-site cap.
    Sample(&'a ValueNode),
    /// End of a site's list. Not produced for kinds without list storage.
    SiteEnd {
        /// Site index within the kind.
        site: u16,
        /// Samples produced for the site, at most [`MAX_VALUES_PER_SITE`].
        emitted: u8,
        /// Nodes walked past the cap.
        dropped: usize,
    },
}

/// Walks a record's value sites in serialization order.
///
/// Kinds are visited in tag order and skipped when they have no sites;
/// sites are visited in index order. Every list is walked to its end, but
/// only the first [`MAX_VALUES_PER_SITE`] nodes produce a [`Step::Sample`].
pub(crate) fn walk<'a>(record: &'a ProfData, mut visit: impl FnMut(Step<'a>)) {
    let heads = record.site_heads();
    let mut slot = 0;

    for kind in ValueKind::ALL {
        let sites = record.num_value_sites(kind);
        if sites == 0 {
            continue;
        }

        visit(Step::Kind { kind, sites });

        let Some(heads) = heads else {
            continue;
        };

        for (site, head) in (0..sites).zip(&heads[slot..slot + usize::from(sites)]) {
            let mut emitted: u8 = 0;
            let mut dropped = 0;
            let mut node = load_node(head);

            while let Some(n) = node {
                if usize::from(emitted) < MAX_VALUES_PER_SITE {
                    emitted += 1;
                    visit(Step::Sample(n));
                } else {
                    dropped += 1;
                }
                node = n.next();
            }

            visit(Step::SiteEnd {
                site,
                emitted,
                dropped,
            });
        }

        slot += usize::from(sites);
    }
}

// ---------------------------------------------------------------------------
// Sizer
// ---------------------------------------------------------------------------

/// Serialized size of one record's value data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValueSize {
    /// Total bytes, including the per-record header. Zero when the record
    /// has no value sites.
    pub bytes: usize,
    /// Number of kinds with at least one site.
    pub kinds: u32,
}

/// Computes the exact number of bytes [`write_value_data`] will emit for
/// `record`.
pub fn value_size(record: &ProfData) -> ValueSize {
    let mut bytes = 0;
    let mut kinds = 0;

    walk(record, |step| match step {
        Step::Kind { sites, .. } => {
            kinds += 1;
            bytes += value_record_size(usize::from(sites));
        }
        Step::Sample(_) => bytes += VALUE_NODE_DATA_SIZE,
        Step::SiteEnd { .. } => {}
    });

    if bytes != 0 {
        bytes += VALUE_DATA_HEADER_SIZE;
    }

    ValueSize { bytes, kinds }
}

/// Sums [`value_size`] over a data region.
pub fn total_value_size(data: &[ProfData]) -> usize {
    data.iter().map(|record| value_size(record).bytes).sum()
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Writes `record`'s value data at the cursor.
///
/// Advances the cursor by exactly [`value_size`]`(record).bytes`, which is
/// zero for records without value sites.
///
/// The bytes under the cursor must be zero. Count arrays of kinds without
/// list storage are skipped rather than written.
pub fn write_value_data(record: &ProfData, cursor: &mut Cursor<'_>) {
    let size = value_size(record);
    if size.kinds == 0 {
        return;
    }

    let start = cursor.position();
    // At most 2 kinds * 65535 sites * 255 samples, well below 4 GiB.
    #[allow(clippy::cast_possible_truncation)]
    cursor.put_u32(size.bytes as u32);
    cursor.put_u32(size.kinds);

    let mut counts = 0;
    walk(record, |step| match step {
        Step::Kind { kind, sites } => {
            cursor.put_u32(kind.tag());
            cursor.put_u32(u32::from(sites));
            counts = cursor.skip(site_count_array_size(usize::from(sites)));
        }
        Step::Sample(node) => cursor.put_bytes(&node.payload()),
        Step::SiteEnd {
            site,
            emitted,
            dropped,
        } => {
            cursor.patch_u8(counts + usize::from(site), emitted);
            if dropped != 0 {
                pgo_trace!(
                    "record {:#x}: site {site} truncated, {dropped} samples past the cap",
                    record.name_ref()
                );
            }
        }
    });

    debug_assert_eq!(
        cursor.position() - start,
        size.bytes,
        "value data size mismatch"
    );
}
