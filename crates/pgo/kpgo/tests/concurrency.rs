//! Snapshots racing resets and probes.

mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use common::{Fixture, Lists, parse};
use kpgo::{ProfileRegions, Profiler};

#[test]
fn reset_never_tears_a_snapshot() {
    const COUNTERS: usize = 1 << 16;
    const SNAPSHOTTERS: usize = 2;

    for _ in 0..16 {
        let profiler = Arc::new(Profiler::new(Fixture::new(&vec![7; COUNTERS], b"names")));
        let barrier = Arc::new(Barrier::new(SNAPSHOTTERS + 1));

        let snapshotters: Vec<_> = (0..SNAPSHOTTERS)
            .map(|_| {
                let profiler = Arc::clone(&profiler);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..4 {
                        let snapshot = profiler.snapshot().unwrap();
                        let counters = parse(snapshot.as_bytes()).unwrap().counters;
                        let first = counters[0];
                        assert!(first == 7 || first == 0, "unexpected counter {first}");
                        assert!(
                            counters.iter().all(|&c| c == first),
                            "snapshot mixes reset and live counters"
                        );
                    }
                })
            })
            .collect();

        barrier.wait();
        profiler.reset();

        for handle in snapshotters {
            handle.join().unwrap();
        }
        assert!(profiler.regions().counters().iter().all(|c| {
            c.load(std::sync::atomic::Ordering::Relaxed) == 0
        }));
    }
}

#[test]
fn snapshots_stay_consistent_while_probes_grow_lists() {
    const SITES: usize = 4;
    const PROBERS: usize = 3;
    const CALLS: u64 = 20_000;

    let fixture = Fixture::new(&[0; 8], b"f")
        .record_with_lists(1, 8, [3, 1], Lists::empty(SITES))
        .pool(SITES * 255);
    let profiler = Arc::new(Profiler::new(fixture));

    let probers: Vec<_> = (0..PROBERS as u64)
        .map(|t| {
            let profiler = Arc::clone(&profiler);
            thread::spawn(move || {
                let record = &profiler.regions().data()[0];
                for i in 0..CALLS {
                    let value = (i * 31 + t) % 400;
                    profiler.instrument_target(record, value, (i % SITES as u64) as u32);
                }
            })
        })
        .collect();

    // The reader checks every record's total_size against what it spans.
    for _ in 0..50 {
        let snapshot = profiler.snapshot().unwrap();
        let raw = parse(snapshot.as_bytes()).unwrap();
        for kind in raw.values.iter().flat_map(|v| &v.kinds) {
            let n: usize = kind.counts.iter().map(|&c| usize::from(c)).sum();
            assert_eq!(n, kind.samples.len());
        }
    }

    for handle in probers {
        handle.join().unwrap();
    }

    let raw = parse(profiler.snapshot().unwrap().as_bytes()).unwrap();
    let kinds = &raw.values[0].kinds;
    assert_eq!(kinds[0].counts.len(), 3);
    assert_eq!(kinds[1].counts.len(), 1);
    for kind in kinds {
        assert!(kind.counts.iter().all(|&c| c == 255));
    }
    assert_eq!(profiler.nodes_used(), SITES * 255);
}
