//! Integration test for the frame-boundary protocol across threads.

use framesync_core::{DeferredMap, FrameTracker, Guid, LayeredDeferredMap, TripleBuffer};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

#[test]
fn test_consumer_only_sees_whole_frames() {
    const FRAMES: u64 = 2_000;

    let tracker = FrameTracker::new();
    // Both halves are written in every frame; a consumer must never see
    // them disagree.
    let left = TripleBuffer::tracked(&tracker, 0_u64);
    let right = TripleBuffer::tracked(&tracker, 0_u64);

    let published = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let done = Arc::new(AtomicBool::new(false));

    let producer = {
        let tracker = tracker.clone();
        let (left, right) = (left.clone(), right.clone());
        let published = Arc::clone(&published);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            for frame in 1..=FRAMES {
                left.write(frame);
                right.write(frame);
                // Commit and activation never overlap.
                let mut queue = published.lock();
                queue.push(tracker.commit_touched());
            }
            done.store(true, Ordering::Release);
        })
    };

    let mut last = 0;
    loop {
        let finished = done.load(Ordering::Acquire);
        let polled = {
            let mut queue = published.lock();
            let polled = !queue.is_empty();
            for set in queue.drain(..) {
                tracker.activate(set);
            }
            polled
        };

        let (l, r) = (*left.read_active(), *right.read_active());
        assert_eq!(l, r);
        assert!(l >= last);
        last = l;

        if finished && !polled {
            break;
        }
    }

    producer.join().unwrap();
    assert_eq!(last, FRAMES);
}

#[test]
fn test_deferred_map_concurrent_writers_and_committer() {
    const WRITERS: u64 = 4;
    const PER_WRITER: u64 = 500;

    let map: DeferredMap<u64, u64> = DeferredMap::new();
    let written = Arc::new(AtomicU64::new(0));

    let writers: Vec<_> = (0..WRITERS)
        .map(|w| {
            let map = map.clone();
            let written = Arc::clone(&written);
            thread::spawn(move || {
                for i in 0..PER_WRITER {
                    let key = w * PER_WRITER + i;
                    map.add(key, key * 2);
                    // Point lookups always read the writer's own adds.
                    assert_eq!(map.get(&key), Ok(key * 2));
                    written.fetch_add(1, Ordering::Release);
                }
            })
        })
        .collect();

    // Commit cycles interleaved with the writers.
    while written.load(Ordering::Acquire) < WRITERS * PER_WRITER {
        map.freeze();
        map.commit();
        thread::yield_now();
    }
    for writer in writers {
        writer.join().unwrap();
    }
    map.freeze();
    map.commit();

    assert_eq!(map.pending_len(), 0);
    assert_eq!(map.len_committed() as u64, WRITERS * PER_WRITER);
    let mut entries = map.entries();
    entries.sort_unstable();
    assert!(entries.iter().all(|(k, v)| *v == k * 2));
}

#[test]
fn test_layered_bindings_commit_with_tracker() {
    let tracker = FrameTracker::new();
    let bindings: LayeredDeferredMap<u32, Guid, TripleBuffer<Guid>> =
        LayeredDeferredMap::tracked(&tracker);
    let vb0 = Guid::new("protocol_test_VB0");
    let cube = Guid::new("protocol_test_cube");
    let sphere = Guid::new("protocol_test_sphere");

    bindings.add_inner(7, vb0, TripleBuffer::tracked(&tracker, cube));
    assert!(bindings.outer_keys().is_empty());
    let frame_a = tracker.commit_touched();
    tracker.activate(frame_a);
    assert_eq!(bindings.outer_keys(), vec![7]);

    let cell = bindings.get(&7, &vb0).unwrap();
    cell.write(sphere);
    let frame_b = tracker.commit_touched();
    assert_eq!(*cell.read_active(), cube);
    tracker.activate(frame_b);
    assert_eq!(*bindings.get(&7, &vb0).unwrap().read_active(), sphere);
    assert!(cell.was_updated());
}
