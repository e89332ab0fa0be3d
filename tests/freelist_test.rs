// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Fragmentation/coalescing scenarios closer to what a real pool produces
//! over many store/discard cycles, beyond `freelist.rs`'s single-operation
//! unit tests.

use tiered_pool::freelist::FreeList;

#[test]
fn alternating_alloc_and_free_fully_reclaims_the_region() {
    let mut fl = FreeList::new();
    fl.reset_single_chunk(0, 1000);

    let mut allocations = Vec::new();
    for _ in 0..10 {
        let addr = fl.allocate(50).unwrap();
        allocations.push((addr, 50));
    }
    assert_eq!(fl.total_free(), 500);

    // Free every other allocation first, fragmenting the region.
    for &(addr, size) in allocations.iter().step_by(2) {
        fl.free(addr, size);
    }
    assert!(fl.chunk_count() >= 5);

    // Freeing the rest should coalesce everything back into one chunk.
    for &(addr, size) in allocations.iter().skip(1).step_by(2) {
        fl.free(addr, size);
    }
    assert_eq!(fl.chunk_count(), 1);
    assert_eq!(fl.total_free(), 1000);
    assert_eq!(fl.largest_chunk(), 1000);
}

#[test]
fn allocation_fails_once_region_is_exhausted() {
    let mut fl = FreeList::new();
    fl.reset_single_chunk(0, 100);

    assert!(fl.allocate(60).is_some());
    assert!(fl.allocate(60).is_none());
    assert!(fl.allocate(40).is_some());
}

#[test]
fn non_adjacent_free_ranges_stay_separate_chunks() {
    let mut fl = FreeList::new();
    fl.free(0, 10);
    fl.free(50, 10);
    assert_eq!(fl.chunk_count(), 2);
    assert!(!fl.can_fit(11));
}
