// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use tiered_pool::aggregator::{Aggregator, AggregatorConfig, AGGREGATOR_ROOT};
use tiered_pool::error::{PlanFailure, PoolError};
use tiered_pool::link::{Action, Condition, Link};
use tiered_pool::pool::disk::DiskDataPool;
use tiered_pool::pool::memory::MemoryDataPool;
use tiered_pool::pool::DataPool;
use tiered_pool::types::PoolMode;

fn disk_pool(dir: &TempDir, name: &str, size: u32) -> Arc<dyn DataPool> {
    Arc::new(DiskDataPool::init(dir.path().join(name), size, PoolMode::ReadWrite).unwrap())
}

/// `store()` only enqueues a plan onto the worker task; give the task a
/// chance to run before asserting on its effects. A handful of yields plus a
/// short sleep is enough for a single-threaded test runtime to drain one job.
async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn store_with_no_links_fails_with_no_valid_placement() {
    let aggregator = Aggregator::new(AggregatorConfig::default());
    let err = aggregator.store(b"data").unwrap_err();
    assert!(matches!(err, PoolError::PlanFailure(PlanFailure::NoValidPlacement)));
}

#[tokio::test]
async fn simple_copy_store_and_retrieve() {
    let dir = TempDir::new().unwrap();
    let aggregator = Aggregator::new(AggregatorConfig::default());
    let pool_id = aggregator.add_pool(disk_pool(&dir, "a.ddp", 4096));
    aggregator.add_link(AGGREGATOR_ROOT, Link { target: pool_id, action: Action::Copy, condition: Condition::None }).unwrap();

    let id = aggregator.store(b"hello aggregator").unwrap();
    settle().await;

    assert_eq!(aggregator.retrieve(id).unwrap(), b"hello aggregator");
    assert_eq!(aggregator.stored_entities(), 1);
}

#[tokio::test]
async fn move_chain_removes_replica_from_intermediate_pool() {
    let dir = TempDir::new().unwrap();
    let aggregator = Aggregator::new(AggregatorConfig::default());
    let first = aggregator.add_pool(disk_pool(&dir, "first.ddp", 4096));
    let second = aggregator.add_pool(disk_pool(&dir, "second.ddp", 4096));

    aggregator.add_link(AGGREGATOR_ROOT, Link { target: first, action: Action::Copy, condition: Condition::None }).unwrap();
    aggregator.add_link(first, Link { target: second, action: Action::Move, condition: Condition::None }).unwrap();

    let id = aggregator.store(b"moved payload").unwrap();
    settle().await;

    // Only the final pool in the MOVE chain should still hold a replica.
    let locations = aggregator.export_id_map_for_entity(id);
    assert_eq!(locations.len(), 1);
    assert_eq!(locations[0].pool_id, second);

    assert_eq!(aggregator.retrieve(id).unwrap(), b"moved payload");
}

#[tokio::test]
async fn distribute_picks_least_used_pool() {
    let aggregator = Aggregator::new(AggregatorConfig::default());
    let full = Arc::new(MemoryDataPool::new(PoolMode::ReadWrite, 1024));
    let empty = Arc::new(MemoryDataPool::new(PoolMode::ReadWrite, 1024));
    let full_id = aggregator.add_pool(full.clone());
    let empty_id = aggregator.add_pool(empty);

    full.store(&vec![0u8; 900]).unwrap();

    for target in [full_id, empty_id] {
        aggregator.add_link(AGGREGATOR_ROOT, Link { target, action: Action::Distribute, condition: Condition::None }).unwrap();
    }

    let id = aggregator.store(b"distribute me").unwrap();
    settle().await;

    let locations = aggregator.export_id_map_for_entity(id);
    assert_eq!(locations.len(), 1);
    assert_eq!(locations[0].pool_id, empty_id);
    assert_eq!(aggregator.retrieve(id).unwrap(), b"distribute me");
}

#[tokio::test]
async fn immediate_retrieve_can_race_ahead_of_the_store_worker() {
    let dir = TempDir::new().unwrap();
    let aggregator = Aggregator::new(AggregatorConfig::default());
    let pool_id = aggregator.add_pool(disk_pool(&dir, "a.ddp", 4096));
    aggregator.add_link(AGGREGATOR_ROOT, Link { target: pool_id, action: Action::Copy, condition: Condition::None }).unwrap();

    let id = aggregator.store(b"not yet placed").unwrap();

    // store() only enqueued the plan; without giving the worker a chance to
    // run, the entity isn't placed yet.
    assert!(aggregator.export_id_map_for_entity(id).is_empty());
    assert!(matches!(aggregator.retrieve(id), Err(PoolError::NotFound(_))));

    settle().await;
    assert_eq!(aggregator.retrieve(id).unwrap(), b"not yet placed");
}

#[tokio::test]
async fn timed_copy_executes_after_delay() {
    let dir = TempDir::new().unwrap();
    let aggregator = Aggregator::new(AggregatorConfig::default());
    let fast = aggregator.add_pool(disk_pool(&dir, "fast.ddp", 4096));
    let slow = aggregator.add_pool(disk_pool(&dir, "slow.ddp", 4096));

    aggregator.add_link(AGGREGATOR_ROOT, Link { target: fast, action: Action::Copy, condition: Condition::None }).unwrap();
    aggregator.add_link(fast, Link { target: slow, action: Action::Copy, condition: Condition::Timed(1) }).unwrap();

    let id = aggregator.store(b"timed payload").unwrap();
    settle().await;

    // Immediately after the store settles, only the fast pool should hold a
    // replica.
    let locations = aggregator.export_id_map_for_entity(id);
    assert_eq!(locations.len(), 1);
    assert_eq!(locations[0].pool_id, fast);

    tokio::time::sleep(Duration::from_millis(1500)).await;

    let locations = aggregator.export_id_map_for_entity(id);
    assert_eq!(locations.len(), 2);
    assert!(locations.iter().any(|l| l.pool_id == slow));
}

#[tokio::test]
async fn discard_removes_every_replica() {
    let dir = TempDir::new().unwrap();
    let aggregator = Aggregator::new(AggregatorConfig::default());
    let first = aggregator.add_pool(disk_pool(&dir, "first.ddp", 4096));
    let second = aggregator.add_pool(disk_pool(&dir, "second.ddp", 4096));

    for target in [first, second] {
        aggregator.add_link(AGGREGATOR_ROOT, Link { target, action: Action::Distribute, condition: Condition::None }).unwrap();
    }

    let id = aggregator.store(b"to discard").unwrap();
    settle().await;
    aggregator.discard(id, false).unwrap();

    assert!(matches!(aggregator.retrieve(id), Err(PoolError::NotFound(_))));
    assert!(aggregator.export_id_map_for_entity(id).is_empty());
}

#[tokio::test]
async fn discard_with_complete_discard_false_stops_at_first_failure() {
    let dir = TempDir::new().unwrap();
    // complete_discard defaults to false: a single pool failure must abort.
    let aggregator = Aggregator::new(AggregatorConfig::default());
    let pool = disk_pool(&dir, "a.ddp", 4096);
    let pool_id = aggregator.add_pool(pool.clone());
    aggregator.add_link(AGGREGATOR_ROOT, Link { target: pool_id, action: Action::Copy, condition: Condition::None }).unwrap();

    let id = aggregator.store(b"protected").unwrap();
    settle().await;

    // Clear the underlying pool out from under the aggregator so its discard
    // call fails with NotFound.
    pool.clear().unwrap();

    // The entity is still in the id map: a single pool failure with
    // complete_discard=false must propagate instead of being swallowed, and
    // must not have removed the map entry.
    assert!(aggregator.discard(id, false).is_err());
    assert!(!aggregator.export_id_map_for_entity(id).is_empty());
}

#[tokio::test]
async fn export_configuration_round_trips_links() {
    let dir = TempDir::new().unwrap();
    let aggregator = Aggregator::new(AggregatorConfig::default());
    let pool_id = aggregator.add_pool(disk_pool(&dir, "a.ddp", 4096));
    aggregator.add_link(AGGREGATOR_ROOT, Link { target: pool_id, action: Action::Copy, condition: Condition::None }).unwrap();

    let manifest = aggregator.export_configuration();
    assert_eq!(manifest.pool_uuids.len(), 1);
    assert_eq!(manifest.links.len(), 1);
    assert_eq!(manifest.links[0].target, manifest.pool_uuids[0]);
}

#[tokio::test]
async fn pool_ids_map_resolves_uuid_to_local_id() {
    let dir = TempDir::new().unwrap();
    let aggregator = Aggregator::new(AggregatorConfig::default());
    let pool = disk_pool(&dir, "a.ddp", 4096);
    let uuid = pool.uuid();
    let pool_id = aggregator.add_pool(pool);

    let map = aggregator.pool_ids_map();
    assert_eq!(map.get(&uuid), Some(&pool_id));
}
