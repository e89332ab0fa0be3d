// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

use std::collections::HashMap;
use std::sync::Arc;

use tiered_pool::error::{PlanFailure, PoolError};
use tiered_pool::link::{Action, Condition, Link, LinkGraph, SimpleAction};
use tiered_pool::pool::memory::MemoryDataPool;
use tiered_pool::pool::DataPool;
use tiered_pool::types::{PoolId, PoolMode};

const ROOT: PoolId = 0;

fn pool_map(sizes: &[(PoolId, u32)]) -> HashMap<PoolId, Arc<dyn DataPool>> {
    let mut map: HashMap<PoolId, Arc<dyn DataPool>> = HashMap::new();
    for &(id, size) in sizes {
        let p: Arc<dyn DataPool> = Arc::new(MemoryDataPool::new(PoolMode::ReadWrite, size));
        p.set_pool_id(id);
        map.insert(id, p);
    }
    map
}

#[test]
fn insufficient_space_is_reported_before_any_step_runs() {
    let mut graph = LinkGraph::new();
    graph.add_link(ROOT, Link { target: 1, action: Action::Copy, condition: Condition::None }).unwrap();
    let pools = pool_map(&[(1, 16)]);

    let err = graph.unwind(ROOT, ROOT, 1024, &pools).unwrap_err();
    assert!(matches!(err, PoolError::PlanFailure(PlanFailure::InsufficientSpace { pool: 1 })));
}

#[test]
fn distribute_with_no_feasible_target_fails() {
    let mut graph = LinkGraph::new();
    for target in [1, 2] {
        graph.add_link(ROOT, Link { target, action: Action::Distribute, condition: Condition::None }).unwrap();
    }
    let pools = pool_map(&[(1, 16), (2, 16)]);

    let err = graph.unwind(ROOT, ROOT, 1024, &pools).unwrap_err();
    assert!(matches!(err, PoolError::PlanFailure(PlanFailure::NoDistributionTarget)));
}

#[test]
fn discard_mid_chain_terminates_without_trailing_copy() {
    let mut graph = LinkGraph::new();
    graph.add_link(ROOT, Link { target: 1, action: Action::Copy, condition: Condition::None }).unwrap();
    graph.add_link(1, Link { target: 1, action: Action::Discard, condition: Condition::None }).unwrap();
    let pools = pool_map(&[(1, 1024)]);

    let plan = graph.unwind(ROOT, ROOT, 10, &pools).unwrap();
    // The self-referencing discard link's target equals its own source, so
    // the cycle guard (pool 1 already processed) skips it entirely; only the
    // root -> 1 copy remains.
    assert_eq!(plan.len(), 1);
    assert!(plan.iter().all(|s| s.action == SimpleAction::Copy));
}

#[test]
fn cycle_back_to_root_is_not_re_walked() {
    let mut graph = LinkGraph::new();
    graph.add_link(ROOT, Link { target: 1, action: Action::Copy, condition: Condition::None }).unwrap();
    graph.add_link(1, Link { target: ROOT, action: Action::Copy, condition: Condition::None }).unwrap();
    let pools = pool_map(&[(1, 1024)]);

    let plan = graph.unwind(ROOT, ROOT, 10, &pools).unwrap();
    // Without the processed-pools cycle guard this would recurse forever.
    assert_eq!(plan.len(), 1);
    assert_eq!(plan[0].target, Some(1));
}

#[test]
fn timed_condition_accumulates_delay_down_the_chain() {
    let mut graph = LinkGraph::new();
    graph.add_link(ROOT, Link { target: 1, action: Action::Copy, condition: Condition::Timed(5) }).unwrap();
    graph.add_link(1, Link { target: 2, action: Action::Copy, condition: Condition::Timed(7) }).unwrap();
    let pools = pool_map(&[(1, 1024), (2, 1024)]);

    let plan = graph.unwind(ROOT, ROOT, 10, &pools).unwrap();
    let to_one = plan.iter().find(|s| s.target == Some(1)).unwrap();
    let to_two = plan.iter().find(|s| s.target == Some(2)).unwrap();
    assert_eq!(to_one.delay_seconds, 5);
    assert_eq!(to_two.delay_seconds, 12);
}

#[test]
fn usable_space_excludes_discard_links() {
    let mut graph = LinkGraph::new();
    graph.add_link(ROOT, Link { target: 1, action: Action::Copy, condition: Condition::None }).unwrap();
    graph.add_link(ROOT, Link { target: 2, action: Action::Discard, condition: Condition::None }).unwrap();
    let pools = pool_map(&[(1, 1024), (2, 4096)]);

    let space = graph.usable_space(ROOT, ROOT, &pools).unwrap();
    assert_eq!(space.max, 1024);
    assert_eq!(space.total, 1024);
}
