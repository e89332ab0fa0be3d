// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! The link graph and its planner.
//!
//! Vertices are pools (plus the aggregator root); edges are `Link`s, each
//! carrying an action and a condition. `unwind` walks the graph depth-first
//! from a root pool and produces an ordered placement plan.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{PlanFailure, Result};
use crate::pool::DataPool;
use crate::types::{DataSize, PoolId};

pub type Seconds = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Copy,
    Move,
    Distribute,
    Discard,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    None,
    Timed(Seconds),
    SourceMinFull(u32),
    SourceMaxFull(u32),
    TargetMinFull(u32),
    TargetMaxFull(u32),
    SourceMinEntities(u32),
    SourceMaxEntities(u32),
    TargetMinEntities(u32),
    TargetMaxEntities(u32),
    DataMinSize(DataSize),
    DataMaxSize(DataSize),
}

#[derive(Debug, Clone, Copy)]
pub struct Link {
    pub target: PoolId,
    pub action: Action,
    pub condition: Condition,
}

impl Link {
    fn delay(&self) -> Seconds {
        match self.condition {
            Condition::Timed(secs) => secs,
            _ => 0,
        }
    }
}

/// One step in a synthesized placement plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimpleAction {
    Copy,
    Remove,
}

#[derive(Debug, Clone, Copy)]
pub struct PlainStep {
    pub action: SimpleAction,
    pub source: PoolId,
    /// Only meaningful for `Copy` steps; `None` for `Remove`.
    pub target: Option<PoolId>,
    pub delay_seconds: Seconds,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UsableSpace {
    pub max: u64,
    pub total: u64,
}

fn percent_full(pool: &Arc<dyn DataPool>) -> u32 {
    let size = pool.pool_size() as u64;
    if size == 0 {
        return 0;
    }
    let used = size - pool.free_space() as u64;
    ((used * 100) / size) as u32
}

/// Evaluates whether `link`'s condition holds for the given source/target
/// pools and candidate `data_size`.
pub fn is_action_required(
    source: &Arc<dyn DataPool>,
    target_of: impl Fn() -> Option<Arc<dyn DataPool>>,
    link: &Link,
    data_size: DataSize,
) -> bool {
    match link.condition {
        Condition::None => true,
        Condition::Timed(_) => true,
        Condition::SourceMinFull(p) => percent_full(source) >= p,
        Condition::SourceMaxFull(p) => percent_full(source) <= p,
        Condition::TargetMinFull(p) => target_of().map_or(false, |t| percent_full(&t) >= p),
        Condition::TargetMaxFull(p) => target_of().map_or(false, |t| percent_full(&t) <= p),
        Condition::SourceMinEntities(n) => source.stored_entities() >= n,
        Condition::SourceMaxEntities(n) => source.stored_entities() <= n,
        Condition::TargetMinEntities(n) => target_of().map_or(false, |t| t.stored_entities() >= n),
        Condition::TargetMaxEntities(n) => target_of().map_or(false, |t| t.stored_entities() <= n),
        Condition::DataMinSize(n) => data_size >= n,
        Condition::DataMaxSize(n) => data_size <= n,
    }
}

/// The directed multigraph of pools and links, plus the planner operations
/// over it. Does not own the pools; callers provide a lookup.
pub struct LinkGraph {
    pub links: HashMap<PoolId, Vec<Link>>,
}

impl LinkGraph {
    pub fn new() -> Self {
        LinkGraph { links: HashMap::new() }
    }

    pub fn add_link(&mut self, source: PoolId, link: Link) -> Result<()> {
        let existing = self.links.entry(source).or_default();
        if existing.iter().any(|l| l.target == link.target) {
            return Err(crate::error::PoolError::ConfigurationError(format!(
                "a link from {source} to {} already exists",
                link.target
            )));
        }
        existing.push(link);
        Ok(())
    }

    pub fn remove_link(&mut self, source: PoolId, target: PoolId) {
        if let Some(links) = self.links.get_mut(&source) {
            links.retain(|l| l.target != target);
        }
    }

    pub fn remove_pool(&mut self, pool: PoolId) {
        self.links.remove(&pool);
        for links in self.links.values_mut() {
            links.retain(|l| l.target != pool);
        }
    }

    /// Depth-first walk producing an ordered placement plan, mirroring the
    /// original unwind algorithm: cycles and re-visits are suppressed via a
    /// processed-pools list, DISTRIBUTE edges at a level are collected and
    /// resolved to a single target before recursing, and delays accumulate
    /// additively down the chain.
    pub fn unwind(
        &self,
        root: PoolId,
        aggregator_id: PoolId,
        data_size: DataSize,
        pools: &HashMap<PoolId, Arc<dyn DataPool>>,
    ) -> Result<Vec<PlainStep>> {
        let mut processed = Vec::new();
        self.unwind_inner(root, aggregator_id, data_size, pools, &mut processed)
    }

    fn unwind_inner(
        &self,
        pool_id: PoolId,
        aggregator_id: PoolId,
        data_size: DataSize,
        pools: &HashMap<PoolId, Arc<dyn DataPool>>,
        processed: &mut Vec<PoolId>,
    ) -> Result<Vec<PlainStep>> {
        let mut result = Vec::new();
        processed.push(pool_id);

        let empty = Vec::new();
        let links = self.links.get(&pool_id).unwrap_or(&empty);
        let mut distribution_candidates: Vec<Link> = Vec::new();

        for link in links {
            if processed.contains(&link.target) {
                continue;
            }

            let source_pool = pools.get(&pool_id);
            let target_of = || pools.get(&link.target).cloned();
            let action_required = match source_pool {
                Some(source) => is_action_required(source, target_of, link, data_size),
                None => true,
            };

            let proceed = (action_required && link.action != Action::Skip)
                || (!action_required && link.action == Action::Skip);
            if !proceed {
                continue;
            }

            let delay = link.delay();

            match link.action {
                Action::Skip | Action::Copy => {
                    let target = pools.get(&link.target).ok_or_else(|| {
                        crate::error::PoolError::ConfigurationError(format!("unknown target pool {}", link.target))
                    })?;
                    if !target.can_store(data_size) {
                        return Err(PlanFailure::InsufficientSpace { pool: link.target }.into());
                    }
                    result.push(PlainStep { action: SimpleAction::Copy, source: pool_id, target: Some(link.target), delay_seconds: delay });
                }
                Action::Discard => {
                    if pool_id != aggregator_id {
                        result.push(PlainStep { action: SimpleAction::Remove, source: pool_id, target: None, delay_seconds: delay });
                    }
                    continue;
                }
                Action::Distribute => {
                    distribution_candidates.push(*link);
                    continue;
                }
                Action::Move => {
                    let target = pools.get(&link.target).ok_or_else(|| {
                        crate::error::PoolError::ConfigurationError(format!("unknown target pool {}", link.target))
                    })?;
                    if !target.can_store(data_size) {
                        return Err(PlanFailure::InsufficientSpace { pool: link.target }.into());
                    }
                    result.push(PlainStep { action: SimpleAction::Copy, source: pool_id, target: Some(link.target), delay_seconds: delay });
                    if pool_id != aggregator_id {
                        result.push(PlainStep { action: SimpleAction::Remove, source: pool_id, target: None, delay_seconds: delay });
                    }
                }
            }

            let nested = self.unwind_inner(link.target, aggregator_id, data_size, pools, processed)?;
            for mut step in nested {
                step.delay_seconds += delay;
                result.push(step);
            }
        }

        if !distribution_candidates.is_empty() {
            let chosen = select_distributed_pool(&distribution_candidates, data_size, pools)
                .ok_or(PlanFailure::NoDistributionTarget)?;
            let delay = chosen.delay();

            let nested = self.unwind_inner(chosen.target, aggregator_id, data_size, pools, processed)?;
            let mut front = vec![PlainStep { action: SimpleAction::Copy, source: pool_id, target: Some(chosen.target), delay_seconds: delay }];
            for mut step in nested {
                step.delay_seconds += delay;
                front.push(step);
            }
            // Distribution always happens first.
            front.extend(result);
            result = front;
        }

        processed.pop();
        Ok(result)
    }

    /// Mirrors `unwind` but reports capacity instead of emitting steps; used
    /// to report the aggregator's free space to callers.
    pub fn usable_space(&self, root: PoolId, aggregator_id: PoolId, pools: &HashMap<PoolId, Arc<dyn DataPool>>) -> Result<UsableSpace> {
        let mut processed = Vec::new();
        self.usable_space_inner(root, aggregator_id, pools, &mut processed)
    }

    fn usable_space_inner(
        &self,
        pool_id: PoolId,
        aggregator_id: PoolId,
        pools: &HashMap<PoolId, Arc<dyn DataPool>>,
        processed: &mut Vec<PoolId>,
    ) -> Result<UsableSpace> {
        let mut result = UsableSpace::default();
        processed.push(pool_id);

        let empty = Vec::new();
        let links = self.links.get(&pool_id).unwrap_or(&empty);

        for link in links {
            if processed.contains(&link.target) {
                continue;
            }

            let contributes = match link.action {
                Action::Copy => pool_id == aggregator_id,
                Action::Distribute | Action::Move => true,
                Action::Discard => false,
                Action::Skip => {
                    pool_id == aggregator_id && !matches!(link.condition, Condition::None | Condition::Timed(_))
                }
            };

            if link.action == Action::Discard {
                continue;
            }

            if contributes {
                if let Some(target) = pools.get(&link.target) {
                    result.max += target.pool_size() as u64;
                    result.total += target.free_space() as u64;
                }
            }

            let nested = self.usable_space_inner(link.target, aggregator_id, pools, processed)?;
            result.max += nested.max;
            result.total += nested.total;
        }

        processed.pop();
        Ok(result)
    }
}

impl Default for LinkGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Among a batch of DISTRIBUTE candidates, picks the target pool with the
/// least used space that can still fit `data_size`.
fn select_distributed_pool<'a>(
    candidates: &'a [Link],
    data_size: DataSize,
    pools: &HashMap<PoolId, Arc<dyn DataPool>>,
) -> Option<&'a Link> {
    let mut best: Option<(&Link, u64)> = None;
    for link in candidates {
        let Some(pool) = pools.get(&link.target) else { continue };
        if !pool.can_store(data_size) {
            continue;
        }
        let used = pool.pool_size() as u64 - pool.free_space() as u64;
        if best.map_or(true, |(_, best_used)| used < best_used) {
            best = Some((link, used));
        }
    }
    best.map(|(link, _)| link)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pool::memory::MemoryDataPool;
    use crate::types::PoolMode;

    fn pool_map(sizes: &[(PoolId, DataSize)]) -> HashMap<PoolId, Arc<dyn DataPool>> {
        let mut map: HashMap<PoolId, Arc<dyn DataPool>> = HashMap::new();
        for &(id, size) in sizes {
            let p: Arc<dyn DataPool> = Arc::new(MemoryDataPool::new(PoolMode::ReadWrite, size));
            p.set_pool_id(id);
            map.insert(id, p);
        }
        map
    }

    const ROOT: PoolId = 0;

    #[test]
    fn copy_then_discard_never_removes_root() {
        let mut graph = LinkGraph::new();
        graph.add_link(ROOT, Link { target: 1, action: Action::Copy, condition: Condition::None }).unwrap();
        let pools = pool_map(&[(1, 1024)]);
        let plan = graph.unwind(ROOT, ROOT, 10, &pools).unwrap();
        assert!(plan.iter().all(|s| !(s.action == SimpleAction::Remove && s.source == ROOT)));
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn move_chain_emits_copy_then_remove() {
        let mut graph = LinkGraph::new();
        graph.add_link(ROOT, Link { target: 1, action: Action::Copy, condition: Condition::None }).unwrap();
        graph.add_link(1, Link { target: 2, action: Action::Move, condition: Condition::None }).unwrap();
        let pools = pool_map(&[(1, 1024), (2, 1024)]);
        let plan = graph.unwind(ROOT, ROOT, 10, &pools).unwrap();
        // root -> 1 (copy), then 1 -> 2 (copy), 1 (remove)
        assert_eq!(plan.len(), 3);
        assert_eq!(plan[0].source, ROOT);
        let remove_index = plan.iter().position(|s| s.action == SimpleAction::Remove).unwrap();
        let copy_to_2_index = plan.iter().position(|s| s.target == Some(2)).unwrap();
        assert!(copy_to_2_index < remove_index);
    }

    #[test]
    fn distribute_picks_least_used_feasible_pool() {
        let mut graph = LinkGraph::new();
        for target in [1, 2, 3] {
            graph.add_link(ROOT, Link { target, action: Action::Distribute, condition: Condition::None }).unwrap();
        }
        let pools = pool_map(&[(1, 1024 * 1024), (2, 1024 * 1024), (3, 1024 * 1024)]);
        pools[&1].store(&vec![0u8; 512 * 1024]).unwrap();
        pools[&2].store(&vec![0u8; 100 * 1024]).unwrap();
        pools[&3].store(&vec![0u8; 300 * 1024]).unwrap();

        let plan = graph.unwind(ROOT, ROOT, 1024, &pools).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].target, Some(2));
    }

    #[test]
    fn skip_behaves_as_copy_when_condition_not_met() {
        let mut graph = LinkGraph::new();
        graph
            .add_link(ROOT, Link { target: 1, action: Action::Skip, condition: Condition::DataMinSize(1_000_000) })
            .unwrap();
        let pools = pool_map(&[(1, 1024)]);
        let plan = graph.unwind(ROOT, ROOT, 10, &pools).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].target, Some(1));
    }

    #[test]
    fn skip_does_nothing_when_condition_met() {
        let mut graph = LinkGraph::new();
        graph
            .add_link(ROOT, Link { target: 1, action: Action::Skip, condition: Condition::DataMinSize(5) })
            .unwrap();
        let pools = pool_map(&[(1, 1024)]);
        let plan = graph.unwind(ROOT, ROOT, 10, &pools).unwrap();
        assert!(plan.is_empty());
    }
}
