// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! The Pool Aggregator: a `DataPool` implementation that fans a single
//! logical entity out across a directed multigraph of other pools, according
//! to the links attached to each pool.
//!
//! A `store` call produces a plan via [`crate::link::LinkGraph::unwind`],
//! allocates the new entity id, and hands the whole plan to the background
//! worker task before returning — `store` never waits for the plan's steps to
//! land. Because of that, a `retrieve`/`export_id_map_for_entity` called
//! immediately after a `store` can race ahead of the worker and find no
//! placement yet; callers that need read-your-writes must poll. Delayed
//! steps inside a plan are further deferred as [`PendingAction`]s and picked
//! up by a separate timer task. The aggregator never holds its own state
//! lock across a call into a child pool.

pub mod io;
mod worker;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::{PlanFailure, PoolError, Result};
use crate::link::{Link, LinkGraph, PlainStep, SimpleAction, UsableSpace};
use crate::pool::DataPool;
use crate::stream::{PoolInputStream, PoolOutputStream};
use crate::types::{DataPoolType, DataSize, EntityId, PoolId, PoolMode, PoolState, PoolUuid};

/// Root pool id the aggregator itself occupies in the link graph; real pools
/// are assigned ids starting at 1 as they're registered.
pub const AGGREGATOR_ROOT: PoolId = 0;

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// If false (the default), `retrieve` returns the first pool's error
    /// instead of trying the entity's remaining replicas. If true, every
    /// known location is tried before giving up.
    pub complete_retrieve: bool,
    /// If false (the default), `discard` stops at the first pool that
    /// refuses to discard its replica and leaves the entity's id map entry
    /// in place. If true, every pool is given a chance and `discard` always
    /// reports success, logging failures instead of returning them.
    pub complete_discard: bool,
    /// If false (the default), a failed due pending action aborts the rest
    /// of that processing cycle — the failed action and anything still due
    /// are put back on the queue for the next pass. If true, a failure is
    /// only logged and the cycle keeps going.
    pub complete_pending_store: bool,
    /// Passed through to `discard` on every pool a removed entity is erased
    /// from.
    pub erase_on_discard: bool,
    /// If true, pending actions still queued at shutdown are dropped instead
    /// of left for the next load to pick up (no persistence is attempted
    /// either way; this only controls whether a warning is logged).
    pub cancel_actions_on_shutdown: bool,
    /// Entities larger than this use a stream-to-stream copy between pools
    /// that both support streaming; smaller ones go through retrieve+store.
    /// Also the hard cap on data moved through a pool pair that does not
    /// support streaming at all. Zero means unlimited.
    pub max_non_streamable_data: DataSize,
    /// Bound on the channel `store` enqueues plans onto; a full channel
    /// makes `store` fail with `UnsupportedOperation` rather than block.
    pub store_worker_channel_bound: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        AggregatorConfig {
            complete_retrieve: false,
            complete_discard: false,
            complete_pending_store: false,
            erase_on_discard: false,
            cancel_actions_on_shutdown: true,
            max_non_streamable_data: 64 * 1024 * 1024,
            store_worker_channel_bound: 256,
        }
    }
}

/// A deferred plan step awaiting its `run_at` instant.
#[derive(Debug, Clone)]
pub(crate) struct PendingAction {
    pub entity_id: EntityId,
    pub step: PlainStep,
    pub run_at: DateTime<Utc>,
    pub sequence: u64,
}

struct AggregatorState {
    pools: HashMap<PoolId, Arc<dyn DataPool>>,
    graph: LinkGraph,
    /// Virtual entity id -> every (pool, pool-local id) it currently lives at.
    id_map: HashMap<EntityId, Vec<(PoolId, EntityId)>>,
    pending_actions: Vec<PendingAction>,
    pending_count: HashMap<EntityId, u32>,
    next_pool_id: PoolId,
    next_sequence: u64,
    last_entity_id: EntityId,
    streaming_pool_id: Option<PoolId>,
}

impl AggregatorState {
    fn new() -> Self {
        AggregatorState {
            pools: HashMap::new(),
            graph: LinkGraph::new(),
            id_map: HashMap::new(),
            pending_actions: Vec::new(),
            pending_count: HashMap::new(),
            next_pool_id: 1,
            next_sequence: 0,
            last_entity_id: 0,
            streaming_pool_id: None,
        }
    }

    fn earliest_pending(&self) -> Option<DateTime<Utc>> {
        self.pending_actions.iter().map(|p| p.run_at).min()
    }
}

pub(crate) struct AggregatorCore {
    uuid: PoolUuid,
    config: AggregatorConfig,
    state: Mutex<AggregatorState>,
    pool_id_self: std::sync::atomic::AtomicU32,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
    /// `store`'s only path to the worker task; queued jobs run in order, off
    /// the calling thread.
    job_tx: tokio::sync::mpsc::Sender<worker::StoreJob>,
}

/// A `DataPool` implementation that routes stores across a link graph of
/// other pools instead of holding data itself.
#[derive(Clone)]
pub struct Aggregator(Arc<AggregatorCore>);

impl Aggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self::with_uuid(PoolUuid::new(), config)
    }

    pub fn with_uuid(uuid: PoolUuid, config: AggregatorConfig) -> Self {
        let channel_bound = config.store_worker_channel_bound.max(1);
        let (job_tx, job_rx) = tokio::sync::mpsc::channel(channel_bound);
        let core = Arc::new(AggregatorCore {
            uuid,
            config,
            state: Mutex::new(AggregatorState::new()),
            pool_id_self: std::sync::atomic::AtomicU32::new(AGGREGATOR_ROOT),
            bytes_read: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            job_tx,
        });
        worker::spawn_store_worker(core.clone(), job_rx);
        info!(uuid = %core.uuid, "aggregator started");
        Aggregator(core)
    }

    pub fn uuid(&self) -> PoolUuid {
        self.0.uuid
    }

    /// Registers a pool, assigning it the next aggregator-local id and
    /// stamping that id onto the pool itself (so streams it hands out can be
    /// lock-ordered against others).
    pub fn add_pool(&self, pool: Arc<dyn DataPool>) -> PoolId {
        let mut state = self.0.state.lock();
        let id = state.next_pool_id;
        state.next_pool_id += 1;
        pool.set_pool_id(id);
        state.pools.insert(id, pool);
        debug!(pool_id = id, "pool registered with aggregator");
        id
    }

    pub fn remove_pool(&self, pool_id: PoolId) {
        let mut state = self.0.state.lock();
        state.pools.remove(&pool_id);
        state.graph.remove_pool(pool_id);
        if state.streaming_pool_id == Some(pool_id) {
            state.streaming_pool_id = None;
        }
    }

    /// Designates a pool as the one `get_output_stream`/streamed stores write
    /// to directly before the plan fans the entity out further.
    pub fn set_streaming_pool(&self, pool_id: PoolId) {
        self.0.state.lock().streaming_pool_id = Some(pool_id);
    }

    pub fn add_link(&self, source: PoolId, link: Link) -> Result<()> {
        self.0.state.lock().graph.add_link(source, link)
    }

    pub fn remove_link(&self, source: PoolId, target: PoolId) {
        self.0.state.lock().graph.remove_link(source, target);
    }

    /// Reports capacity usable by new stores, mirroring the synthesized plan
    /// from `AGGREGATOR_ROOT` without executing it.
    pub fn usable_space(&self) -> Result<UsableSpace> {
        let state = self.0.state.lock();
        state.graph.usable_space(AGGREGATOR_ROOT, AGGREGATOR_ROOT, &state.pools)
    }

    /// The current PoolUuid -> aggregator-local PoolId resolution, without
    /// building a full `export_configuration()` manifest.
    pub fn pool_ids_map(&self) -> HashMap<PoolUuid, PoolId> {
        self.0.state.lock().pools.iter().map(|(&id, p)| (p.uuid(), id)).collect()
    }

    pub fn export_configuration(&self) -> io::AggregatorManifest {
        let state = self.0.state.lock();
        let mut pool_uuids: Vec<PoolUuid> = Vec::with_capacity(state.pools.len());
        let mut by_id: Vec<(PoolId, PoolUuid)> = state.pools.iter().map(|(&id, p)| (id, p.uuid())).collect();
        by_id.sort_by_key(|&(id, _)| id);
        pool_uuids.extend(by_id.iter().map(|&(_, u)| u));

        let uuid_of = |id: PoolId| -> Option<PoolUuid> { state.pools.get(&id).map(|p| p.uuid()) };
        let mut links = Vec::new();
        for (&source, edges) in &state.graph.links {
            let Some(source_uuid) = uuid_of(source) else { continue };
            for link in edges {
                let Some(target_uuid) = uuid_of(link.target) else { continue };
                links.push(io::LinkManifest {
                    source: source_uuid,
                    target: target_uuid,
                    action: link.action.into(),
                    condition: link.condition.into(),
                });
            }
        }

        io::AggregatorManifest {
            uuid: self.0.uuid,
            complete_retrieve: self.0.config.complete_retrieve,
            complete_discard: self.0.config.complete_discard,
            complete_pending_store: self.0.config.complete_pending_store,
            erase_on_discard: self.0.config.erase_on_discard,
            cancel_actions_on_shutdown: self.0.config.cancel_actions_on_shutdown,
            max_non_streamable_data: self.0.config.max_non_streamable_data,
            store_worker_channel_bound: self.0.config.store_worker_channel_bound,
            bytes_read: self.0.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.0.bytes_written.load(Ordering::Relaxed),
            last_entity_id: state.last_entity_id,
            streaming_pool_uuid: state.streaming_pool_id.and_then(uuid_of),
            pool_uuids,
            links,
        }
    }

    /// Rebuilds the link graph from a manifest against an already-registered
    /// set of pools (matched by uuid). Pools named in the manifest but not
    /// currently registered are skipped with a warning.
    pub fn import_links(&self, manifest: &io::AggregatorManifest) {
        let mut state = self.0.state.lock();
        let id_of: HashMap<PoolUuid, PoolId> = state.pools.iter().map(|(&id, p)| (p.uuid(), id)).collect();
        for link in &manifest.links {
            let (Some(&source), Some(&target)) = (id_of.get(&link.source), id_of.get(&link.target)) else {
                warn!("skipping link import: source or target pool not registered");
                continue;
            };
            let _ = state.graph.add_link(source, Link { target, action: link.action.into(), condition: link.condition.into() });
        }
    }

    pub fn export_id_map(&self) -> Vec<io::IdMapEntry> {
        let state = self.0.state.lock();
        state
            .id_map
            .iter()
            .flat_map(|(&aggregator_id, locations)| {
                locations.iter().map(move |&(pool_id, pool_local_id)| io::IdMapEntry { aggregator_id, pool_id, pool_local_id })
            })
            .collect()
    }

    pub fn export_id_map_for_entity(&self, entity_id: EntityId) -> Vec<io::IdMapEntry> {
        let state = self.0.state.lock();
        state
            .id_map
            .get(&entity_id)
            .into_iter()
            .flat_map(|locations| locations.iter().map(move |&(pool_id, pool_local_id)| io::IdMapEntry { aggregator_id: entity_id, pool_id, pool_local_id }))
            .collect()
    }

    pub fn export_id_map_for_pool(&self, pool_id: PoolId) -> Vec<io::IdMapEntry> {
        let state = self.0.state.lock();
        state
            .id_map
            .iter()
            .flat_map(|(&aggregator_id, locations)| {
                locations.iter().filter(move |&&(p, _)| p == pool_id).map(move |&(p, local)| io::IdMapEntry { aggregator_id, pool_id: p, pool_local_id: local })
            })
            .collect()
    }

    pub fn import_id_map(&self, entries: &[io::IdMapEntry]) {
        let mut state = self.0.state.lock();
        for entry in entries {
            let list = state.id_map.entry(entry.aggregator_id).or_default();
            if !list.contains(&(entry.pool_id, entry.pool_local_id)) {
                list.push((entry.pool_id, entry.pool_local_id));
            }
            if entry.aggregator_id > state.last_entity_id {
                state.last_entity_id = entry.aggregator_id;
            }
        }
    }

    pub fn export_pending_actions(&self, discard: bool) -> Vec<io::PendingActionEntry> {
        let mut state = self.0.state.lock();
        let entries = state
            .pending_actions
            .iter()
            .map(|p| io::PendingActionEntry {
                entity_id: p.entity_id,
                action: simple_action_to_serializable(p.step.action),
                source: p.step.source,
                target: p.step.target,
                run_at_unix_seconds: p.run_at.timestamp(),
            })
            .collect();
        if discard {
            state.pending_actions.clear();
            state.pending_count.clear();
        }
        entries
    }

    pub fn import_pending_actions(&self, entries: &[io::PendingActionEntry]) {
        let mut state = self.0.state.lock();
        for entry in entries {
            let action = serializable_to_simple_action(entry.action);
            let run_at = DateTime::<Utc>::from_timestamp(entry.run_at_unix_seconds, 0).unwrap_or_else(Utc::now);
            let sequence = state.next_sequence;
            state.next_sequence += 1;
            state.pending_actions.push(PendingAction {
                entity_id: entry.entity_id,
                step: PlainStep { action, source: entry.source, target: entry.target, delay_seconds: 0 },
                run_at,
                sequence,
            });
            *state.pending_count.entry(entry.entity_id).or_insert(0) += 1;
        }
        if let Some(earliest) = state.earliest_pending() {
            worker::schedule_pending_processing(core_handle(self), earliest);
        }
    }
}

/// A `PlainStep` only ever carries `SimpleAction::Copy` or `::Remove`; the
/// richer `Action` enum on the exported side distinguishes why a removal
/// happened, so a bare `Remove` round-trips as `Discard`.
fn simple_action_to_serializable(action: SimpleAction) -> io::SerializableAction {
    match action {
        SimpleAction::Copy => io::SerializableAction::Copy,
        SimpleAction::Remove => io::SerializableAction::Discard,
    }
}

fn serializable_to_simple_action(action: io::SerializableAction) -> SimpleAction {
    match action {
        io::SerializableAction::Discard | io::SerializableAction::Move => SimpleAction::Remove,
        _ => SimpleAction::Copy,
    }
}

fn core_handle(agg: &Aggregator) -> Arc<AggregatorCore> {
    agg.0.clone()
}

impl DataPool for Aggregator {
    fn retrieve(&self, id: EntityId) -> Result<Vec<u8>> {
        let locations = {
            let state = self.0.state.lock();
            state.id_map.get(&id).cloned().ok_or(PoolError::NotFound(id))?
        };
        let mut last_err = None;
        for (pool_id, local_id) in &locations {
            let pool = { self.0.state.lock().pools.get(pool_id).cloned() };
            let Some(pool) = pool else { continue };
            match pool.retrieve(*local_id) {
                Ok(data) => {
                    self.0.bytes_read.fetch_add(data.len() as u64, Ordering::Relaxed);
                    return Ok(data);
                }
                Err(e) => {
                    if !self.0.config.complete_retrieve {
                        return Err(e);
                    }
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or(PoolError::NotFound(id)))
    }

    fn store(&self, data: &[u8]) -> Result<EntityId> {
        if data.is_empty() {
            return Err(PoolError::UnsupportedOperation("cannot store empty data".into()));
        }

        let plan = {
            let state = self.0.state.lock();
            state.graph.unwind(AGGREGATOR_ROOT, AGGREGATOR_ROOT, data.len() as DataSize, &state.pools)?
        };
        if plan.is_empty() {
            return Err(PlanFailure::NoValidPlacement.into());
        }
        if plan.iter().any(|s| s.delay_seconds > 0 && s.source == AGGREGATOR_ROOT) {
            return Err(PlanFailure::DelayedFromRoot.into());
        }

        let entity_id = {
            let mut state = self.0.state.lock();
            state.last_entity_id += 1;
            state.last_entity_id
        };

        // Hand the whole plan to the worker task and return immediately; see
        // the module doc for the resulting race against an immediate
        // retrieve.
        self.0
            .job_tx
            .try_send(worker::StoreJob { entity_id, data: data.to_vec(), plan })
            .map_err(|_| PoolError::UnsupportedOperation("store worker channel is saturated or shut down".into()))?;
        Ok(entity_id)
    }

    fn discard(&self, id: EntityId, erase: bool) -> Result<()> {
        // `id_map` is only touched once every pool has been given a chance to
        // discard its replica (or, with complete_discard=false, as soon as one
        // refuses) — mirroring the original's idMap.erase placement after the
        // loop, not before it.
        let locations = {
            let state = self.0.state.lock();
            state.id_map.get(&id).cloned().ok_or(PoolError::NotFound(id))?
        };

        for (pool_id, local_id) in &locations {
            let pool = { self.0.state.lock().pools.get(pool_id).cloned() };
            if let Some(pool) = pool {
                if let Err(e) = pool.discard(*local_id, erase) {
                    warn!(pool_id, local_id, error = %e, "failed to discard a replica during aggregator discard");
                    if !self.0.config.complete_discard {
                        return Err(e);
                    }
                }
            }
        }

        let mut state = self.0.state.lock();
        state.id_map.remove(&id);
        state.pending_actions.retain(|p| p.entity_id != id);
        state.pending_count.remove(&id);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let pools: Vec<Arc<dyn DataPool>> = { self.0.state.lock().pools.values().cloned().collect() };
        for pool in pools {
            pool.clear()?;
        }
        let mut state = self.0.state.lock();
        state.id_map.clear();
        state.pending_actions.clear();
        state.pending_count.clear();
        Ok(())
    }

    fn set_pool_id(&self, id: PoolId) {
        self.0.pool_id_self.store(id, Ordering::SeqCst);
    }

    fn pool_id(&self) -> PoolId {
        self.0.pool_id_self.load(Ordering::SeqCst)
    }

    fn pool_type(&self) -> DataPoolType {
        DataPoolType::Aggregate
    }

    fn uuid(&self) -> PoolUuid {
        self.0.uuid
    }

    fn pool_size(&self) -> DataSize {
        let state = self.0.state.lock();
        state.pools.values().map(|p| p.pool_size() as u64).sum::<u64>().min(u32::MAX as u64) as DataSize
    }

    fn free_space(&self) -> DataSize {
        self.usable_space().map(|u| u.total.min(u32::MAX as u64) as DataSize).unwrap_or(0)
    }

    fn stored_entities(&self) -> u32 {
        self.0.state.lock().id_map.len() as u32
    }

    fn can_store(&self, size: DataSize) -> bool {
        let state = self.0.state.lock();
        state.graph.unwind(AGGREGATOR_ROOT, AGGREGATOR_ROOT, size, &state.pools).map(|p| !p.is_empty()).unwrap_or(false)
    }

    fn entity_size(&self, id: EntityId) -> Option<DataSize> {
        let state = self.0.state.lock();
        let (pool_id, local_id) = *state.id_map.get(&id)?.first()?;
        state.pools.get(&pool_id)?.entity_size(local_id)
    }

    fn pool_overhead(&self) -> DataSize {
        0
    }

    fn entity_overhead(&self) -> DataSize {
        0
    }

    fn supports_input_streams(&self) -> bool {
        false
    }

    fn supports_output_streams(&self) -> bool {
        false
    }

    fn bytes_read(&self) -> u64 {
        self.0.bytes_read.load(Ordering::Relaxed)
    }

    fn bytes_written(&self) -> u64 {
        self.0.bytes_written.load(Ordering::Relaxed)
    }

    fn mode(&self) -> PoolMode {
        PoolMode::ReadWrite
    }

    fn state(&self) -> PoolState {
        PoolState::Open
    }

    fn input_stream(&self, _id: EntityId) -> Result<PoolInputStream> {
        Err(PoolError::UnsupportedOperation("aggregator does not hand out streams directly".into()))
    }

    fn output_stream(&self, _size: DataSize) -> Result<PoolOutputStream> {
        Err(PoolError::UnsupportedOperation("aggregator does not hand out streams directly".into()))
    }
}

/// Executes a store plan's immediate (zero-delay) steps in order and defers
/// everything else. On failure partway through, already-written copies are
/// rolled back via `discard` before the error is returned, mirroring the
/// original's rollback-on-partial-failure behavior.
pub(crate) fn process_store_job(core: &Arc<AggregatorCore>, entity_id: EntityId, data: Vec<u8>, plan: Vec<PlainStep>) -> Result<()> {
    // Locations written during this call, committed to id_map as each step
    // executes so a later Remove step in the same plan (a MOVE chain) sees
    // the location an earlier Copy step in the same plan just produced.
    let mut written: Vec<(PoolId, EntityId)> = Vec::new();

    let run = (|| -> Result<()> {
        for step in &plan {
            if step.delay_seconds > 0 {
                defer_step(core, entity_id, *step);
                continue;
            }
            match step.action {
                SimpleAction::Copy => {
                    let target_id = step.target.ok_or(PlanFailure::NoValidPlacement)?;
                    let pool = lookup_pool(core, target_id)?;
                    let local_id = pool.store(&data)?;
                    written.push((target_id, local_id));
                    core.state.lock().id_map.entry(entity_id).or_default().push((target_id, local_id));
                }
                SimpleAction::Remove => {
                    remove_replica(core, entity_id, step.source)?;
                }
            }
        }
        Ok(())
    })();

    if let Err(e) = run {
        let mut state = core.state.lock();
        if let Some(locations) = state.id_map.get_mut(&entity_id) {
            locations.retain(|loc| !written.contains(loc));
        }
        drop(state);
        for (pool_id, local_id) in &written {
            if let Ok(pool) = lookup_pool(core, *pool_id) {
                let _ = pool.discard(*local_id, core.config.erase_on_discard);
            }
        }
        return Err(e);
    }

    core.bytes_written.fetch_add(data.len() as u64, Ordering::Relaxed);

    if let Some(earliest) = core.state.lock().earliest_pending() {
        worker::schedule_pending_processing(core.clone(), earliest);
    }

    Ok(())
}

fn lookup_pool(core: &Arc<AggregatorCore>, pool_id: PoolId) -> Result<Arc<dyn DataPool>> {
    core.state.lock().pools.get(&pool_id).cloned().ok_or(PoolError::NotFound(pool_id))
}

fn remove_replica(core: &Arc<AggregatorCore>, entity_id: EntityId, pool_id: PoolId) -> Result<()> {
    let local_id = {
        let mut state = core.state.lock();
        let Some(locations) = state.id_map.get_mut(&entity_id) else { return Ok(()) };
        let idx = locations.iter().position(|&(p, _)| p == pool_id);
        idx.map(|i| locations.remove(i).1)
    };
    if let Some(local_id) = local_id {
        let pool = lookup_pool(core, pool_id)?;
        pool.discard(local_id, core.config.erase_on_discard)?;
    }
    Ok(())
}

fn defer_step(core: &Arc<AggregatorCore>, entity_id: EntityId, step: PlainStep) {
    let mut state = core.state.lock();
    let run_at = Utc::now() + chrono::Duration::seconds(step.delay_seconds as i64);
    let sequence = state.next_sequence;
    state.next_sequence += 1;
    state.pending_actions.push(PendingAction { entity_id, step, run_at, sequence });
    *state.pending_count.entry(entity_id).or_insert(0) += 1;
    debug!(entity_id, run_at = %run_at, "deferred a plan step");
}

/// Executes every pending action whose `run_at` has passed, in (run_at,
/// sequence) order, then reschedules itself against whatever remains.
pub(crate) fn process_pending_actions(core: &Arc<AggregatorCore>) {
    let now = Utc::now();
    let due: Vec<PendingAction> = {
        let mut state = core.state.lock();
        let (due, remaining): (Vec<_>, Vec<_>) = state.pending_actions.drain(..).partition(|p| p.run_at <= now);
        state.pending_actions = remaining;
        due
    };

    let mut due = due;
    due.sort_by_key(|p| (p.run_at, p.sequence));

    let mut due = due.into_iter();
    while let Some(action) = due.next() {
        let result = match action.step.action {
            SimpleAction::Copy => execute_pending_copy(core, action.entity_id, action.step),
            SimpleAction::Remove => remove_replica(core, action.entity_id, action.step.source),
        };

        if let Err(e) = result {
            if core.config.complete_pending_store {
                warn!(entity_id = action.entity_id, error = %e, "pending action failed");
            } else {
                error!(entity_id = action.entity_id, error = %e, "pending action failed, aborting the rest of this cycle");
                // Put the failed action and everything still due back on the
                // queue instead of dropping them; they're retried on the next
                // scheduled pass rather than silently lost.
                let mut state = core.state.lock();
                state.pending_actions.push(action);
                state.pending_actions.extend(due);
                break;
            }
        }

        let mut state = core.state.lock();
        if let Some(count) = state.pending_count.get_mut(&action.entity_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                state.pending_count.remove(&action.entity_id);
            }
        }
    }

    if let Some(earliest) = core.state.lock().earliest_pending() {
        worker::schedule_pending_processing(core.clone(), earliest);
    }
}

fn execute_pending_copy(core: &Arc<AggregatorCore>, entity_id: EntityId, step: PlainStep) -> Result<()> {
    let target_id = step.target.ok_or(PlanFailure::NoValidPlacement)?;
    let source_pool = lookup_pool(core, step.source)?;
    let target_pool = lookup_pool(core, target_id)?;

    let local_source_id = {
        let state = core.state.lock();
        state.id_map.get(&entity_id).and_then(|locs| locs.iter().find(|&&(p, _)| p == step.source).map(|&(_, l)| l))
    };
    let Some(local_source_id) = local_source_id else { return Ok(()) };

    let local_target_id = copy_between_pools(&source_pool, &target_pool, local_source_id, core.config.max_non_streamable_data)?;

    let mut state = core.state.lock();
    state.id_map.entry(entity_id).or_default().push((target_id, local_target_id));
    Ok(())
}

/// Copies one entity from `source` to `target`, preferring a stream-to-stream
/// transfer when both pools support streaming and falling back to
/// retrieve+store (capped by `max_non_streamable_data`) otherwise. Returns
/// the entity's id at `target`.
fn copy_between_pools(
    source: &Arc<dyn DataPool>,
    target: &Arc<dyn DataPool>,
    local_source_id: EntityId,
    max_non_streamable: DataSize,
) -> Result<EntityId> {
    if source.supports_input_streams() && target.supports_output_streams() {
        let size = source.entity_size(local_source_id).ok_or(PoolError::NotFound(local_source_id))?;
        let mut input = source.input_stream(local_source_id)?;
        let mut output = target.output_stream(size)?;
        let local_target_id = output.entity_id();
        crate::stream::copy(&mut output, &mut input)?;
        return Ok(local_target_id);
    }
    let data = source.retrieve(local_source_id)?;
    if max_non_streamable != 0 && data.len() as DataSize > max_non_streamable {
        return Err(PoolError::UnsupportedOperation(format!(
            "entity of {} bytes exceeds the {max_non_streamable}-byte non-streamable transfer cap",
            data.len()
        )));
    }
    target.store(&data)
}
