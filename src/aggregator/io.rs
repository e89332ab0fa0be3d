// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Value objects for exporting/importing aggregator configuration, the
//! virtual-to-physical id map, and pending actions. No wire format is
//! mandated; these derive `serde` so callers can pick JSON, TOML, etc.

use serde::{Deserialize, Serialize};

use crate::link::{Action, Condition};
use crate::types::{EntityId, PoolId, PoolUuid};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkManifest {
    pub source: PoolUuid,
    pub target: PoolUuid,
    pub action: SerializableAction,
    pub condition: SerializableCondition,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum SerializableAction {
    Copy,
    Move,
    Distribute,
    Discard,
    Skip,
}

impl From<Action> for SerializableAction {
    fn from(a: Action) -> Self {
        match a {
            Action::Copy => SerializableAction::Copy,
            Action::Move => SerializableAction::Move,
            Action::Distribute => SerializableAction::Distribute,
            Action::Discard => SerializableAction::Discard,
            Action::Skip => SerializableAction::Skip,
        }
    }
}

impl From<SerializableAction> for Action {
    fn from(a: SerializableAction) -> Self {
        match a {
            SerializableAction::Copy => Action::Copy,
            SerializableAction::Move => Action::Move,
            SerializableAction::Distribute => Action::Distribute,
            SerializableAction::Discard => Action::Discard,
            SerializableAction::Skip => Action::Skip,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum SerializableCondition {
    None,
    Timed(u64),
    SourceMinFull(u32),
    SourceMaxFull(u32),
    TargetMinFull(u32),
    TargetMaxFull(u32),
    SourceMinEntities(u32),
    SourceMaxEntities(u32),
    TargetMinEntities(u32),
    TargetMaxEntities(u32),
    DataMinSize(u32),
    DataMaxSize(u32),
}

impl From<Condition> for SerializableCondition {
    fn from(c: Condition) -> Self {
        match c {
            Condition::None => SerializableCondition::None,
            Condition::Timed(s) => SerializableCondition::Timed(s),
            Condition::SourceMinFull(v) => SerializableCondition::SourceMinFull(v),
            Condition::SourceMaxFull(v) => SerializableCondition::SourceMaxFull(v),
            Condition::TargetMinFull(v) => SerializableCondition::TargetMinFull(v),
            Condition::TargetMaxFull(v) => SerializableCondition::TargetMaxFull(v),
            Condition::SourceMinEntities(v) => SerializableCondition::SourceMinEntities(v),
            Condition::SourceMaxEntities(v) => SerializableCondition::SourceMaxEntities(v),
            Condition::TargetMinEntities(v) => SerializableCondition::TargetMinEntities(v),
            Condition::TargetMaxEntities(v) => SerializableCondition::TargetMaxEntities(v),
            Condition::DataMinSize(v) => SerializableCondition::DataMinSize(v),
            Condition::DataMaxSize(v) => SerializableCondition::DataMaxSize(v),
        }
    }
}

impl From<SerializableCondition> for Condition {
    fn from(c: SerializableCondition) -> Self {
        match c {
            SerializableCondition::None => Condition::None,
            SerializableCondition::Timed(s) => Condition::Timed(s),
            SerializableCondition::SourceMinFull(v) => Condition::SourceMinFull(v),
            SerializableCondition::SourceMaxFull(v) => Condition::SourceMaxFull(v),
            SerializableCondition::TargetMinFull(v) => Condition::TargetMinFull(v),
            SerializableCondition::TargetMaxFull(v) => Condition::TargetMaxFull(v),
            SerializableCondition::SourceMinEntities(v) => Condition::SourceMinEntities(v),
            SerializableCondition::SourceMaxEntities(v) => Condition::SourceMaxEntities(v),
            SerializableCondition::TargetMinEntities(v) => Condition::TargetMinEntities(v),
            SerializableCondition::TargetMaxEntities(v) => Condition::TargetMaxEntities(v),
            SerializableCondition::DataMinSize(v) => Condition::DataMinSize(v),
            SerializableCondition::DataMaxSize(v) => Condition::DataMaxSize(v),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorManifest {
    pub uuid: PoolUuid,
    pub complete_retrieve: bool,
    pub complete_discard: bool,
    pub complete_pending_store: bool,
    pub erase_on_discard: bool,
    pub cancel_actions_on_shutdown: bool,
    pub max_non_streamable_data: u32,
    pub store_worker_channel_bound: usize,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub last_entity_id: EntityId,
    pub streaming_pool_uuid: Option<PoolUuid>,
    pub pool_uuids: Vec<PoolUuid>,
    pub links: Vec<LinkManifest>,
}

/// A flat `(aggregator_id, pool_id, pool_local_id)` tuple, exported/imported
/// independently of the manifest above.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IdMapEntry {
    pub aggregator_id: EntityId,
    pub pool_id: PoolId,
    pub pool_local_id: EntityId,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PendingActionEntry {
    pub entity_id: EntityId,
    pub action: SerializableAction,
    pub source: PoolId,
    pub target: Option<PoolId>,
    pub run_at_unix_seconds: i64,
}
