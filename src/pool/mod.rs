// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! The pool contract: the uniform set of operations implemented by disk
//! pools, memory pools, and the aggregator itself.

pub mod disk;
pub mod memory;

use crate::error::Result;
use crate::stream::{PoolInputStream, PoolOutputStream};
use crate::types::{DataPoolType, DataSize, EntityId, PoolId, PoolMode, PoolState, PoolUuid};

/// Implemented by every storage backend this crate exposes (disk, memory, and
/// the aggregator, which fans requests out across a link graph of its own).
/// Object-safe so callers hold `Arc<dyn DataPool>` handles.
pub trait DataPool: Send + Sync {
    fn retrieve(&self, id: EntityId) -> Result<Vec<u8>>;
    fn store(&self, data: &[u8]) -> Result<EntityId>;
    fn discard(&self, id: EntityId, erase: bool) -> Result<()>;
    fn clear(&self) -> Result<()>;

    /// Aggregator-local handle, stamped onto the pool when it is registered
    /// via `Aggregator::add_pool` so that streams it hands out can be
    /// ordered for cross-pool copies (§5 lock ordering).
    fn set_pool_id(&self, id: PoolId);
    fn pool_id(&self) -> PoolId;

    fn pool_type(&self) -> DataPoolType;
    fn uuid(&self) -> PoolUuid;
    fn pool_size(&self) -> DataSize;
    fn free_space(&self) -> DataSize;
    fn stored_entities(&self) -> u32;
    fn can_store(&self, size: DataSize) -> bool;
    fn entity_size(&self, id: EntityId) -> Option<DataSize>;
    fn pool_overhead(&self) -> DataSize;
    fn entity_overhead(&self) -> DataSize;
    fn supports_input_streams(&self) -> bool;
    fn supports_output_streams(&self) -> bool;
    fn bytes_read(&self) -> u64;
    fn bytes_written(&self) -> u64;
    fn mode(&self) -> PoolMode;
    fn state(&self) -> PoolState;

    fn input_stream(&self, id: EntityId) -> Result<PoolInputStream>;
    fn output_stream(&self, size: DataSize) -> Result<PoolOutputStream>;
}
