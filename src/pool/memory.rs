// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! In-memory reference implementation of the pool contract. No streaming,
//! no on-disk layout — a degenerate pool used as a target or as a test
//! double for the aggregator.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::{PoolError, Result};
use crate::pool::DataPool;
use crate::stream::{PoolInputStream, PoolOutputStream};
use crate::types::{DataPoolType, DataSize, EntityId, PoolId, PoolMode, PoolState, PoolUuid};

struct Inner {
    entities: HashMap<EntityId, Vec<u8>>,
    last_entity_id: EntityId,
    free_space: DataSize,
}

pub struct MemoryDataPool {
    uuid: PoolUuid,
    mode: PoolMode,
    size: DataSize,
    inner: Mutex<Inner>,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
    state: AtomicU32,
    pool_id: AtomicU32,
}

const STATE_OPEN: u32 = 0;
const STATE_CLOSED: u32 = 1;

impl MemoryDataPool {
    pub fn new(mode: PoolMode, size: DataSize) -> Self {
        MemoryDataPool {
            uuid: PoolUuid::new(),
            mode,
            size,
            inner: Mutex::new(Inner { entities: HashMap::new(), last_entity_id: 0, free_space: size }),
            bytes_read: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            state: AtomicU32::new(STATE_OPEN),
            pool_id: AtomicU32::new(0),
        }
    }

    pub fn close(&self) {
        self.state.store(STATE_CLOSED, Ordering::SeqCst);
    }

    fn require_open(&self) -> Result<()> {
        if self.state.load(Ordering::SeqCst) != STATE_OPEN {
            return Err(PoolError::NotOpen);
        }
        Ok(())
    }

    fn require_writable(&self) -> Result<()> {
        self.require_open()?;
        if self.mode == PoolMode::ReadOnly {
            return Err(PoolError::ReadOnly);
        }
        Ok(())
    }
}

impl DataPool for MemoryDataPool {
    fn retrieve(&self, id: EntityId) -> Result<Vec<u8>> {
        self.require_open()?;
        let inner = self.inner.lock();
        let data = inner.entities.get(&id).cloned().ok_or(PoolError::NotFound(id))?;
        self.bytes_read.fetch_add(data.len() as u64, Ordering::Relaxed);
        Ok(data)
    }

    fn store(&self, data: &[u8]) -> Result<EntityId> {
        self.require_writable()?;
        if data.is_empty() {
            return Err(PoolError::UnsupportedOperation("cannot store empty data".into()));
        }
        let mut inner = self.inner.lock();
        let size = data.len() as DataSize;
        if size > inner.free_space {
            return Err(PoolError::OutOfSpace { requested: size, largest_free: inner.free_space });
        }
        inner.last_entity_id += 1;
        let id = inner.last_entity_id;
        inner.entities.insert(id, data.to_vec());
        inner.free_space -= size;
        drop(inner);
        self.bytes_written.fetch_add(size as u64, Ordering::Relaxed);
        Ok(id)
    }

    fn discard(&self, id: EntityId, _erase: bool) -> Result<()> {
        self.require_writable()?;
        let mut inner = self.inner.lock();
        let data = inner.entities.remove(&id).ok_or(PoolError::NotFound(id))?;
        inner.free_space += data.len() as DataSize;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.require_writable()?;
        let mut inner = self.inner.lock();
        inner.entities.clear();
        inner.free_space = self.size;
        Ok(())
    }

    fn set_pool_id(&self, id: PoolId) {
        self.pool_id.store(id, Ordering::SeqCst);
    }

    fn pool_id(&self) -> PoolId {
        self.pool_id.load(Ordering::SeqCst)
    }

    fn pool_type(&self) -> DataPoolType {
        DataPoolType::LocalMemory
    }

    fn uuid(&self) -> PoolUuid {
        self.uuid
    }

    fn pool_size(&self) -> DataSize {
        self.size
    }

    fn free_space(&self) -> DataSize {
        self.inner.lock().free_space
    }

    fn stored_entities(&self) -> u32 {
        self.inner.lock().entities.len() as u32
    }

    fn can_store(&self, size: DataSize) -> bool {
        self.inner.lock().free_space >= size
    }

    fn entity_size(&self, id: EntityId) -> Option<DataSize> {
        self.inner.lock().entities.get(&id).map(|d| d.len() as DataSize)
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
        self.bytes_read.load(Ordering::Relaxed)
    }

    fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    fn mode(&self) -> PoolMode {
        self.mode
    }

    fn state(&self) -> PoolState {
        match self.state.load(Ordering::SeqCst) {
            STATE_OPEN => PoolState::Open,
            _ => PoolState::Closed,
        }
    }

    fn input_stream(&self, _id: EntityId) -> Result<PoolInputStream> {
        Err(PoolError::UnsupportedOperation("memory pool does not support input streams".into()))
    }

    fn output_stream(&self, _size: DataSize) -> Result<PoolOutputStream> {
        Err(PoolError::UnsupportedOperation("memory pool does not support output streams".into()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn store_and_retrieve_round_trip() {
        let pool = MemoryDataPool::new(PoolMode::ReadWrite, 1024);
        let id = pool.store(b"hello").unwrap();
        assert_eq!(pool.retrieve(id).unwrap(), b"hello");
    }

    #[test]
    fn discard_frees_space() {
        let pool = MemoryDataPool::new(PoolMode::ReadWrite, 10);
        let id = pool.store(b"hello").unwrap();
        assert_eq!(pool.free_space(), 5);
        pool.discard(id, false).unwrap();
        assert_eq!(pool.free_space(), 10);
        assert!(matches!(pool.retrieve(id), Err(PoolError::NotFound(_))));
    }

    #[test]
    fn read_only_rejects_store() {
        let pool = MemoryDataPool::new(PoolMode::ReadOnly, 10);
        assert!(matches!(pool.store(b"x"), Err(PoolError::ReadOnly)));
    }

    #[test]
    fn out_of_space_is_reported() {
        let pool = MemoryDataPool::new(PoolMode::ReadWrite, 4);
        assert!(matches!(pool.store(b"hello"), Err(PoolError::OutOfSpace { .. })));
    }
}
