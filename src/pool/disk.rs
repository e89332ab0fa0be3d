// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Single-file append/free-list storage: the Disk Data Pool.
//!
//! A file consists of a fixed preamble (magic, version, uuid, header), a body
//! region holding a singly-linked chain of entity headers and bodies plus
//! whatever free space the allocator has not handed out, and a footer.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::codec::{
    decode_uuid, encode_uuid, validate_magic_and_version, EntityHeader, PoolFooter, PoolHeader,
    ENTITY_HEADER_LEN, POOL_FOOTER_LEN, POOL_HEADER_LEN, POOL_OVERHEAD, PREAMBLE_LEN, UUID_LEN,
};
use crate::error::{PoolError, Result};
use crate::freelist::FreeList;
use crate::pool::DataPool;
use crate::stream::{EntityLock, PoolInputStream, PoolOutputStream};
use crate::types::{Address, DataPoolType, DataSize, EntityId, PoolId, PoolMode, PoolState, PoolUuid};

struct EntityMeta {
    address: Address,
    size: DataSize,
    prev_id: EntityId,
    next_id: EntityId,
    lock: Arc<EntityLock>,
}

struct Chain {
    first_header_addr: Address,
    last_header_addr: Address,
    entities_count: u32,
    last_data_id: EntityId,
    footer_addr: Address,
}

struct Inner {
    state: PoolState,
    free_list: FreeList,
    entities: HashMap<EntityId, EntityMeta>,
    chain: Chain,
}

/// A single-file append/free-list storage pool matching the canonical
/// on-disk layout in full: magic, version, uuid, header, entity chain,
/// footer, all big-endian.
pub struct DiskDataPool {
    uuid: PoolUuid,
    mode: PoolMode,
    size: DataSize,
    file: Arc<Mutex<File>>,
    inner: Mutex<Inner>,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
    pool_id: AtomicU32,
}

impl DiskDataPool {
    /// Creates a new pool file at `path`, truncated to exactly `size` bytes.
    /// Fails if `path` already exists or `size <= POOL_OVERHEAD`.
    pub fn init<P: AsRef<Path>>(path: P, size: DataSize, mode: PoolMode) -> Result<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();
        if size <= POOL_OVERHEAD {
            return Err(PoolError::ConfigurationError(format!(
                "pool size {size} must exceed the {POOL_OVERHEAD}-byte overhead"
            )));
        }
        if path.exists() {
            return Err(PoolError::ConfigurationError(format!("{path:?} already exists")));
        }

        let uuid = PoolUuid::new();
        let footer_addr = size - POOL_FOOTER_LEN;

        let mut file = OpenOptions::new().read(true).write(true).create_new(true).open(&path)?;
        file.set_len(size as u64)?;

        file.seek(SeekFrom::Start(0))?;
        file.write_all(crate::codec::MAGIC)?;
        file.write_all(&[crate::codec::VERSION])?;
        file.write_all(&encode_uuid(&uuid))?;
        file.write_all(&PoolHeader { footer_addr }.encode())?;

        let footer = PoolFooter { entities_count: 0, first_header_addr: 0, last_data_id: 0 };
        file.seek(SeekFrom::Start(footer_addr as u64))?;
        file.write_all(&footer.encode())?;
        file.flush()?;

        let mut free_list = FreeList::new();
        free_list.reset_single_chunk(PREAMBLE_LEN, footer_addr - PREAMBLE_LEN);

        info!(uuid = %uuid, size, path = ?path, "disk data pool initialized");

        Ok(DiskDataPool {
            uuid,
            mode,
            size,
            file: Arc::new(Mutex::new(file)),
            inner: Mutex::new(Inner {
                state: PoolState::Open,
                free_list,
                entities: HashMap::new(),
                chain: Chain { first_header_addr: 0, last_header_addr: 0, entities_count: 0, last_data_id: 0, footer_addr },
            }),
            bytes_read: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            pool_id: AtomicU32::new(0),
        })
    }

    /// Opens an existing pool file, validating the preamble and footer and
    /// walking the entity chain to reconstruct the in-memory index.
    pub fn load<P: AsRef<Path>>(path: P, mode: PoolMode) -> Result<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().read(true).write(mode == PoolMode::ReadWrite).open(&path)?;

        let size = file.metadata()?.len() as DataSize;

        let mut preamble = vec![0u8; 4];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut preamble)?;
        validate_magic_and_version(&preamble)?;

        let mut uuid_buf = [0u8; UUID_LEN];
        file.read_exact(&mut uuid_buf)?;
        let uuid = decode_uuid(&uuid_buf)?;

        let mut header_buf = [0u8; POOL_HEADER_LEN as usize];
        file.read_exact(&mut header_buf)?;
        let header = PoolHeader::decode(&header_buf)?;
        let footer_addr = header.footer_addr;
        if footer_addr < PREAMBLE_LEN || footer_addr + POOL_FOOTER_LEN > size {
            return Err(PoolError::CorruptFormat("footer address out of bounds".into()));
        }

        file.seek(SeekFrom::Start(footer_addr as u64))?;
        let mut footer_buf = [0u8; POOL_FOOTER_LEN as usize];
        file.read_exact(&mut footer_buf)?;
        let footer = PoolFooter::decode(&footer_buf)?;

        let mut entities = HashMap::new();
        let mut occupied: Vec<(Address, DataSize)> = Vec::new();
        let mut cursor_addr = footer.first_header_addr;
        let mut prev_id: EntityId = 0;
        let mut last_header_addr = 0;

        for _ in 0..footer.entities_count {
            if cursor_addr == 0 || cursor_addr < PREAMBLE_LEN || cursor_addr >= footer_addr {
                return Err(PoolError::CorruptFormat("entity chain address out of bounds".into()));
            }

            file.seek(SeekFrom::Start(cursor_addr as u64))?;
            let mut hbuf = [0u8; ENTITY_HEADER_LEN as usize];
            file.read_exact(&mut hbuf)?;
            let header = EntityHeader::decode(&hbuf)?;

            occupied.push((cursor_addr, ENTITY_HEADER_LEN + header.size));
            entities.insert(
                header.id,
                EntityMeta {
                    address: cursor_addr,
                    size: header.size,
                    prev_id,
                    next_id: 0, // patched below once the next entity is known
                    lock: Arc::new(EntityLock::default()),
                },
            );

            if let Some(meta) = entities.get_mut(&prev_id) {
                meta.next_id = header.id;
            }

            prev_id = header.id;
            last_header_addr = cursor_addr;
            cursor_addr = header.next_header_addr;
        }
        if cursor_addr != 0 {
            return Err(PoolError::CorruptFormat(
                "entity chain did not terminate after entities_count steps".into(),
            ));
        }

        let free_list = rebuild_free_list(PREAMBLE_LEN, footer_addr, &occupied)?;

        info!(uuid = %uuid, entities = footer.entities_count, path = ?path, "disk data pool loaded");

        Ok(DiskDataPool {
            uuid,
            mode,
            size,
            file: Arc::new(Mutex::new(file)),
            inner: Mutex::new(Inner {
                state: PoolState::Open,
                free_list,
                entities,
                chain: Chain {
                    first_header_addr: footer.first_header_addr,
                    last_header_addr,
                    entities_count: footer.entities_count,
                    last_data_id: footer.last_data_id,
                    footer_addr,
                },
            }),
            bytes_read: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            pool_id: AtomicU32::new(0),
        })
    }

    fn require_open(&self, inner: &Inner) -> Result<()> {
        if inner.state != PoolState::Open {
            return Err(PoolError::NotOpen);
        }
        Ok(())
    }

    fn require_writable(&self, inner: &Inner) -> Result<()> {
        self.require_open(inner)?;
        if self.mode == PoolMode::ReadOnly {
            return Err(PoolError::ReadOnly);
        }
        Ok(())
    }

    fn write_footer_locked(&self, inner: &Inner, file: &mut File) -> std::io::Result<()> {
        let footer = PoolFooter {
            entities_count: inner.chain.entities_count,
            first_header_addr: inner.chain.first_header_addr,
            last_data_id: inner.chain.last_data_id,
        };
        file.seek(SeekFrom::Start(inner.chain.footer_addr as u64))?;
        file.write_all(&footer.encode())?;
        file.flush()
    }

    fn mark_failed(&self, inner: &mut Inner, op: &str, err: &std::io::Error) {
        inner.state = PoolState::Failed;
        error!(uuid = %self.uuid, op, error = %err, "disk data pool transitioned to FAILED");
    }
}

/// Computes the maximal free chunks in `[region_start, region_end)` given a
/// set of non-overlapping occupied ranges, equivalent to subtracting each
/// occupied range out of the single initial chunk one at a time.
fn rebuild_free_list(region_start: Address, region_end: Address, occupied: &[(Address, DataSize)]) -> Result<FreeList> {
    let mut ranges = occupied.to_vec();
    ranges.sort_by_key(|&(addr, _)| addr);

    let mut free_list = FreeList::new();
    let mut cursor = region_start;
    for &(addr, len) in &ranges {
        if addr < cursor || addr + len > region_end {
            return Err(PoolError::CorruptFormat("entity ranges overlap or escape the body region".into()));
        }
        if addr > cursor {
            free_list.free(cursor, addr - cursor);
        }
        cursor = addr + len;
    }
    if cursor < region_end {
        free_list.free(cursor, region_end - cursor);
    }
    Ok(free_list)
}

impl DataPool for DiskDataPool {
    fn retrieve(&self, id: EntityId) -> Result<Vec<u8>> {
        let inner = self.inner.lock();
        // FAILED still serves reads of already-indexed entities; only CLOSED
        // refuses everything. Mutating operations go through require_open/
        // require_writable and reject FAILED like any other non-OPEN state.
        if inner.state == PoolState::Closed {
            return Err(PoolError::NotOpen);
        }
        let meta = inner.entities.get(&id).ok_or(PoolError::NotFound(id))?;
        if meta.lock.write_locked.load(Ordering::SeqCst) {
            return Err(PoolError::StreamInUse(id));
        }
        let addr = meta.address;
        let size = meta.size;
        drop(inner);

        let mut file = self.file.lock();
        let result = (|| -> std::io::Result<Vec<u8>> {
            file.seek(SeekFrom::Start((addr + ENTITY_HEADER_LEN) as u64))?;
            let mut buf = vec![0u8; size as usize];
            file.read_exact(&mut buf)?;
            Ok(buf)
        })();
        drop(file);

        match result {
            Ok(buf) => {
                self.bytes_read.fetch_add(size as u64, Ordering::Relaxed);
                Ok(buf)
            }
            Err(e) => {
                let mut inner = self.inner.lock();
                self.mark_failed(&mut inner, "retrieve", &e);
                Err(PoolError::IoError(e))
            }
        }
    }

    fn store(&self, data: &[u8]) -> Result<EntityId> {
        if data.is_empty() {
            return Err(PoolError::UnsupportedOperation("cannot store empty data".into()));
        }

        let mut inner = self.inner.lock();
        self.require_writable(&inner)?;

        let needed = ENTITY_HEADER_LEN + data.len() as DataSize;
        let addr = inner
            .free_list
            .allocate(needed)
            .ok_or(PoolError::OutOfSpace { requested: needed, largest_free: inner.free_list.largest_chunk() })?;

        let new_id = inner.chain.last_data_id + 1;
        let prev_tail = inner.chain.last_header_addr;
        let prev_tail_id = if prev_tail == 0 {
            0
        } else {
            inner.entities.iter().find(|(_, m)| m.address == prev_tail).map(|(&id, _)| id).unwrap_or(0)
        };

        let mut file = self.file.lock();
        let write_result = (|| -> std::io::Result<()> {
            if prev_tail != 0 {
                let mut prev_header_buf = [0u8; ENTITY_HEADER_LEN as usize];
                file.seek(SeekFrom::Start(prev_tail as u64))?;
                file.read_exact(&mut prev_header_buf)?;
                let mut prev_header = EntityHeader::decode(&prev_header_buf)
                    .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidData, "corrupt predecessor header"))?;
                prev_header.next_header_addr = addr;
                file.seek(SeekFrom::Start(prev_tail as u64))?;
                file.write_all(&prev_header.encode())?;
            }

            let header = EntityHeader { id: new_id, size: data.len() as DataSize, next_header_addr: 0 };
            file.seek(SeekFrom::Start(addr as u64))?;
            file.write_all(&header.encode())?;
            file.write_all(data)?;

            Ok(())
        })();

        if let Err(e) = write_result {
            drop(file);
            self.mark_failed(&mut inner, "store", &e);
            return Err(PoolError::IoError(e));
        }

        if prev_tail != 0 {
            if let Some(meta) = inner.entities.values_mut().find(|m| m.address == prev_tail) {
                meta.next_id = new_id;
            }
        } else {
            inner.chain.first_header_addr = addr;
        }
        inner.chain.last_header_addr = addr;
        inner.chain.entities_count += 1;
        inner.chain.last_data_id = new_id;

        if let Err(e) = self.write_footer_locked(&inner, &mut file) {
            drop(file);
            self.mark_failed(&mut inner, "store (footer)", &e);
            return Err(PoolError::IoError(e));
        }
        drop(file);

        inner.entities.insert(
            new_id,
            EntityMeta { address: addr, size: data.len() as DataSize, prev_id: prev_tail_id, next_id: 0, lock: Arc::new(EntityLock::default()) },
        );

        drop(inner);
        self.bytes_written.fetch_add(data.len() as u64, Ordering::Relaxed);
        debug!(uuid = %self.uuid, id = new_id, size = data.len(), "entity stored");
        Ok(new_id)
    }

    fn discard(&self, id: EntityId, erase: bool) -> Result<()> {
        let mut inner = self.inner.lock();
        self.require_writable(&inner)?;

        let meta_address;
        let meta_size;
        let meta_prev;
        let meta_next;
        {
            let meta = inner.entities.get(&id).ok_or(PoolError::NotFound(id))?;
            if meta.lock.read_locks.load(Ordering::SeqCst) > 0 || meta.lock.write_locked.load(Ordering::SeqCst) {
                return Err(PoolError::StreamInUse(id));
            }
            meta_address = meta.address;
            meta_size = meta.size;
            meta_prev = meta.prev_id;
            meta_next = meta.next_id;
        }

        let next_addr = if meta_next == 0 { 0 } else { inner.entities.get(&meta_next).map(|m| m.address).unwrap_or(0) };

        let mut file = self.file.lock();
        let patch_result = (|| -> std::io::Result<()> {
            if meta_prev != 0 {
                if let Some(prev_meta) = inner.entities.get(&meta_prev) {
                    let prev_addr = prev_meta.address;
                    let mut hbuf = [0u8; ENTITY_HEADER_LEN as usize];
                    file.seek(SeekFrom::Start(prev_addr as u64))?;
                    file.read_exact(&mut hbuf)?;
                    let mut prev_header = EntityHeader::decode(&hbuf)
                        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidData, "corrupt predecessor header"))?;
                    prev_header.next_header_addr = next_addr;
                    file.seek(SeekFrom::Start(prev_addr as u64))?;
                    file.write_all(&prev_header.encode())?;
                }
            }

            if erase {
                let zeros = vec![0u8; (ENTITY_HEADER_LEN + meta_size) as usize];
                file.seek(SeekFrom::Start(meta_address as u64))?;
                file.write_all(&zeros)?;
            }

            Ok(())
        })();

        if let Err(e) = patch_result {
            drop(file);
            self.mark_failed(&mut inner, "discard", &e);
            return Err(PoolError::IoError(e));
        }

        if meta_prev == 0 {
            inner.chain.first_header_addr = next_addr;
        }
        if inner.chain.last_header_addr == meta_address {
            inner.chain.last_header_addr = if meta_prev == 0 { 0 } else { inner.entities.get(&meta_prev).map(|m| m.address).unwrap_or(0) };
        }
        inner.chain.entities_count -= 1;

        if let Some(next_meta) = inner.entities.get_mut(&meta_next) {
            next_meta.prev_id = meta_prev;
        }
        if meta_prev != 0 {
            if let Some(prev_meta) = inner.entities.get_mut(&meta_prev) {
                prev_meta.next_id = meta_next;
            }
        }

        if let Err(e) = self.write_footer_locked(&inner, &mut file) {
            drop(file);
            self.mark_failed(&mut inner, "discard (footer)", &e);
            return Err(PoolError::IoError(e));
        }
        drop(file);

        inner.entities.remove(&id);
        inner.free_list.free(meta_address, ENTITY_HEADER_LEN + meta_size);
        debug!(uuid = %self.uuid, id, erase, "entity discarded");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        self.require_writable(&inner)?;

        inner.entities.clear();
        let footer_addr = inner.chain.footer_addr;
        inner.free_list.reset_single_chunk(PREAMBLE_LEN, footer_addr - PREAMBLE_LEN);
        inner.chain.first_header_addr = 0;
        inner.chain.last_header_addr = 0;
        inner.chain.entities_count = 0;

        let mut file = self.file.lock();
        if let Err(e) = self.write_footer_locked(&inner, &mut file) {
            drop(file);
            self.mark_failed(&mut inner, "clear", &e);
            return Err(PoolError::IoError(e));
        }

        warn!(uuid = %self.uuid, "pool cleared; on-disk entity bodies were not overwritten");
        Ok(())
    }

    fn set_pool_id(&self, id: PoolId) {
        self.pool_id.store(id, Ordering::SeqCst);
    }

    fn pool_id(&self) -> PoolId {
        self.pool_id.load(Ordering::SeqCst)
    }

    fn pool_type(&self) -> DataPoolType {
        DataPoolType::LocalDisk
    }

    fn uuid(&self) -> PoolUuid {
        self.uuid
    }

    fn pool_size(&self) -> DataSize {
        self.size
    }

    fn free_space(&self) -> DataSize {
        self.inner.lock().free_list.total_free() as DataSize
    }

    fn stored_entities(&self) -> u32 {
        self.inner.lock().chain.entities_count
    }

    fn can_store(&self, size: DataSize) -> bool {
        self.inner.lock().free_list.can_fit(ENTITY_HEADER_LEN + size)
    }

    fn entity_size(&self, id: EntityId) -> Option<DataSize> {
        self.inner.lock().entities.get(&id).map(|m| m.size)
    }

    fn pool_overhead(&self) -> DataSize {
        POOL_OVERHEAD
    }

    fn entity_overhead(&self) -> DataSize {
        ENTITY_HEADER_LEN
    }

    fn supports_input_streams(&self) -> bool {
        true
    }

    fn supports_output_streams(&self) -> bool {
        true
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
        self.inner.lock().state
    }

    fn input_stream(&self, id: EntityId) -> Result<PoolInputStream> {
        let inner = self.inner.lock();
        self.require_open(&inner)?;
        let meta = inner.entities.get(&id).ok_or(PoolError::NotFound(id))?;
        if meta.lock.write_locked.load(Ordering::SeqCst) {
            return Err(PoolError::StreamInUse(id));
        }
        meta.lock.read_locks.fetch_add(1, Ordering::SeqCst);
        Ok(PoolInputStream {
            pool_id: self.pool_id(),
            id,
            remaining: meta.size,
            start: meta.address + ENTITY_HEADER_LEN,
            file_mutex: self.file.clone(),
            lock: meta.lock.clone(),
        })
    }

    fn output_stream(&self, size: DataSize) -> Result<PoolOutputStream> {
        if size == 0 {
            return Err(PoolError::UnsupportedOperation("output stream size must be > 0".into()));
        }

        let mut inner = self.inner.lock();
        self.require_writable(&inner)?;

        let needed = ENTITY_HEADER_LEN + size;
        let addr = inner
            .free_list
            .allocate(needed)
            .ok_or(PoolError::OutOfSpace { requested: needed, largest_free: inner.free_list.largest_chunk() })?;

        let new_id = inner.chain.last_data_id + 1;
        let prev_tail = inner.chain.last_header_addr;
        let prev_tail_id = if prev_tail == 0 {
            0
        } else {
            inner.entities.iter().find(|(_, m)| m.address == prev_tail).map(|(&id, _)| id).unwrap_or(0)
        };

        let mut file = self.file.lock();
        let write_result = (|| -> std::io::Result<()> {
            if prev_tail != 0 {
                let mut prev_header_buf = [0u8; ENTITY_HEADER_LEN as usize];
                file.seek(SeekFrom::Start(prev_tail as u64))?;
                file.read_exact(&mut prev_header_buf)?;
                let mut prev_header = EntityHeader::decode(&prev_header_buf)
                    .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidData, "corrupt predecessor header"))?;
                prev_header.next_header_addr = addr;
                file.seek(SeekFrom::Start(prev_tail as u64))?;
                file.write_all(&prev_header.encode())?;
            }

            let header = EntityHeader { id: new_id, size, next_header_addr: 0 };
            file.seek(SeekFrom::Start(addr as u64))?;
            file.write_all(&header.encode())?;
            Ok(())
        })();

        if let Err(e) = write_result {
            drop(file);
            self.mark_failed(&mut inner, "output_stream", &e);
            return Err(PoolError::IoError(e));
        }

        if prev_tail != 0 {
            if let Some(meta) = inner.entities.values_mut().find(|m| m.address == prev_tail) {
                meta.next_id = new_id;
            }
        } else {
            inner.chain.first_header_addr = addr;
        }
        inner.chain.last_header_addr = addr;
        inner.chain.entities_count += 1;
        inner.chain.last_data_id = new_id;

        if let Err(e) = self.write_footer_locked(&inner, &mut file) {
            drop(file);
            self.mark_failed(&mut inner, "output_stream (footer)", &e);
            return Err(PoolError::IoError(e));
        }
        drop(file);

        let lock = Arc::new(EntityLock::default());
        lock.write_locked.store(true, Ordering::SeqCst);
        inner.entities.insert(new_id, EntityMeta { address: addr, size, prev_id: prev_tail_id, next_id: 0, lock: lock.clone() });

        Ok(PoolOutputStream {
            pool_id: self.pool_id(),
            id: new_id,
            remaining: size,
            start: addr + ENTITY_HEADER_LEN,
            file_mutex: self.file.clone(),
            lock,
        })
    }
}
