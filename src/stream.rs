// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Bounded, one-shot cursors bound to a pool entity.
//!
//! A stream shares its parent pool's file mutex for the duration of each
//! `read`/`write` call only; it does not hold the lock between calls.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{PoolError, Result};
use crate::types::{Address, DataSize, EntityId, PoolId};

/// Shared per-entity lock bookkeeping a stream decrements on completion.
/// `read_locks` is a count (multiple readers allowed); `write_locked` excludes
/// everything else.
#[derive(Debug, Default)]
pub struct EntityLock {
    pub read_locks: AtomicU32,
    pub write_locked: AtomicBool,
}

pub struct PoolInputStream {
    pub(crate) pool_id: PoolId,
    pub(crate) id: EntityId,
    pub(crate) remaining: DataSize,
    pub(crate) start: Address,
    pub(crate) file_mutex: Arc<Mutex<File>>,
    pub(crate) lock: Arc<EntityLock>,
}

impl PoolInputStream {
    pub fn pool_id(&self) -> PoolId {
        self.pool_id
    }

    pub fn entity_id(&self) -> EntityId {
        self.id
    }

    pub fn remaining(&self) -> DataSize {
        self.remaining
    }

    /// Reads up to `n` bytes, advancing the cursor. Fails if `n` exceeds
    /// `remaining`; returns `IoError` if the underlying read fails.
    pub fn read(&mut self, n: DataSize) -> Result<Vec<u8>> {
        if n == 0 {
            return Err(PoolError::UnsupportedOperation("read length must be > 0".into()));
        }
        if n > self.remaining {
            return Err(PoolError::UnsupportedOperation(
                "attempted to read more data than is allowed".into(),
            ));
        }

        let mut file = self.file_mutex.lock();
        file.seek(SeekFrom::Start(self.start as u64))?;
        let mut buf = vec![0u8; n as usize];
        file.read_exact(&mut buf)?;
        drop(file);

        self.start += n;
        self.remaining -= n;
        if self.remaining == 0 {
            self.lock.read_locks.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(buf)
    }
}

pub struct PoolOutputStream {
    pub(crate) pool_id: PoolId,
    pub(crate) id: EntityId,
    pub(crate) remaining: DataSize,
    pub(crate) start: Address,
    pub(crate) file_mutex: Arc<Mutex<File>>,
    pub(crate) lock: Arc<EntityLock>,
}

impl PoolOutputStream {
    pub fn pool_id(&self) -> PoolId {
        self.pool_id
    }

    pub fn entity_id(&self) -> EntityId {
        self.id
    }

    pub fn remaining(&self) -> DataSize {
        self.remaining
    }

    /// Writes `data`, advancing the cursor. Fails if `data` is longer than
    /// `remaining`.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let n = data.len() as DataSize;
        if n == 0 {
            return Err(PoolError::UnsupportedOperation("write length must be > 0".into()));
        }
        if n > self.remaining {
            return Err(PoolError::UnsupportedOperation(
                "attempted to write more data than is allowed".into(),
            ));
        }

        let mut file = self.file_mutex.lock();
        file.seek(SeekFrom::Start(self.start as u64))?;
        file.write_all(data)?;
        drop(file);

        self.start += n;
        self.remaining -= n;
        if self.remaining == 0 {
            self.lock.write_locked.store(false, Ordering::SeqCst);
        }
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        let mut file = self.file_mutex.lock();
        file.flush()?;
        Ok(())
    }
}

/// Copies `input.remaining` bytes from `input` into `output`.
///
/// Acquires both pools' file mutexes in ascending `PoolId` order to avoid
/// deadlocking against a concurrent reverse copy, then validates that
/// neither stream is empty, that `output` has enough remaining capacity, and
/// that the two streams are not backed by the same file.
pub fn copy(output: &mut PoolOutputStream, input: &mut PoolInputStream) -> Result<()> {
    if input.remaining == 0 {
        return Err(PoolError::UnsupportedOperation(
            "input stream has no remaining data".into(),
        ));
    }
    if output.remaining < input.remaining {
        return Err(PoolError::UnsupportedOperation(
            "output stream cannot hold all of the input stream's data".into(),
        ));
    }
    if Arc::ptr_eq(&output.file_mutex, &input.file_mutex) {
        return Err(PoolError::UnsupportedOperation(
            "both streams use the same underlying file".into(),
        ));
    }

    // Lock order is by pool id, ascending, regardless of which side is input/output.
    let bytes_to_move = input.remaining;
    if output.pool_id <= input.pool_id {
        let mut out_file = output.file_mutex.lock();
        let mut in_file = input.file_mutex.lock();
        transfer(&mut out_file, output.start, &mut in_file, input.start, bytes_to_move)?;
    } else {
        let mut in_file = input.file_mutex.lock();
        let mut out_file = output.file_mutex.lock();
        transfer(&mut out_file, output.start, &mut in_file, input.start, bytes_to_move)?;
    }

    input.start += bytes_to_move;
    input.remaining = 0;
    input.lock.read_locks.fetch_sub(1, Ordering::SeqCst);

    output.start += bytes_to_move;
    output.remaining -= bytes_to_move;
    if output.remaining == 0 {
        output.lock.write_locked.store(false, Ordering::SeqCst);
    }

    Ok(())
}

fn transfer(
    out_file: &mut File,
    out_start: Address,
    in_file: &mut File,
    in_start: Address,
    n: DataSize,
) -> Result<()> {
    in_file.seek(SeekFrom::Start(in_start as u64))?;
    let mut buf = vec![0u8; n as usize];
    in_file.read_exact(&mut buf)?;

    out_file.seek(SeekFrom::Start(out_start as u64))?;
    out_file.write_all(&buf)?;
    out_file.flush()?;
    Ok(())
}
