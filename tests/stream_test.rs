// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

use tempfile::TempDir;

use tiered_pool::error::PoolError;
use tiered_pool::pool::disk::DiskDataPool;
use tiered_pool::pool::DataPool;
use tiered_pool::stream;
use tiered_pool::types::PoolMode;

#[test]
fn output_stream_rejects_overlong_write() {
    let dir = TempDir::new().unwrap();
    let pool = DiskDataPool::init(dir.path().join("a.ddp"), 4096, PoolMode::ReadWrite).unwrap();

    let mut out = pool.output_stream(4).unwrap();
    let err = out.write(b"too long").unwrap_err();
    assert!(matches!(err, PoolError::UnsupportedOperation(_)));
}

#[test]
fn input_stream_rejects_overlong_read() {
    let dir = TempDir::new().unwrap();
    let pool = DiskDataPool::init(dir.path().join("a.ddp"), 4096, PoolMode::ReadWrite).unwrap();
    let id = pool.store(b"short").unwrap();

    let mut input = pool.input_stream(id).unwrap();
    let err = input.read(100).unwrap_err();
    assert!(matches!(err, PoolError::UnsupportedOperation(_)));
}

#[test]
fn output_stream_write_in_chunks_completes_entity() {
    let dir = TempDir::new().unwrap();
    let pool = DiskDataPool::init(dir.path().join("a.ddp"), 4096, PoolMode::ReadWrite).unwrap();

    let mut out = pool.output_stream(10).unwrap();
    let id = out.entity_id();
    out.write(b"hello").unwrap();
    out.write(b"world").unwrap();

    assert_eq!(pool.retrieve(id).unwrap(), b"helloworld");
}

#[test]
fn stream_entity_locked_for_reads_until_fully_written() {
    let dir = TempDir::new().unwrap();
    let pool = DiskDataPool::init(dir.path().join("a.ddp"), 4096, PoolMode::ReadWrite).unwrap();

    let mut out = pool.output_stream(10).unwrap();
    let id = out.entity_id();
    out.write(b"hello").unwrap();

    // The entity header exists but the write is not complete: retrieve must
    // refuse while the write lock is still held.
    assert!(matches!(pool.retrieve(id), Err(PoolError::StreamInUse(_))));

    out.write(b"world").unwrap();
    assert_eq!(pool.retrieve(id).unwrap(), b"helloworld");
}

#[test]
fn copy_transfers_entity_between_pools() {
    let dir = TempDir::new().unwrap();
    let source = DiskDataPool::init(dir.path().join("source.ddp"), 4096, PoolMode::ReadWrite).unwrap();
    let target = DiskDataPool::init(dir.path().join("target.ddp"), 4096, PoolMode::ReadWrite).unwrap();
    source.set_pool_id(1);
    target.set_pool_id(2);

    let id = source.store(b"payload to move").unwrap();
    let mut input = source.input_stream(id).unwrap();
    let mut output = target.output_stream(input.remaining()).unwrap();
    let target_id = output.entity_id();

    stream::copy(&mut output, &mut input).unwrap();

    assert_eq!(target.retrieve(target_id).unwrap(), b"payload to move");
}

#[test]
fn copy_rejects_same_underlying_file() {
    let dir = TempDir::new().unwrap();
    let pool = DiskDataPool::init(dir.path().join("a.ddp"), 4096, PoolMode::ReadWrite).unwrap();
    pool.set_pool_id(1);

    let id = pool.store(b"loopback").unwrap();
    let mut input = pool.input_stream(id).unwrap();
    let mut output = pool.output_stream(input.remaining()).unwrap();

    assert!(matches!(stream::copy(&mut output, &mut input), Err(PoolError::UnsupportedOperation(_))));
}
