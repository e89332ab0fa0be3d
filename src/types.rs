// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Core identifiers and enums shared across the pool, stream, and aggregator layers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reserved sentinel meaning "no entity" / "none" in an address or id field.
pub const INVALID_ID: u32 = 0;

/// Globally-unique-per-pool (or per-aggregator) entity identifier.
pub type EntityId = u32;

/// Aggregator-local handle for a registered pool.
pub type PoolId = u32;

/// Byte offset within a disk data pool file.
pub type Address = u32;

/// Size of a stored entity or a free chunk, in bytes.
pub type DataSize = u32;

/// Persistent pool identifier stored on disk, independent of any aggregator's local `PoolId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolUuid(pub Uuid);

impl PoolUuid {
    pub fn new() -> Self {
        PoolUuid(Uuid::new_v4())
    }

    pub fn parse(text: &str) -> Option<Self> {
        Uuid::parse_str(text).ok().map(PoolUuid)
    }

    /// Canonical 8-4-4-4-12 hyphenated form, always 36 bytes of ASCII.
    pub fn to_hyphenated(&self) -> String {
        self.0.hyphenated().to_string()
    }
}

impl Default for PoolUuid {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PoolUuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hyphenated())
    }
}

/// Lifecycle state of a pool. FAILED is reached only via an I/O error on an
/// OPEN pool and still permits reads of already-indexed entities; mutation
/// is always refused. CLOSED refuses everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Open,
    Closed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolMode {
    ReadWrite,
    ReadOnly,
}

/// Kind of pool backing a `DataPool` implementation. `Remote*` variants are
/// carried from the original type set but have no implementation here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataPoolType {
    LocalDisk,
    LocalMemory,
    RemoteDisk,
    RemoteMemory,
    Aggregate,
}
