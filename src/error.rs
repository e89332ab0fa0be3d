// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

use thiserror::Error;

/// Reason a placement plan could not be synthesized.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanFailure {
    #[error("no distribution target among the candidate pools could fit the data")]
    NoDistributionTarget,
    #[error("target pool '{pool}' does not have enough free space")]
    InsufficientSpace { pool: u32 },
    #[error("plan produced no placement steps")]
    NoValidPlacement,
    #[error("a delayed step was required to originate at the aggregator root")]
    DelayedFromRoot,
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("pool is not open")]
    NotOpen,

    #[error("pool is read-only")]
    ReadOnly,

    #[error("entity {0} not found")]
    NotFound(u32),

    #[error("out of space: requested {requested} bytes, largest free chunk {largest_free} bytes")]
    OutOfSpace { requested: u32, largest_free: u32 },

    #[error("entity {0} has an active stream")]
    StreamInUse(u32),

    #[error("corrupt on-disk format: {0}")]
    CorruptFormat(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("configuration error: {0}")]
    ConfigurationError(String),

    #[error("plan failure: {0}")]
    PlanFailure(#[from] PlanFailure),
}

pub type Result<T> = std::result::Result<T, PoolError>;
