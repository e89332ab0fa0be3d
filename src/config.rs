// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

use serde::Deserialize;
use std::path::PathBuf;

use crate::aggregator::AggregatorConfig;
use crate::error::{PoolError, Result};

/// Top-level configuration loaded from a TOML file for the CLI/demo binary.
/// The `Aggregator` and `DiskDataPool` types themselves are constructed
/// programmatically and never require this to exist.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Disk pool(s) to create or open under the aggregator.
    pub pools: Vec<DiskPoolConfig>,
    /// Links between pools, referenced by `DiskPoolConfig::id`. A source of
    /// `"root"` attaches the link to the aggregator itself.
    #[serde(default)]
    pub links: Vec<LinkConfig>,
    #[serde(default)]
    pub aggregator: AggregatorSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LinkConfig {
    pub source: String,
    pub target: String,
    pub action: LinkAction,
    #[serde(default)]
    pub condition: LinkCondition,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum LinkAction {
    Copy,
    Move,
    Distribute,
    Discard,
    Skip,
}

#[derive(Debug, Deserialize, Clone, Copy, Default)]
#[serde(rename_all = "snake_case")]
pub enum LinkCondition {
    #[default]
    None,
    Timed {
        seconds: u64,
    },
    SourceMinFull {
        percent: u32,
    },
    SourceMaxFull {
        percent: u32,
    },
    TargetMinFull {
        percent: u32,
    },
    TargetMaxFull {
        percent: u32,
    },
    SourceMinEntities {
        count: u32,
    },
    SourceMaxEntities {
        count: u32,
    },
    TargetMinEntities {
        count: u32,
    },
    TargetMaxEntities {
        count: u32,
    },
    DataMinSize {
        bytes: u32,
    },
    DataMaxSize {
        bytes: u32,
    },
}

/// One disk pool entry. `path` doubles as the pool's identity: if it exists
/// it is opened with `DiskDataPool::load`, otherwise created with `init`.
#[derive(Debug, Deserialize, Clone)]
pub struct DiskPoolConfig {
    /// Unique identifier used for referencing this pool from link entries.
    pub id: String,
    /// Path to the pool's backing file.
    pub path: PathBuf,
    /// Size in bytes to initialize the pool at, if it does not already exist.
    #[serde(default = "default_pool_size_bytes")]
    pub size_bytes: u32,
    #[serde(default)]
    pub read_only: bool,
}

fn default_pool_size_bytes() -> u32 {
    512 * 1024 * 1024
}

/// Mirrors `aggregator::AggregatorConfig` for TOML deserialization; kept
/// separate so the core type has no serde dependency of its own.
#[derive(Debug, Deserialize, Clone)]
pub struct AggregatorSettings {
    #[serde(default)]
    pub complete_retrieve: bool,
    #[serde(default)]
    pub complete_discard: bool,
    #[serde(default)]
    pub complete_pending_store: bool,
    #[serde(default)]
    pub erase_on_discard: bool,
    #[serde(default = "default_cancel_actions_on_shutdown")]
    pub cancel_actions_on_shutdown: bool,
    #[serde(default = "default_max_non_streamable_data")]
    pub max_non_streamable_data: u32,
    /// Bound on the aggregator's store worker channel.
    #[serde(default = "default_store_worker_channel_bound")]
    pub store_worker_channel_bound: usize,
}

fn default_cancel_actions_on_shutdown() -> bool {
    true
}

fn default_max_non_streamable_data() -> u32 {
    64 * 1024 * 1024
}

fn default_store_worker_channel_bound() -> usize {
    256
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        AggregatorSettings {
            complete_retrieve: false,
            complete_discard: false,
            complete_pending_store: false,
            erase_on_discard: false,
            cancel_actions_on_shutdown: default_cancel_actions_on_shutdown(),
            max_non_streamable_data: default_max_non_streamable_data(),
            store_worker_channel_bound: default_store_worker_channel_bound(),
        }
    }
}

impl From<AggregatorSettings> for AggregatorConfig {
    fn from(s: AggregatorSettings) -> Self {
        AggregatorConfig {
            complete_retrieve: s.complete_retrieve,
            complete_discard: s.complete_discard,
            complete_pending_store: s.complete_pending_store,
            erase_on_discard: s.erase_on_discard,
            cancel_actions_on_shutdown: s.cancel_actions_on_shutdown,
            max_non_streamable_data: s.max_non_streamable_data,
            store_worker_channel_bound: s.store_worker_channel_bound,
        }
    }
}

impl Config {
    /// Loads configuration from a TOML file at `path`.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PoolError::ConfigurationError(format!("cannot read config file: {e}")))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| PoolError::ConfigurationError(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.pools.is_empty() {
            return Err(PoolError::ConfigurationError("no pools defined".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for pool in &self.pools {
            if pool.size_bytes == 0 {
                return Err(PoolError::ConfigurationError(format!("pool '{}': size_bytes must be > 0", pool.id)));
            }
            if !seen.insert(&pool.id) {
                return Err(PoolError::ConfigurationError(format!("duplicate pool id '{}'", pool.id)));
            }
        }
        for link in &self.links {
            if link.source != "root" && !seen.contains(&link.source) {
                return Err(PoolError::ConfigurationError(format!("link source '{}' is not a configured pool", link.source)));
            }
            if !seen.contains(&link.target) {
                return Err(PoolError::ConfigurationError(format!("link target '{}' is not a configured pool", link.target)));
            }
        }
        Ok(())
    }
}

impl From<LinkAction> for crate::link::Action {
    fn from(a: LinkAction) -> Self {
        match a {
            LinkAction::Copy => crate::link::Action::Copy,
            LinkAction::Move => crate::link::Action::Move,
            LinkAction::Distribute => crate::link::Action::Distribute,
            LinkAction::Discard => crate::link::Action::Discard,
            LinkAction::Skip => crate::link::Action::Skip,
        }
    }
}

impl From<LinkCondition> for crate::link::Condition {
    fn from(c: LinkCondition) -> Self {
        use crate::link::Condition as C;
        match c {
            LinkCondition::None => C::None,
            LinkCondition::Timed { seconds } => C::Timed(seconds),
            LinkCondition::SourceMinFull { percent } => C::SourceMinFull(percent),
            LinkCondition::SourceMaxFull { percent } => C::SourceMaxFull(percent),
            LinkCondition::TargetMinFull { percent } => C::TargetMinFull(percent),
            LinkCondition::TargetMaxFull { percent } => C::TargetMaxFull(percent),
            LinkCondition::SourceMinEntities { count } => C::SourceMinEntities(count),
            LinkCondition::SourceMaxEntities { count } => C::SourceMaxEntities(count),
            LinkCondition::TargetMinEntities { count } => C::TargetMinEntities(count),
            LinkCondition::TargetMaxEntities { count } => C::TargetMaxEntities(count),
            LinkCondition::DataMinSize { bytes } => C::DataMinSize(bytes),
            LinkCondition::DataMaxSize { bytes } => C::DataMaxSize(bytes),
        }
    }
}
