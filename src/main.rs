// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! tiered-pool-cli — demo/ops binary for the tiered storage engine.
//!
//! Usage:
//!   tiered-pool-cli open           --config config.toml
//!   tiered-pool-cli store          --config config.toml <input-file>
//!   tiered-pool-cli retrieve       --config config.toml <entity-id> [-o output-file]
//!   tiered-pool-cli stat           --config config.toml
//!   tiered-pool-cli export-config  --config config.toml

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tiered_pool::aggregator::{Aggregator, AggregatorConfig};
use tiered_pool::cli::{Cli, Command};
use tiered_pool::config::Config;
use tiered_pool::link::Link;
use tiered_pool::pool::disk::DiskDataPool;
use tiered_pool::pool::DataPool;
use tiered_pool::types::{PoolId, PoolMode};

/// Builds an `Aggregator` from a loaded `Config`: opens or initializes every
/// configured pool, registers it, and wires up the configured links.
fn build_aggregator(cfg: &Config) -> tiered_pool::error::Result<Aggregator> {
    let aggregator = Aggregator::new(AggregatorConfig::from(cfg.aggregator.clone()));
    let mut pool_ids: HashMap<String, PoolId> = HashMap::new();

    for pool_cfg in &cfg.pools {
        let mode = if pool_cfg.read_only { PoolMode::ReadOnly } else { PoolMode::ReadWrite };
        let pool: Arc<dyn DataPool> = if pool_cfg.path.exists() {
            Arc::new(DiskDataPool::load(&pool_cfg.path, mode)?)
        } else {
            Arc::new(DiskDataPool::init(&pool_cfg.path, pool_cfg.size_bytes, mode)?)
        };
        let id = aggregator.add_pool(pool);
        pool_ids.insert(pool_cfg.id.clone(), id);
    }

    for link_cfg in &cfg.links {
        let source = if link_cfg.source == "root" {
            tiered_pool::aggregator::AGGREGATOR_ROOT
        } else {
            *pool_ids.get(&link_cfg.source).expect("validated by Config::validate")
        };
        let target = *pool_ids.get(&link_cfg.target).expect("validated by Config::validate");
        aggregator.add_link(source, Link { target, action: link_cfg.action.into(), condition: link_cfg.condition.into() })?;
    }

    Ok(aggregator)
}

fn load_config_or_exit(path: &Path) -> Config {
    match Config::from_file(path) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Open { config } => {
            let cfg = load_config_or_exit(&config);
            match build_aggregator(&cfg) {
                Ok(aggregator) => {
                    info!(uuid = %aggregator.uuid(), pools = cfg.pools.len(), "aggregator ready");
                }
                Err(e) => {
                    error!(error = %e, "failed to open aggregator");
                    std::process::exit(1);
                }
            }
        }
        Command::Store { config, input } => {
            let cfg = load_config_or_exit(&config);
            let aggregator = match build_aggregator(&cfg) {
                Ok(a) => a,
                Err(e) => {
                    error!(error = %e, "failed to open aggregator");
                    std::process::exit(1);
                }
            };

            let mut data = Vec::new();
            if let Err(e) = std::fs::File::open(&input).and_then(|mut f| f.read_to_end(&mut data)) {
                eprintln!("failed to read {}: {e}", input.display());
                std::process::exit(1);
            }

            match aggregator.store(&data) {
                Ok(id) => {
                    println!("stored entity {id}");
                    // store() only enqueues the plan; give the worker task a
                    // moment to run before main() drops the runtime and takes
                    // any still-queued work down with it.
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                }
                Err(e) => {
                    eprintln!("store failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Command::Retrieve { config, entity_id, output } => {
            let cfg = load_config_or_exit(&config);
            let aggregator = match build_aggregator(&cfg) {
                Ok(a) => a,
                Err(e) => {
                    error!(error = %e, "failed to open aggregator");
                    std::process::exit(1);
                }
            };

            match aggregator.retrieve(entity_id) {
                Ok(data) => match output {
                    Some(path) => {
                        if let Err(e) = std::fs::write(&path, &data) {
                            eprintln!("failed to write {}: {e}", path.display());
                            std::process::exit(1);
                        }
                        println!("wrote {} bytes to {}", data.len(), path.display());
                    }
                    None => {
                        let _ = std::io::stdout().write_all(&data);
                    }
                },
                Err(e) => {
                    eprintln!("retrieve failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Command::Stat { config } => {
            let cfg = load_config_or_exit(&config);
            let aggregator = match build_aggregator(&cfg) {
                Ok(a) => a,
                Err(e) => {
                    error!(error = %e, "failed to open aggregator");
                    std::process::exit(1);
                }
            };

            println!("=== Aggregator Status ===");
            println!("uuid            : {}", aggregator.uuid());
            println!("entities        : {}", aggregator.stored_entities());
            println!("bytes read      : {}", aggregator.bytes_read());
            println!("bytes written   : {}", aggregator.bytes_written());
            match aggregator.usable_space() {
                Ok(space) => println!("usable space    : {} / {} bytes", space.total, space.max),
                Err(e) => println!("usable space    : error ({e})"),
            }
        }
        Command::ExportConfig { config } => {
            let cfg = load_config_or_exit(&config);
            let aggregator = match build_aggregator(&cfg) {
                Ok(a) => a,
                Err(e) => {
                    error!(error = %e, "failed to open aggregator");
                    std::process::exit(1);
                }
            };

            match serde_json::to_string_pretty(&aggregator.export_configuration()) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("failed to serialize configuration: {e}");
                    std::process::exit(1);
                }
            }
        }
    }
}
