// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Thin clap-derived CLI surface exercising the aggregator end to end. Not
//! part of the library's contract — a demo binary, the way the teacher's
//! `main.rs` wraps `RecordingManager`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tiered-pool-cli", about = "Tiered pool storage engine", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create or open every pool named in the config and wire up its links.
    Open {
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
    /// Store a file's contents as a new entity and print the assigned id.
    Store {
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
        /// Path to the file whose contents should be stored.
        input: PathBuf,
    },
    /// Retrieve an entity by id and write its contents to a file (or stdout).
    Retrieve {
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
        entity_id: u32,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print a summary of every configured pool's occupancy.
    Stat {
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
    /// Print the aggregator's current configuration/link graph as JSON.
    ExportConfig {
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
}
