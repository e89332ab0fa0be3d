// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Background execution for the aggregator: the store worker and the
//! delayed-step timer.
//!
//! `store()` hands its whole plan to [`spawn_store_worker`]'s task and
//! returns the new entity id immediately — the teacher's
//! `storage/global_writer.rs` pattern of a single spawned task owning the
//! only path to a piece of shared state, generalized here from segment
//! writes to plan execution. A plan's own delayed steps are deferred a
//! second time, as `PendingAction`s picked up by `schedule_pending_processing`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::error;

use crate::link::PlainStep;
use crate::types::EntityId;

use super::AggregatorCore;

/// A store plan queued for the worker task: the id already allocated for it,
/// the raw bytes, and the plan `unwind` produced.
pub(crate) struct StoreJob {
    pub entity_id: EntityId,
    pub data: Vec<u8>,
    pub plan: Vec<PlainStep>,
}

/// Spawns the task that drains queued store jobs in order, mirroring
/// `global_writer.rs`'s `spawn_writer`/`writer_loop` split. One task keeps
/// jobs processed in submission order; parallelism is bounded by the channel,
/// not by a pool of competing workers.
pub(crate) fn spawn_store_worker(core: Arc<AggregatorCore>, mut rx: mpsc::Receiver<StoreJob>) {
    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            if let Err(e) = super::process_store_job(&core, job.entity_id, job.data, job.plan) {
                error!(entity_id = job.entity_id, error = %e, "queued store job failed");
            }
        }
    });
}

/// Schedules `process_pending_actions` to run once `run_at` has passed.
/// Overlapping schedules are harmless: a run that finds nothing due simply
/// reschedules against whatever remains.
pub(crate) fn schedule_pending_processing(core: Arc<AggregatorCore>, run_at: DateTime<Utc>) {
    tokio::spawn(async move {
        let now = Utc::now();
        if run_at > now {
            let delay = (run_at - now).to_std().unwrap_or(Duration::from_secs(0));
            tokio::time::sleep(delay).await;
        }
        super::process_pending_actions(&core);
    });
}
