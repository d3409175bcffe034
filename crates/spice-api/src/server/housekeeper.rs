use std::{sync::Arc, time::Duration};

use spice_core::SimRunner;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::ledger::{Ledger, ServerTask};

/// Move finished runs from the scheduler into the ledger every `every` until `stop` fires.
pub(crate) async fn housekeep(
    runner: Arc<SimRunner>,
    ledger: Arc<Ledger>,
    every: Duration,
    stop: CancellationToken,
) {
    let mut tick = tokio::time::interval(every);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!(?every, "housekeeper started");

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = tick.tick() => {}
        }
        collect(&runner, &ledger);
    }
    debug!("housekeeper stopped");
}

/// One pass. File deletion for orphaned runs is pushed to the blocking pool.
pub(crate) fn collect(runner: &SimRunner, ledger: &Ledger) -> usize {
    let done = runner.take_completed();
    if done.is_empty() {
        return 0;
    }
    runner.forget_consumed();

    let n = done.len();
    let mut orphans = Vec::new();
    for task in done {
        let task = ServerTask::from(task);
        debug!(run = %task.run_number(), status = %task.task.status, zip = ?task.zip_file, "run finished");
        if let Some(orphan) = ledger.record(task) {
            orphans.push(orphan);
        }
    }
    if !orphans.is_empty() {
        info!(count = orphans.len(), "deleting files of runs from closed sessions");
        tokio::task::spawn_blocking(move || {
            for t in &orphans {
                t.remove_files();
            }
        });
    }
    n
}
