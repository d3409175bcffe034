use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};

use spice_exec::{ExecResult, RunOutcome, Simulator};
use spice_model::{CallbackArgs, RunTask, TaskStatus};
use tokio::sync::{OwnedSemaphorePermit, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{Shared, handle::Tracker};
use crate::callback::Callback;

/// What happens after the simulator exits.
#[derive(Default)]
pub(crate) struct PostProcess {
    pub callback: Option<Callback>,
    pub args: CallbackArgs,
    pub on_error: bool,
}

/// A submitted task travelling from `submit` through the dispatcher to a worker.
pub(crate) struct Job {
    pub task: RunTask,
    pub post: PostProcess,
    pub tracker: Tracker,
    pub abort: CancellationToken,
    pub dispatched: Option<oneshot::Sender<()>>,
}

/// Hand queued jobs to workers in submission order, one per free slot.
pub(crate) async fn dispatch(
    shared: Arc<Shared>,
    mut rx: tokio::sync::mpsc::UnboundedReceiver<Job>,
) {
    while let Some(mut job) = rx.recv().await {
        let permit = tokio::select! {
            biased;
            _ = job.abort.cancelled() => None,
            permit = Arc::clone(&shared.slots).acquire_owned() => permit.ok(),
        };
        let Some(permit) = permit else {
            abandon(&shared, job);
            continue;
        };

        debug!(run = %job.task.run_number, "dispatched");
        if let Some(tx) = job.dispatched.take() {
            let _ = tx.send(());
        }
        tokio::spawn(work(Arc::clone(&shared), job, permit));
    }
    debug!("dispatcher stopped");
}

/// A queued task that was aborted before it got a slot: never spawned, reported as timed out.
fn abandon(shared: &Shared, job: Job) {
    let Job {
        mut task, tracker, ..
    } = job;
    warn!(run = %task.run_number, "aborted while queued");
    task.status = TaskStatus::TimedOut;
    task.error = Some("aborted before start".to_string());
    task.stopped_at = Some(SystemTime::now());
    shared.store.complete(task.clone());
    tracker.finish(task);
}

/// Run one job while holding its slot. The slot is released only after the callback returns.
async fn work(shared: Arc<Shared>, job: Job, _permit: OwnedSemaphorePermit) {
    let Job {
        mut task,
        post,
        tracker,
        abort,
        ..
    } = job;

    task.status = TaskStatus::Running;
    task.started_at = Some(SystemTime::now());
    shared.store.mark_running(task.run_number, &task);
    tracker.running();

    execute(&shared.simulator, &mut task, &post, &abort).await;

    shared.store.complete(task.clone());
    tracker.finish(task);
}

/// Run the simulator for a task already marked running, settle its status and run its callback.
pub(crate) async fn execute(
    sim: &Simulator,
    task: &mut RunTask,
    post: &PostProcess,
    abort: &CancellationToken,
) {
    info!(
        run = %task.run_number,
        netlist = %task.netlist_file.display(),
        timeout = ?task.timeout,
        "simulation started"
    );
    let outcome = sim
        .run(&task.netlist_file, &task.switches, task.timeout, abort)
        .await;
    settle(sim, task, outcome);

    if let Some(cb) = &post.callback
        && (post.on_error || task.status == TaskStatus::Succeeded)
    {
        let (raw, log) = task.results();
        let (raw, log) = (raw.map(Path::to_path_buf), log.map(Path::to_path_buf));
        match cb.invoke(raw, log, &post.args, abort).await {
            Ok(value) => task.callback_outcome = Some(value),
            Err(e) => {
                warn!(run = %task.run_number, error = %e, "callback failed");
                if task.error.is_none() {
                    task.error = Some(e.to_string());
                }
            }
        }
    }
    task.stopped_at = Some(SystemTime::now());
    debug!(run = %task.run_number, status = %task.status, elapsed = ?task.elapsed(), "task finished");
}

/// Turn the process outcome into a terminal status and the artifacts that actually exist.
fn settle(sim: &Simulator, task: &mut RunTask, outcome: ExecResult<RunOutcome>) {
    let run = task.run_number;
    let raw = sim.raw_file(&task.netlist_file);
    let log = sim.log_file(&task.netlist_file);

    match outcome {
        Ok(RunOutcome::Exited(0)) if raw.exists() && log.exists() => {
            task.exit_code = Some(0);
            task.status = TaskStatus::Succeeded;
            task.raw_file = Some(raw);
            task.log_file = Some(log);
            info!(run = %run, elapsed = ?task.started_at.and_then(|t| t.elapsed().ok()), "simulation succeeded");
        }
        Ok(RunOutcome::Exited(code)) => {
            task.exit_code = Some(code);
            task.status = TaskStatus::Failed;
            let reason = if code == 0 {
                let missing: Vec<String> = [&raw, &log]
                    .into_iter()
                    .filter(|p| !p.exists())
                    .map(|p| p.display().to_string())
                    .collect();
                format!("missing artifact: {}", missing.join(", "))
            } else {
                format!("exit code {code}")
            };
            error!(run = %run, exit_code = code, %reason, "simulation failed");
            task.error = Some(reason);
            keep_failed(task, raw, log);
        }
        Ok(RunOutcome::Signaled) => {
            task.status = TaskStatus::Failed;
            task.error = Some("terminated by a signal".to_string());
            error!(run = %run, "simulation killed by a signal");
            keep_failed(task, raw, log);
        }
        Ok(outcome @ (RunOutcome::TimedOut | RunOutcome::Aborted)) => {
            task.status = TaskStatus::TimedOut;
            task.error = Some(match outcome {
                RunOutcome::Aborted => "aborted".to_string(),
                _ => format!("timed out after {:?}", task.timeout.unwrap_or_default()),
            });
            warn!(run = %run, ?outcome, "simulation timed out");
            task.raw_file = raw.exists().then_some(raw);
            task.log_file = log.exists().then_some(log);
        }
        Err(e) => {
            task.status = TaskStatus::Failed;
            error!(run = %run, error = %e, "simulation could not run");
            task.error = Some(e.to_string());
            task.raw_file = raw.exists().then_some(raw);
            task.log_file = log.exists().then_some(log);
        }
    }
}

/// A failed run's log is renamed to `<netlist>.fail` and kept as its log artifact.
fn keep_failed(task: &mut RunTask, raw: PathBuf, log: PathBuf) {
    task.raw_file = raw.exists().then_some(raw);
    task.log_file = log.exists().then(|| rename_fail(&task.netlist_file, &log));
}

fn rename_fail(netlist: &Path, log: &Path) -> PathBuf {
    let fail = netlist.with_extension("fail");
    match std::fs::rename(log, &fail) {
        Ok(()) => fail,
        Err(e) => {
            warn!(log = %log.display(), error = %e, "cannot rename failed log");
            log.to_path_buf()
        }
    }
}
