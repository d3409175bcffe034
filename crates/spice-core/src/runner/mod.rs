mod handle;
mod options;
mod worker;

pub use handle::TaskHandle;
pub use options::SubmitOptions;

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, SystemTime},
};

use spice_exec::Simulator;
use spice_model::{EditKind, Edits, RunNumber, RunTask, TaskFilter, TaskStatus};
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{
    circuit::Circuit,
    config::RunnerConfig,
    error::CoreError,
    files::{remove_task_files, run_file_name},
    state::{Query, RunnerStats, TaskStore},
};
use handle::Tracker;
use worker::{Job, PostProcess};

pub(crate) struct Shared {
    simulator: Simulator,
    cfg: RunnerConfig,
    slots: Arc<Semaphore>,
    store: TaskStore,
}

/// Bounded-parallelism scheduler in front of one [`Simulator`].
///
/// Tasks are dispatched in submission order to at most [`RunnerConfig::parallel_sims`] workers. A worker
/// keeps its slot while the simulator runs and while the task's callback runs. Terminal tasks are parked
/// until consumed with [`SimRunner::pop_completed`], [`SimRunner::take_completed`] or
/// [`SimRunner::next_completed`].
///
/// Must be created inside a tokio runtime.
pub struct SimRunner {
    shared: Arc<Shared>,
    tx: mpsc::UnboundedSender<Job>,
    next_run: AtomicU64,
    abort: Mutex<CancellationToken>,
}

impl SimRunner {
    pub fn new(simulator: Simulator, cfg: RunnerConfig) -> Result<Self, CoreError> {
        let rt = tokio::runtime::Handle::try_current().map_err(|_| CoreError::NoRuntime)?;
        if cfg.parallel_sims == 0 {
            return Err(CoreError::InvalidConfig(
                "parallel_sims must be at least 1".to_string(),
            ));
        }
        if let Some(dir) = &cfg.output_folder {
            std::fs::create_dir_all(dir)?;
        }

        info!(
            backend = simulator.name(),
            parallel_sims = cfg.parallel_sims,
            timeout = ?cfg.timeout,
            output_folder = ?cfg.output_folder,
            "scheduler started"
        );

        let shared = Arc::new(Shared {
            slots: Arc::new(Semaphore::new(cfg.parallel_sims)),
            simulator,
            cfg,
            store: TaskStore::new(),
        });
        let (tx, rx) = mpsc::unbounded_channel();
        rt.spawn(worker::dispatch(Arc::clone(&shared), rx));

        Ok(Self {
            shared,
            tx,
            next_run: AtomicU64::new(1),
            abort: Mutex::new(CancellationToken::new()),
        })
    }

    pub fn simulator(&self) -> &Simulator {
        &self.shared.simulator
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.shared.cfg
    }

    /// Queue a simulation of `circuit`.
    ///
    /// Switches are validated and the circuit is written to its run netlist before anything is queued;
    /// those are the only ways this can fail. With [`SubmitOptions::wait_for_slot`] the call returns once the
    /// task has been handed a worker slot.
    #[instrument(level = "debug", skip_all)]
    pub async fn submit(
        &self,
        circuit: impl Into<Circuit>,
        opts: SubmitOptions,
    ) -> Result<TaskHandle, CoreError> {
        let circuit = circuit.into();
        let wait = opts.wait_for_slot;
        let (task, post) = self.prepare(&circuit, opts).await?;
        let run = task.run_number;
        let (tracker, handle) = Tracker::new(&task);
        let (dispatched_tx, dispatched_rx) = oneshot::channel();

        // Taken before the task is visible to `abort_all`.
        let abort = self.abort_token();
        self.shared.store.add_pending(task.clone());
        let job = Job {
            task,
            post,
            tracker,
            abort,
            dispatched: Some(dispatched_tx),
        };
        if self.tx.send(job).is_err() {
            return Err(CoreError::Stopped);
        }
        debug!(run = %run, circuit = %circuit.source().display(), "queued");

        if wait {
            // Dropped unsent when the job is aborted while queued; either way it is no longer waiting.
            let _ = dispatched_rx.await;
        }
        Ok(handle)
    }

    /// Run a simulation in the calling task, bypassing the queue and the slot limit.
    ///
    /// Returns the raw and log artifacts that exist afterwards. The finished run is counted, can be queried
    /// and joins the completed tasks like a queued one.
    pub async fn submit_blocking(
        &self,
        circuit: impl Into<Circuit>,
        opts: SubmitOptions,
    ) -> Result<(Option<PathBuf>, Option<PathBuf>), CoreError> {
        let circuit = circuit.into();
        let (mut task, post) = self.prepare(&circuit, opts).await?;
        task.status = TaskStatus::Running;
        task.started_at = Some(SystemTime::now());

        worker::execute(&self.shared.simulator, &mut task, &post, &self.abort_token()).await;

        let (raw, log) = task.results();
        let artifacts = (raw.map(Path::to_path_buf), log.map(Path::to_path_buf));
        self.shared.store.record_inline(task);
        Ok(artifacts)
    }

    async fn prepare(
        &self,
        circuit: &Circuit,
        opts: SubmitOptions,
    ) -> Result<(RunTask, PostProcess), CoreError> {
        let cfg = &self.shared.cfg;
        let switches = if opts.switches.is_empty() {
            &cfg.default_switches
        } else {
            &opts.switches
        };
        let switches = self.shared.simulator.valid_switches(switches)?;

        let mut edits = match circuit {
            Circuit::Editor(editor) => {
                if let Some((name, _)) = opts
                    .edits
                    .iter()
                    .find(|(name, _)| !editor.has_reference(name))
                {
                    return Err(CoreError::UnknownEdit {
                        name: name.clone(),
                        circuit: editor.circuit_file().to_path_buf(),
                    });
                }
                editor.edits()
            }
            Circuit::Path(_) => Edits::new(),
        };
        for (name, value) in &opts.edits {
            edits
                .push(name.as_str(), value.as_str(), EditKind::Other)
                .map_err(|e| CoreError::InvalidConfig(e.to_string()))?;
        }

        let run = RunNumber::new(self.next_run.fetch_add(1, Ordering::Relaxed));
        let source = circuit.source();
        let name = opts
            .run_filename
            .unwrap_or_else(|| run_file_name(source, run));
        let dir = cfg
            .output_folder
            .clone()
            .or_else(|| source.parent().map(Path::to_path_buf))
            .unwrap_or_default();
        let netlist = dir.join(name);
        materialize(circuit, &netlist).await?;

        let mut task = RunTask::new(run, netlist);
        task.switches = switches;
        task.timeout = opts.timeout.or(cfg.timeout);
        task.edits = edits;

        let post = PostProcess {
            callback: opts.callback,
            args: opts.callback_args,
            on_error: opts.callback_on_error,
        };
        Ok((task, post))
    }

    /// Wait for every submitted task to finish.
    ///
    /// Returns `true` when nothing is outstanding and no task has failed or timed out. When `timeout` expires first,
    /// `abort_all_on_timeout` terminates running simulations and callbacks and drops queued tasks (aborted
    /// simulations end up [`TaskStatus::TimedOut`]); otherwise the work carries on in the background.
    pub async fn drain(&self, timeout: Option<Duration>, abort_all_on_timeout: bool) -> bool {
        let store = &self.shared.store;
        let finished = match timeout {
            Some(limit) => tokio::time::timeout(limit, store.idle()).await.is_ok(),
            None => {
                store.idle().await;
                true
            }
        };
        if finished {
            let stats = store.stats();
            return stats.failed == 0 && stats.timed_out == 0;
        }

        warn!(
            outstanding = store.outstanding(),
            abort = abort_all_on_timeout,
            "drain timed out"
        );
        if abort_all_on_timeout {
            self.abort_all();
            store.idle().await;
        }
        false
    }

    /// Terminate every running simulation and every queued task. Later submissions are unaffected.
    pub fn abort_all(&self) {
        let old = {
            let mut token = self.abort.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *token, CancellationToken::new())
        };
        info!(outstanding = self.shared.store.outstanding(), "aborting all tasks");
        old.cancel();
    }

    fn abort_token(&self) -> CancellationToken {
        self.abort
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Unconsumed terminal tasks, oldest first. Does not consume them.
    pub fn completed_tasks(&self) -> Vec<RunTask> {
        self.shared.store.unconsumed()
    }

    pub fn pop_completed(&self) -> Option<RunTask> {
        self.shared.store.pop()
    }

    /// Consume every unconsumed terminal task.
    pub fn take_completed(&self) -> Vec<RunTask> {
        self.shared.store.take_all()
    }

    /// Next task to complete, waiting if needed. `None` once nothing is queued, running or unconsumed.
    pub async fn next_completed(&self) -> Option<RunTask> {
        self.shared.store.next_completed().await
    }

    /// Terminal tasks matching `filter`, consumed or not.
    pub fn query(&self, filter: TaskFilter) -> Query {
        self.shared.store.query(filter)
    }

    pub fn task(&self, run: RunNumber) -> Option<RunTask> {
        self.shared.store.get(run)
    }

    pub fn stats(&self) -> RunnerStats {
        self.shared.store.stats()
    }

    pub fn submitted(&self) -> u64 {
        self.stats().submitted
    }

    pub fn succeeded(&self) -> u64 {
        self.stats().succeeded
    }

    pub fn failed(&self) -> u64 {
        self.stats().failed
    }

    pub fn timed_out(&self) -> u64 {
        self.stats().timed_out
    }

    pub fn running(&self) -> u64 {
        self.stats().running
    }

    /// Delete the files of consumed tasks and forget them. Returns the number of files removed.
    pub fn cleanup(&self) -> usize {
        let removed = self.shared.store.remove_consumed();
        removed.iter().map(remove_task_files).sum()
    }

    /// Forget consumed tasks without touching their files. For callers that take over file ownership.
    pub fn forget_consumed(&self) -> usize {
        self.shared.store.remove_consumed().len()
    }

    /// Delete the files of every terminal task, consumed or not, and forget them.
    pub fn cleanup_all(&self) -> usize {
        let removed = self.shared.store.remove_terminal();
        removed.iter().map(remove_task_files).sum()
    }
}

/// Write the run netlist: a copy of the circuit file, or whatever the editor serializes.
async fn materialize(circuit: &Circuit, netlist: &Path) -> Result<(), CoreError> {
    let circuit = circuit.clone();
    let dest = netlist.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<(), String> {
        if let Some(dir) = dest.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| e.to_string())?;
        }
        match &circuit {
            Circuit::Path(src) if src == &dest => Ok(()),
            Circuit::Path(src) => std::fs::copy(src, &dest)
                .map(|_| ())
                .map_err(|e| format!("{}: {e}", src.display())),
            Circuit::Editor(editor) => editor.save_netlist(&dest).map_err(|e| e.to_string()),
        }
    })
    .await
    .map_err(|e| CoreError::Materialize(e.to_string()))?
    .map_err(CoreError::Materialize)
}
