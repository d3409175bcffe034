use std::{
    collections::{BTreeMap, VecDeque},
    slice,
    sync::{
        Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
        atomic::{AtomicU64, Ordering},
    },
};

use serde::{Deserialize, Serialize};
use spice_model::{RunNumber, RunTask, TaskFilter, TaskStatus};
use tokio::sync::{Notify, watch};

/// Point-in-time copy of the scheduler counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerStats {
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub running: u64,
    pub pending: u64,
}

impl RunnerStats {
    pub fn terminal(&self) -> u64 {
        self.succeeded + self.failed + self.timed_out
    }
}

/// Terminal tasks selected by a [`TaskFilter`].
///
/// Holds a snapshot taken when the query was made; iterating filters lazily and can be restarted any number
/// of times.
pub struct Query {
    tasks: Arc<[RunTask]>,
    filter: TaskFilter,
}

impl Query {
    pub fn iter(&self) -> QueryIter<'_> {
        QueryIter {
            inner: self.tasks.iter(),
            filter: &self.filter,
        }
    }

    pub fn run_numbers(&self) -> Vec<RunNumber> {
        self.iter().map(|t| t.run_number).collect()
    }
}

impl<'a> IntoIterator for &'a Query {
    type Item = &'a RunTask;
    type IntoIter = QueryIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct QueryIter<'a> {
    inner: slice::Iter<'a, RunTask>,
    filter: &'a TaskFilter,
}

impl<'a> Iterator for QueryIter<'a> {
    type Item = &'a RunTask;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.by_ref().find(|t| self.filter.matches(t))
    }
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    running: AtomicU64,
    pending: AtomicU64,
}

struct Inner {
    /// Every task the scheduler still knows about, keyed by run number.
    tasks: BTreeMap<RunNumber, RunTask>,
    /// Terminal tasks not yet handed to the caller, in completion order.
    unconsumed: VecDeque<RunNumber>,
}

/// Task bookkeeping shared between the submitting side and the workers.
///
/// One lock guards the task map and the completed queue; counters are atomics updated while that lock is
/// held, so readers never block and never observe a task counted twice.
#[derive(Clone)]
pub(crate) struct TaskStore {
    inner: Arc<RwLock<Inner>>,
    counters: Arc<Counters>,
    outstanding: Arc<watch::Sender<usize>>,
    completed: Arc<Notify>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                tasks: BTreeMap::new(),
                unconsumed: VecDeque::new(),
            })),
            counters: Arc::default(),
            outstanding: Arc::new(watch::channel(0).0),
            completed: Arc::new(Notify::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a freshly submitted task (status `Pending`).
    pub fn add_pending(&self, task: RunTask) {
        let mut inner = self.write();
        inner.tasks.insert(task.run_number, task);
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        self.counters.pending.fetch_add(1, Ordering::Relaxed);
        self.outstanding.send_modify(|n| *n += 1);
    }

    /// `Pending -> Running`.
    pub fn mark_running(&self, run: RunNumber, task: &RunTask) {
        let mut inner = self.write();
        if let Some(slot) = inner.tasks.get_mut(&run)
            && slot.status == TaskStatus::Pending
        {
            slot.status = TaskStatus::Running;
            slot.started_at = task.started_at;
            self.counters.pending.fetch_sub(1, Ordering::Relaxed);
            self.counters.running.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Store the terminal task and queue it for the caller. A second completion of the same run is ignored.
    pub fn complete(&self, task: RunTask) -> bool {
        debug_assert!(task.is_terminal());
        {
            let mut inner = self.write();
            let previous = inner.tasks.get(&task.run_number).map(|t| t.status);
            match previous {
                Some(TaskStatus::Pending) => {
                    self.counters.pending.fetch_sub(1, Ordering::Relaxed);
                }
                Some(TaskStatus::Running) => {
                    self.counters.running.fetch_sub(1, Ordering::Relaxed);
                }
                _ => return false,
            }
            self.count_terminal(task.status);
            inner.unconsumed.push_back(task.run_number);
            inner.tasks.insert(task.run_number, task);
        }
        self.outstanding.send_modify(|n| *n = n.saturating_sub(1));
        self.completed.notify_waiters();
        true
    }

    /// Record a terminal task that ran outside the worker pool. It joins the completed tasks like any other.
    pub fn record_inline(&self, task: RunTask) {
        debug_assert!(task.is_terminal());
        {
            let mut inner = self.write();
            self.counters.submitted.fetch_add(1, Ordering::Relaxed);
            self.count_terminal(task.status);
            inner.unconsumed.push_back(task.run_number);
            inner.tasks.insert(task.run_number, task);
        }
        self.completed.notify_waiters();
    }

    fn count_terminal(&self, status: TaskStatus) {
        let counter = match status {
            TaskStatus::Succeeded => &self.counters.succeeded,
            TaskStatus::Failed => &self.counters.failed,
            TaskStatus::TimedOut => &self.counters.timed_out,
            TaskStatus::Pending | TaskStatus::Running => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, run: RunNumber) -> Option<RunTask> {
        self.read().tasks.get(&run).cloned()
    }

    /// Unconsumed terminal tasks, oldest first, without consuming them.
    pub fn unconsumed(&self) -> Vec<RunTask> {
        let inner = self.read();
        inner
            .unconsumed
            .iter()
            .filter_map(|run| inner.tasks.get(run).cloned())
            .collect()
    }

    pub fn pop(&self) -> Option<RunTask> {
        let mut inner = self.write();
        let run = inner.unconsumed.pop_front()?;
        inner.tasks.get(&run).cloned()
    }

    pub fn take_all(&self) -> Vec<RunTask> {
        let mut inner = self.write();
        let runs: Vec<_> = inner.unconsumed.drain(..).collect();
        runs.iter()
            .filter_map(|run| inner.tasks.get(run).cloned())
            .collect()
    }

    /// All terminal tasks, consumed or not, in run-number order.
    pub fn query(&self, filter: TaskFilter) -> Query {
        let tasks: Vec<RunTask> = self
            .read()
            .tasks
            .values()
            .filter(|t| t.is_terminal())
            .cloned()
            .collect();
        Query {
            tasks: tasks.into(),
            filter,
        }
    }

    /// Forget terminal tasks that were already consumed and return them.
    pub fn remove_consumed(&self) -> Vec<RunTask> {
        let mut inner = self.write();
        let Inner { tasks, unconsumed } = &mut *inner;
        let consumed: Vec<RunNumber> = tasks
            .values()
            .filter(|t| t.is_terminal() && !unconsumed.contains(&t.run_number))
            .map(|t| t.run_number)
            .collect();
        consumed
            .into_iter()
            .filter_map(|run| tasks.remove(&run))
            .collect()
    }

    /// Forget every terminal task, consumed or not, and return them.
    pub fn remove_terminal(&self) -> Vec<RunTask> {
        let mut inner = self.write();
        inner.unconsumed.clear();
        let terminal: Vec<RunNumber> = inner
            .tasks
            .values()
            .filter(|t| t.is_terminal())
            .map(|t| t.run_number)
            .collect();
        terminal
            .into_iter()
            .filter_map(|run| inner.tasks.remove(&run))
            .collect()
    }

    pub fn stats(&self) -> RunnerStats {
        let c = &self.counters;
        RunnerStats {
            submitted: c.submitted.load(Ordering::Relaxed),
            succeeded: c.succeeded.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            timed_out: c.timed_out.load(Ordering::Relaxed),
            running: c.running.load(Ordering::Relaxed),
            pending: c.pending.load(Ordering::Relaxed),
        }
    }

    /// Tasks submitted to the pool that have not reached a terminal state.
    pub fn outstanding(&self) -> usize {
        *self.outstanding.borrow()
    }

    /// Resolves once nothing is outstanding.
    pub async fn idle(&self) {
        let mut rx = self.outstanding.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Next unconsumed task, waiting for one to complete. `None` once nothing is queued or outstanding.
    pub async fn next_completed(&self) -> Option<RunTask> {
        loop {
            let notified = self.completed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(task) = self.pop() {
                return Some(task);
            }
            if self.outstanding() == 0 {
                return None;
            }
            notified.await;
        }
    }
}
