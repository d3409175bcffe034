use std::{
    collections::{HashMap, HashSet},
    path::PathBuf,
    sync::{Mutex, MutexGuard, PoisonError},
};

use spice_core::{remove_if_exists, remove_task_files};
use spice_model::{RunNumber, RunTask};

/// A finished run as the server keeps it: the task plus the archive its callback produced.
#[derive(Debug, Clone)]
pub struct ServerTask {
    pub task: RunTask,
    pub zip_file: Option<PathBuf>,
}

impl ServerTask {
    pub fn run_number(&self) -> RunNumber {
        self.task.run_number
    }

    /// Name the archive is delivered under.
    pub fn archive_name(&self) -> String {
        self.zip_file
            .as_deref()
            .unwrap_or_else(|| self.task.netlist_file.as_path())
            .with_extension("zip")
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Delete the archive and every run file. Failures are logged and skipped.
    pub fn remove_files(&self) -> usize {
        let zip = self.zip_file.as_deref().is_some_and(remove_if_exists);
        remove_task_files(&self.task) + usize::from(zip)
    }
}

impl From<RunTask> for ServerTask {
    fn from(task: RunTask) -> Self {
        let zip_file = task
            .callback_outcome
            .as_ref()
            .and_then(|v| v.as_str())
            .map(PathBuf::from);
        Self { task, zip_file }
    }
}

/// Outcome of [`Ledger::attach`].
#[derive(Debug)]
pub(crate) enum Attach {
    Owned,
    /// The session is gone; the run's files are deleted once it finishes.
    Orphaned,
    /// The session is gone and the run has already finished. Its files are the caller's to delete.
    Stale(ServerTask),
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, Vec<RunNumber>>,
    finished: HashMap<RunNumber, ServerTask>,
    /// Runs whose session closed before they finished; their files go as soon as they do.
    orphaned: HashSet<RunNumber>,
}

/// Session and finished-run bookkeeping. Never does file I/O under its lock.
#[derive(Default)]
pub(crate) struct Ledger {
    inner: Mutex<Inner>,
}

impl Ledger {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn open(&self) -> String {
        let token = uuid::Uuid::new_v4().to_string();
        self.lock().sessions.insert(token.clone(), Vec::new());
        token
    }

    pub fn contains(&self, session: &str) -> bool {
        self.lock().sessions.contains_key(session)
    }

    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Give `run` to `session`.
    pub fn attach(&self, session: &str, run: RunNumber) -> Attach {
        let mut inner = self.lock();
        if let Some(runs) = inner.sessions.get_mut(session) {
            runs.push(run);
            return Attach::Owned;
        }
        match inner.finished.remove(&run) {
            Some(task) => Attach::Stale(task),
            None => {
                inner.orphaned.insert(run);
                Attach::Orphaned
            }
        }
    }

    /// Finished, unfetched runs of `session`; `None` for an unknown session.
    pub fn terminal(&self, session: &str) -> Option<Vec<RunNumber>> {
        let inner = self.lock();
        let runs = inner.sessions.get(session)?;
        Some(
            runs.iter()
                .filter(|run| inner.finished.contains_key(run))
                .copied()
                .collect(),
        )
    }

    /// Take a finished run away from its session, once.
    pub fn claim(&self, session: &str, run: RunNumber) -> Option<ServerTask> {
        let mut inner = self.lock();
        let runs = inner.sessions.get(session)?;
        if !runs.contains(&run) || !inner.finished.contains_key(&run) {
            return None;
        }
        if let Some(runs) = inner.sessions.get_mut(session) {
            runs.retain(|r| *r != run);
        }
        inner.finished.remove(&run)
    }

    /// Drop `session`, returning its finished runs. Runs still in flight are orphaned.
    pub fn close(&self, session: &str) -> Option<Vec<ServerTask>> {
        let mut inner = self.lock();
        let runs = inner.sessions.remove(session)?;
        let mut done = Vec::new();
        for run in runs {
            match inner.finished.remove(&run) {
                Some(task) => done.push(task),
                None => {
                    inner.orphaned.insert(run);
                }
            }
        }
        Some(done)
    }

    /// Store a finished run. An orphaned run is handed back for deletion instead.
    pub fn record(&self, task: ServerTask) -> Option<ServerTask> {
        let mut inner = self.lock();
        if inner.orphaned.remove(&task.run_number()) {
            return Some(task);
        }
        inner.finished.insert(task.run_number(), task);
        None
    }

    /// Take every finished run, whoever owns it.
    pub fn take_finished(&self) -> Vec<ServerTask> {
        self.lock().finished.drain().map(|(_, t)| t).collect()
    }
}

#[cfg(test)]
mod tests {
    use spice_model::TaskStatus;

    use super::*;

    fn done(n: u64) -> ServerTask {
        let mut task = RunTask::new(RunNumber::new(n), PathBuf::from(format!("/o/rc_{n}.net")));
        task.status = TaskStatus::Succeeded;
        task.callback_outcome = Some(serde_json::json!(format!("/o/rc_{n}.zip")));
        task.into()
    }

    #[test]
    fn zip_path_comes_from_callback_outcome() {
        let t = done(3);
        assert_eq!(t.zip_file, Some(PathBuf::from("/o/rc_3.zip")));
        assert_eq!(t.archive_name(), "rc_3.zip");

        let bare = ServerTask::from(RunTask::new(RunNumber::new(4), PathBuf::from("/o/rc_4.net")));
        assert!(bare.zip_file.is_none());
        assert_eq!(bare.archive_name(), "rc_4.zip");
    }

    #[test]
    fn claim_is_at_most_once() {
        let ledger = Ledger::default();
        let s = ledger.open();
        let other = ledger.open();
        assert_ne!(s, other);

        assert!(matches!(ledger.attach(&s, RunNumber::new(1)), Attach::Owned));
        assert_eq!(ledger.terminal(&s), Some(vec![]));
        assert!(ledger.record(done(1)).is_none());
        assert_eq!(ledger.terminal(&s), Some(vec![RunNumber::new(1)]));

        assert!(ledger.claim(&other, RunNumber::new(1)).is_none());
        assert!(ledger.claim(&s, RunNumber::new(1)).is_some());
        assert!(ledger.claim(&s, RunNumber::new(1)).is_none());
        assert_eq!(ledger.terminal(&s), Some(vec![]));
    }

    #[test]
    fn closing_orphans_runs_in_flight() {
        let ledger = Ledger::default();
        let s = ledger.open();
        ledger.attach(&s, RunNumber::new(1));
        ledger.attach(&s, RunNumber::new(2));
        ledger.record(done(1));

        let closed = ledger.close(&s).unwrap();
        assert_eq!(closed.len(), 1);
        assert!(ledger.terminal(&s).is_none());
        assert!(ledger.close(&s).is_none());

        // Run 2 finishes after its session is gone.
        assert!(ledger.record(done(2)).is_some());
        assert!(ledger.take_finished().is_empty());
        assert!(matches!(ledger.attach(&s, RunNumber::new(3)), Attach::Orphaned));
        assert!(ledger.record(done(3)).is_some());
    }

    #[test]
    fn run_finished_before_attach_to_a_closed_session_is_handed_back() {
        let ledger = Ledger::default();
        let s = ledger.open();
        assert!(ledger.record(done(1)).is_none());
        assert!(ledger.close(&s).unwrap().is_empty());

        match ledger.attach(&s, RunNumber::new(1)) {
            Attach::Stale(task) => assert_eq!(task.run_number(), RunNumber::new(1)),
            other => panic!("expected the finished run back, got {other:?}"),
        }
        assert!(ledger.take_finished().is_empty());
        assert!(ledger.lock().orphaned.is_empty());
    }
}
