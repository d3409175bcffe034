use std::{
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
};

use spice_model::{RunNumber, RunTask, TaskStatus};
use tokio::sync::watch;

use crate::error::CoreError;

/// Caller-side view of one submitted task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    run_number: RunNumber,
    netlist_file: PathBuf,
    status: watch::Receiver<TaskStatus>,
    result: Arc<OnceLock<RunTask>>,
}

impl TaskHandle {
    pub fn run_number(&self) -> RunNumber {
        self.run_number
    }

    pub fn netlist_file(&self) -> &Path {
        &self.netlist_file
    }

    pub fn status(&self) -> TaskStatus {
        *self.status.borrow()
    }

    /// Wait for the task to reach a terminal state and return it.
    pub async fn wait(&self) -> Result<RunTask, CoreError> {
        let mut rx = self.status.clone();
        rx.wait_for(TaskStatus::is_terminal)
            .await
            .map_err(|_| CoreError::Stopped)?;
        self.result.get().cloned().ok_or(CoreError::Stopped)
    }
}

/// Worker-side counterpart of a [`TaskHandle`].
pub(crate) struct Tracker {
    status: watch::Sender<TaskStatus>,
    result: Arc<OnceLock<RunTask>>,
}

impl Tracker {
    pub fn new(task: &RunTask) -> (Self, TaskHandle) {
        let (tx, rx) = watch::channel(task.status);
        let result = Arc::new(OnceLock::new());
        let handle = TaskHandle {
            run_number: task.run_number,
            netlist_file: task.netlist_file.clone(),
            status: rx,
            result: Arc::clone(&result),
        };
        (Self { status: tx, result }, handle)
    }

    pub fn running(&self) {
        self.status.send_replace(TaskStatus::Running);
    }

    /// Publish the terminal task. The result is stored before the status flips.
    pub fn finish(self, task: RunTask) {
        let status = task.status;
        let _ = self.result.set(task);
        self.status.send_replace(status);
    }
}
