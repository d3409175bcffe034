use std::{path::PathBuf, time::Duration};

use spice_model::Switch;

/// Scheduler settings, passed once to [`crate::SimRunner::new`].
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Worker slots; simulations beyond this many wait in the queue.
    pub parallel_sims: usize,
    /// Per-task timeout unless a submission overrides it. `None` means unlimited.
    pub timeout: Option<Duration>,
    /// Where run netlists (and therefore artifacts) are placed. Next to the source circuit when absent.
    pub output_folder: Option<PathBuf>,
    /// Used for submissions that pass no switches of their own.
    pub default_switches: Vec<Switch>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            parallel_sims: 4,
            timeout: Some(Duration::from_secs(600)),
            output_folder: None,
            default_switches: Vec::new(),
        }
    }
}

impl RunnerConfig {
    pub fn with_parallel_sims(mut self, n: usize) -> Self {
        self.parallel_sims = n;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_output_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.output_folder = Some(folder.into());
        self
    }

    pub fn with_default_switch(mut self, switch: Switch) -> Self {
        self.default_switches.push(switch);
        self
    }
}
