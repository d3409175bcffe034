use std::time::Duration;

use spice_model::{CallbackArgs, Switch};

use crate::callback::Callback;

/// Per-submission overrides for [`crate::SimRunner::submit`].
#[derive(Debug, Clone)]
pub struct SubmitOptions {
    /// Replaces [`crate::RunnerConfig::default_switches`] when non-empty.
    pub switches: Vec<Switch>,
    /// Replaces [`crate::RunnerConfig::timeout`] when set.
    pub timeout: Option<Duration>,
    pub callback: Option<Callback>,
    /// Passed to the callback after the raw and log paths.
    pub callback_args: CallbackArgs,
    /// Name of the netlist written for this run; `<stem>_<run>.<ext>` by default.
    pub run_filename: Option<String>,
    /// Wait until the task owns a worker slot before returning.
    pub wait_for_slot: bool,
    /// Run the callback even when the simulation did not succeed.
    pub callback_on_error: bool,
    /// Sweep values recorded on the task, checked against the circuit's references.
    pub edits: Vec<(String, String)>,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            switches: Vec::new(),
            timeout: None,
            callback: None,
            callback_args: Vec::new(),
            run_filename: None,
            wait_for_slot: true,
            callback_on_error: false,
            edits: Vec::new(),
        }
    }
}

impl SubmitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_switch(mut self, switch: impl Into<Switch>) -> Self {
        self.switches.push(switch.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_callback(mut self, callback: Callback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn with_callback_arg(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.callback_args.push((name.into(), value.into()));
        self
    }

    pub fn with_run_filename(mut self, name: impl Into<String>) -> Self {
        self.run_filename = Some(name.into());
        self
    }

    pub fn wait_for_slot(mut self, wait: bool) -> Self {
        self.wait_for_slot = wait;
        self
    }

    pub fn callback_on_error(mut self, on_error: bool) -> Self {
        self.callback_on_error = on_error;
        self
    }

    pub fn with_edit(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.edits.push((name.into(), value.into()));
        self
    }
}
