//! Concurrent simulation scheduler.
//!
//! [`SimRunner`] owns a bounded worker pool in front of one [`spice_exec::Simulator`]: submissions are queued
//! FIFO, dispatched when a slot frees up, run with a timeout, post-processed by an optional [`Callback`] and
//! parked in a completed list until the caller consumes them.

mod error;
pub use error::CoreError;

mod config;
pub use config::RunnerConfig;

mod circuit;
pub use circuit::{Circuit, CircuitEditor};

mod callback;
pub use callback::{BoxError, Callback, CallbackError, CommandTemplate};

mod files;
pub use files::{remove_if_exists, remove_task_files, run_file_name};

mod state;
pub use state::{Query, RunnerStats};

mod runner;
pub use runner::{SimRunner, SubmitOptions, TaskHandle};

pub use spice_model::{CallbackArgs, Edits, RunNumber, RunTask, Switch, TaskFilter, TaskStatus};
