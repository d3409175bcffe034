//! Post-processing hooks run after a simulation process exits.
//!
//! Two modes, picked by the [`Callback`] variant: a closure run on the blocking pool of the worker that just
//! finished, or an external command spawned as its own OS process so a crash cannot reach the scheduler.
use std::{
    fmt,
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
    time::Duration,
};

use serde_json::Value;
use spice_model::CallbackArgs;
use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type InProcessFn =
    dyn Fn(Option<&Path>, Option<&Path>, &CallbackArgs) -> Result<Value, BoxError> + Send + Sync;

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("callback failed: {0}")]
    Failed(String),
    #[error("callback panicked: {0}")]
    Panicked(String),
    #[error("callback process could not start: {0}")]
    Spawn(String),
    #[error("callback process exited with {code:?}: {stderr}")]
    Exit { code: Option<i32>, stderr: String },
    #[error("callback process timed out")]
    TimedOut,
    #[error("callback aborted")]
    Aborted,
}

/// A command line for an isolated-process callback.
///
/// Arguments may use `{raw}`, `{log}` and `{<name>}` for any callback argument. When no argument mentions
/// `{raw}` or `{log}`, the raw path, the log path and `name=value` pairs are appended instead. Absent
/// artifacts render as empty strings. Whatever the process prints on stdout is the outcome: JSON if it
/// parses, a string otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl CommandTemplate {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn render(&self, raw: Option<&Path>, log: Option<&Path>, extra: &CallbackArgs) -> Vec<String> {
        let raw = raw.map(|p| p.to_string_lossy().into_owned()).unwrap_or_default();
        let log = log.map(|p| p.to_string_lossy().into_owned()).unwrap_or_default();

        let templated = self
            .args
            .iter()
            .any(|a| a.contains("{raw}") || a.contains("{log}"));

        let mut out: Vec<String> = self
            .args
            .iter()
            .map(|a| {
                let mut a = a.replace("{raw}", &raw).replace("{log}", &log);
                for (k, v) in extra {
                    a = a.replace(&format!("{{{k}}}"), v);
                }
                a
            })
            .collect();

        if !templated {
            out.push(raw);
            out.push(log);
            out.extend(extra.iter().map(|(k, v)| format!("{k}={v}")));
        }
        out
    }
}

#[derive(Clone)]
pub enum Callback {
    /// Runs in this process on a blocking thread.
    InProcess(Arc<InProcessFn>),
    /// Runs as a separate OS process.
    External(CommandTemplate),
}

impl Callback {
    pub fn in_process<F>(f: F) -> Self
    where
        F: Fn(Option<&Path>, Option<&Path>, &CallbackArgs) -> Result<Value, BoxError>
            + Send
            + Sync
            + 'static,
    {
        Callback::InProcess(Arc::new(f))
    }

    pub fn external(template: CommandTemplate) -> Self {
        Callback::External(template)
    }

    /// Run the callback until it returns or `abort` fires.
    ///
    /// On abort an external process is killed. A closure cannot be interrupted: it keeps its blocking thread
    /// until it returns, but nobody waits for it.
    pub(crate) async fn invoke(
        &self,
        raw: Option<PathBuf>,
        log: Option<PathBuf>,
        args: &CallbackArgs,
        abort: &CancellationToken,
    ) -> Result<Value, CallbackError> {
        let run = async {
            match self {
                Callback::InProcess(f) => {
                    let f = Arc::clone(f);
                    let args = args.clone();
                    let joined = tokio::task::spawn_blocking(move || {
                        f(raw.as_deref(), log.as_deref(), &args)
                    })
                    .await;
                    match joined {
                        Ok(Ok(v)) => Ok(v),
                        Ok(Err(e)) => Err(CallbackError::Failed(e.to_string())),
                        Err(e) => Err(CallbackError::Panicked(e.to_string())),
                    }
                }
                Callback::External(t) => run_external(t, raw.as_deref(), log.as_deref(), args).await,
            }
        };

        tokio::select! {
            res = run => res,
            _ = abort.cancelled() => Err(CallbackError::Aborted),
        }
    }
}

async fn run_external(
    t: &CommandTemplate,
    raw: Option<&Path>,
    log: Option<&Path>,
    extra: &CallbackArgs,
) -> Result<Value, CallbackError> {
    let args = t.render(raw, log, extra);
    trace!(program = %t.program, ?args, "spawning callback process");

    let mut cmd = Command::new(&t.program);
    cmd.args(&args)
        .envs(t.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // `kill_on_drop` ends the process when an abort drops this future mid-wait.
    let child = cmd
        .spawn()
        .map_err(|e| CallbackError::Spawn(format!("{}: {e}", t.program)))?;

    let output = match t.timeout {
        Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| CallbackError::TimedOut)?,
        None => child.wait_with_output().await,
    }
    .map_err(|e| CallbackError::Spawn(e.to_string()))?;

    if !output.status.success() {
        return Err(CallbackError::Exit {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stdout = stdout.trim();
    debug!(program = %t.program, bytes = stdout.len(), "callback process finished");
    Ok(serde_json::from_str(stdout).unwrap_or_else(|_| Value::String(stdout.to_string())))
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callback::InProcess(_) => f.write_str("InProcess(..)"),
            Callback::External(t) => f.debug_tuple("External").field(t).finish(),
        }
    }
}
