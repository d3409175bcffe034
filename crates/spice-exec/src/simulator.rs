use std::{
    fmt,
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
    time::Duration,
};

use spice_model::Switch;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::{
    backend::Backend,
    config::{ConsoleOutput, SimulatorConfig},
    discovery::Executable,
    error::{ExecError, ExecResult},
    limits::attach_rlimits,
    util::{KILL_GRACE, kill_graceful},
};

/// How a simulator process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Exited on its own with this code.
    Exited(i32),
    /// Died from a signal nobody here sent.
    Signaled,
    /// Killed because the timeout expired.
    TimedOut,
    /// Killed because the abort token fired.
    Aborted,
}

impl RunOutcome {
    pub fn code(&self) -> Option<i32> {
        match self {
            RunOutcome::Exited(code) => Some(*code),
            _ => None,
        }
    }

    pub fn success(&self) -> bool {
        matches!(self, RunOutcome::Exited(0))
    }
}

/// A backend bound to its resolved executable and configuration.
///
/// Cheap to clone; every [`Simulator::run`] spawns exactly one process and touches no shared state.
#[derive(Clone)]
pub struct Simulator {
    backend: Arc<dyn Backend>,
    exe: Option<Executable>,
    cfg: SimulatorConfig,
}

impl Simulator {
    /// Resolve the executable for `backend`.
    ///
    /// An explicit [`SimulatorConfig::executable`] that does not exist is an error. Without one, a missing
    /// installation is not: the simulator reports itself unavailable and [`Simulator::run`] fails.
    pub fn new(backend: Arc<dyn Backend>, cfg: SimulatorConfig) -> ExecResult<Self> {
        let exe = match cfg.executable.as_deref() {
            Some(raw) => Some(Executable::from_override(
                backend.name(),
                raw,
                cfg.process_name.clone(),
            )?),
            None => backend.locate(),
        };

        match &exe {
            Some(exe) => info!(
                backend = backend.name(),
                exe = ?exe.parts(),
                process = exe.process_name(),
                "simulator resolved"
            ),
            None => warn!(backend = backend.name(), "no simulator executable found"),
        }

        Ok(Self { backend, exe, cfg })
    }

    pub fn from_backend(backend: impl Backend, cfg: SimulatorConfig) -> ExecResult<Self> {
        Self::new(Arc::new(backend), cfg)
    }

    pub fn name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn executable(&self) -> Option<&Executable> {
        self.exe.as_ref()
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.cfg
    }

    /// Whether the resolved executable exists. Never spawns it.
    pub fn is_available(&self) -> bool {
        self.exe.as_ref().is_some_and(Executable::exists)
    }

    /// Exact argument tokens for `switch`, or a configuration error.
    pub fn valid_switch(&self, switch: &Switch) -> ExecResult<Vec<String>> {
        self.backend
            .valid_switch(self.exe.as_ref(), &switch.name, &switch.param)
    }

    /// Validate a list of switches into one flat token list.
    pub fn valid_switches<'a>(
        &self,
        switches: impl IntoIterator<Item = &'a Switch>,
    ) -> ExecResult<Vec<String>> {
        let mut tokens = Vec::new();
        for s in switches {
            tokens.extend(self.valid_switch(s)?);
        }
        Ok(tokens)
    }

    pub fn raw_file(&self, netlist: &Path) -> PathBuf {
        self.backend.raw_file(netlist)
    }

    pub fn log_file(&self, netlist: &Path) -> PathBuf {
        self.backend.log_file(netlist)
    }

    pub fn default_library_paths(&self) -> Vec<PathBuf> {
        self.backend.default_library_paths(self.exe.as_ref())
    }

    /// Program and argument vector that [`Simulator::run`] would spawn.
    pub fn command(&self, netlist: &Path, switches: &[String]) -> ExecResult<(String, Vec<String>)> {
        let exe = self.require_exe()?;
        let args = self.backend.command_line(exe, netlist, switches)?;
        Ok((exe.program().to_string(), args))
    }

    /// Run one simulation and wait for it.
    ///
    /// Expiry of `timeout` or cancellation of `abort` terminates the process group and reports
    /// [`RunOutcome::TimedOut`] / [`RunOutcome::Aborted`]; the child is always reaped before returning.
    pub async fn run(
        &self,
        netlist: &Path,
        switches: &[String],
        timeout: Option<Duration>,
        abort: &CancellationToken,
    ) -> ExecResult<RunOutcome> {
        let netlist = std::path::absolute(netlist)?;
        let (program, args) = self.command(&netlist, switches)?;

        let mut cmd = Command::new(&program);
        cmd.args(&args);
        if let Some(dir) = netlist.parent().filter(|d| !d.as_os_str().is_empty()) {
            cmd.current_dir(dir);
        }
        for (k, v) in &self.cfg.env {
            cmd.env(k, v);
        }
        cmd.stdin(Stdio::null());
        match self.cfg.console {
            ConsoleOutput::Inherit => {}
            ConsoleOutput::Discard => {
                cmd.stdout(Stdio::null());
                cmd.stderr(Stdio::null());
            }
            ConsoleOutput::ExeLog => {
                let out = std::fs::File::create(ConsoleOutput::exe_log_path(&netlist))?;
                cmd.stderr(out.try_clone()?);
                cmd.stdout(out);
            }
        }
        #[cfg(unix)]
        cmd.process_group(0);
        cmd.kill_on_drop(true);
        attach_rlimits(&mut cmd, &self.cfg.rlimits);

        trace!(target: "spice_exec::run", %program, ?args, "spawn");
        let mut child = cmd
            .spawn()
            .map_err(|e| ExecError::Spawn(format!("{program}: {e}")))?;
        debug!(backend = self.name(), pid = child.id(), netlist = %netlist.display(), "simulator started");

        let expired = async {
            match timeout {
                Some(t) => tokio::time::sleep(t).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            status = child.wait() => {
                let status = status?;
                Ok(match status.code() {
                    Some(code) => RunOutcome::Exited(code),
                    None => RunOutcome::Signaled,
                })
            }
            _ = expired => {
                warn!(backend = self.name(), ?timeout, netlist = %netlist.display(), "simulation timed out; terminating");
                kill_graceful(&mut child, KILL_GRACE).await?;
                Ok(RunOutcome::TimedOut)
            }
            _ = abort.cancelled() => {
                warn!(backend = self.name(), netlist = %netlist.display(), "simulation aborted; terminating");
                kill_graceful(&mut child, KILL_GRACE).await?;
                Ok(RunOutcome::Aborted)
            }
        }
    }

    fn require_exe(&self) -> ExecResult<&Executable> {
        self.exe.as_ref().filter(|e| e.exists()).ok_or_else(|| {
            error!(
                backend = self.name(),
                "unable to find the simulator executable; set one with SimulatorConfig::executable"
            );
            ExecError::ExecutableNotFound {
                backend: self.name(),
                detail: None,
            }
        })
    }
}

impl fmt::Debug for Simulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulator")
            .field("backend", &self.backend.name())
            .field("exe", &self.exe)
            .field("cfg", &self.cfg)
            .finish()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::backend::{Shell, Xyce};

    fn scratch() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("spice-exec-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    fn shell() -> Simulator {
        Simulator::from_backend(Shell, SimulatorConfig::default().with_console(ConsoleOutput::Discard))
            .unwrap()
    }

    #[tokio::test]
    async fn exit_code_is_reported() {
        let dir = scratch();
        let net = script(&dir, "ok.net", "echo raw > \"$2\"\necho log > \"$3\"\nexit 0\n");
        let bad = script(&dir, "bad.net", "exit 3\n");
        let sim = shell();
        let abort = CancellationToken::new();

        assert_eq!(
            sim.run(&net, &[], None, &abort).await.unwrap(),
            RunOutcome::Exited(0)
        );
        assert!(sim.raw_file(&net).exists());
        assert!(sim.log_file(&net).exists());

        let outcome = sim.run(&bad, &[], None, &abort).await.unwrap();
        assert_eq!(outcome.code(), Some(3));
        assert!(!outcome.success());
    }

    #[tokio::test]
    async fn timeout_kills_the_process() {
        let dir = scratch();
        let pid_file = dir.join("pid");
        let net = script(
            &dir,
            "slow.net",
            &format!("echo $$ > '{}'\nsleep 30\n", pid_file.display()),
        );
        let sim = shell();

        let started = Instant::now();
        let outcome = sim
            .run(&net, &[], Some(Duration::from_millis(300)), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, RunOutcome::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(5));

        let pid: libc::pid_t = std::fs::read_to_string(&pid_file).unwrap().trim().parse().unwrap();
        let alive = unsafe { libc::kill(pid, 0) } == 0;
        assert!(!alive, "simulator process {pid} still present");
    }

    #[tokio::test]
    async fn abort_token_terminates() {
        let dir = scratch();
        let net = script(&dir, "slow.net", "sleep 30\n");
        let sim = shell();
        let abort = CancellationToken::new();

        let cancel = abort.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        });
        let outcome = sim.run(&net, &[], None, &abort).await.unwrap();
        assert_eq!(outcome, RunOutcome::Aborted);
    }

    #[tokio::test]
    async fn exe_log_captures_console() {
        let dir = scratch();
        let net = script(&dir, "chatty.net", "echo hello from the simulator\n");
        let sim = Simulator::from_backend(Shell, SimulatorConfig::default().with_console(ConsoleOutput::ExeLog))
            .unwrap();
        sim.run(&net, &[], None, &CancellationToken::new()).await.unwrap();

        let log = std::fs::read_to_string(ConsoleOutput::exe_log_path(&net)).unwrap();
        assert!(log.contains("hello from the simulator"));
    }

    #[tokio::test]
    async fn missing_executable_is_a_configuration_error() {
        let sim = Simulator {
            backend: Arc::new(Xyce),
            exe: None,
            cfg: SimulatorConfig::default(),
        };
        assert!(!sim.is_available());
        let err = sim
            .run(Path::new("x.net"), &[], None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::ExecutableNotFound { backend: "xyce", .. }));
        assert!(err.is_configuration());
    }

    #[test]
    fn explicit_override_must_exist() {
        let err = Simulator::from_backend(
            Xyce,
            SimulatorConfig::default().with_executable("/nope/xyce"),
        )
        .unwrap_err();
        assert!(matches!(err, ExecError::ExecutableNotFound { .. }));
    }

    #[test]
    fn switches_validate_through_backend() {
        let sim = shell();
        let tokens = sim
            .valid_switches(&[Switch::new("x").with_param("1"), Switch::new("")])
            .unwrap();
        assert_eq!(tokens, vec!["-x", "1"]);
    }
}
