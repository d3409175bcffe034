use std::path::Path;

use crate::limits::RlimitConfig;

/// Where the simulator's own console output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsoleOutput {
    /// Share the parent's stdout/stderr.
    #[default]
    Inherit,
    /// Send everything to the null device.
    Discard,
    /// Write stdout and stderr to `<netlist>.exe.log` next to the netlist.
    ExeLog,
}

impl ConsoleOutput {
    pub fn exe_log_path(netlist: &Path) -> std::path::PathBuf {
        netlist.with_extension("exe.log")
    }
}

/// Per-backend configuration, built once and shared by every run.
#[derive(Debug, Clone, Default)]
pub struct SimulatorConfig {
    /// Explicit executable. May carry a loader prefix (`"wine /path/XVIIx64.exe"`); strings containing `\`
    /// are read as a single Windows path.
    pub executable: Option<String>,
    /// Process name as seen by the OS; guessed from the executable when absent.
    pub process_name: Option<String>,
    pub console: ConsoleOutput,
    pub rlimits: RlimitConfig,
    /// Extra environment for the simulator process.
    pub env: Vec<(String, String)>,
}

impl SimulatorConfig {
    pub fn with_executable(mut self, exe: impl Into<String>) -> Self {
        self.executable = Some(exe.into());
        self
    }

    pub fn with_console(mut self, console: ConsoleOutput) -> Self {
        self.console = console;
        self
    }

    pub fn with_rlimits(mut self, rlimits: RlimitConfig) -> Self {
        self.rlimits = rlimits;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}
