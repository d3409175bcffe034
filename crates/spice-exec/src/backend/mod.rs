use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    discovery::{self, Executable, expand_local_dir},
    error::{ExecError, ExecResult},
};

mod ltspice;
pub use ltspice::LTspice;

mod ngspice;
pub use ngspice::NGspice;

mod qspice;
pub use qspice::Qspice;

mod xyce;
pub use xyce::Xyce;

#[cfg(any(test, feature = "shell"))]
mod shell;
#[cfg(any(test, feature = "shell"))]
pub use shell::Shell;

/// One simulator family: discovery hints, command-line layout and switch table.
///
/// Implementations are stateless apart from construction-time options; the resolved executable lives in
/// [`crate::Simulator`].
pub trait Backend: Send + Sync + 'static {
    /// Stable lowercase identifier, e.g. `"ltspice"`.
    fn name(&self) -> &'static str;

    /// Extension (without dot) of the waveform file the backend writes.
    fn raw_extension(&self) -> &'static str {
        "raw"
    }

    /// Candidate executable locations in preference order.
    fn search_paths(&self) -> &'static [&'static str] {
        &[]
    }

    /// Whether Windows-style search entries can be run through wine on Linux/macOS.
    fn wine_capable(&self) -> bool {
        false
    }

    /// Library directories the backend ships with (Windows-style, `~` allowed).
    fn library_paths(&self) -> &'static [&'static str] {
        &[]
    }

    /// Locate the executable without an explicit override.
    fn locate(&self) -> Option<Executable> {
        discovery::search(self.name(), self.search_paths(), self.wine_capable())
    }

    /// Map a symbolic switch and its parameter to the exact argument tokens.
    ///
    /// Switches the adapter always sets itself yield no tokens; unknown switches are rejected.
    fn valid_switch(
        &self,
        exe: Option<&Executable>,
        switch: &str,
        param: &str,
    ) -> ExecResult<Vec<String>>;

    /// Argument vector for `exe.program()`, loader arguments included.
    fn command_line(
        &self,
        exe: &Executable,
        netlist: &Path,
        switches: &[String],
    ) -> ExecResult<Vec<String>>;

    /// Waveform file the backend writes for `netlist`.
    fn raw_file(&self, netlist: &Path) -> PathBuf {
        netlist.with_extension(self.raw_extension())
    }

    /// Text log the backend writes for `netlist`.
    fn log_file(&self, netlist: &Path) -> PathBuf {
        netlist.with_extension("log")
    }

    /// Existing library directories for this backend, expanded through the wine prefix when needed.
    fn default_library_paths(&self, exe: Option<&Executable>) -> Vec<PathBuf> {
        let exe_path = exe
            .map(Executable::simulator_path)
            .filter(|p| Path::new(p).exists());
        self.library_paths()
            .iter()
            .filter_map(|p| expand_local_dir(p, exe_path))
            .collect()
    }
}

/// Look up a built-in backend by its CLI name.
pub fn backend_by_name(name: &str) -> ExecResult<Arc<dyn Backend>> {
    match name.trim().to_ascii_lowercase().as_str() {
        "ltspice" => Ok(Arc::new(LTspice)),
        "ngspice" => Ok(Arc::new(NGspice::default())),
        "qspice" => Ok(Arc::new(Qspice)),
        "xyce" => Ok(Arc::new(Xyce)),
        other => Err(ExecError::Unsupported(format!(
            "simulator '{other}' (valid: ltspice, ngspice, qspice, xyce)"
        ))),
    }
}

/// Trim a switch and make sure it carries a leading dash. `None` for an empty switch.
pub(crate) fn normalize_switch(switch: &str) -> Option<String> {
    let switch = switch.trim();
    if switch.is_empty() {
        return None;
    }
    if switch.starts_with('-') {
        Some(switch.to_string())
    } else {
        Some(format!("-{switch}"))
    }
}

pub(crate) fn path_arg(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

pub(crate) fn require_param(switch: &str, param: &str) -> ExecResult<String> {
    let param = param.trim();
    if param.is_empty() {
        return Err(ExecError::InvalidSwitchParameter {
            switch: switch.to_string(),
            param: String::new(),
        });
    }
    Ok(param.to_string())
}
