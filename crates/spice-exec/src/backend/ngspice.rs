use std::path::Path;

use tracing::info;

use super::{Backend, normalize_switch, path_arg, require_param};
use crate::{
    discovery::Executable,
    error::{ExecError, ExecResult},
};

const NAME: &str = "ngspice";

const SEARCH_PATHS: &[&str] = &[
    "C:/Apps/NGSpice64/bin/ngspice.exe",
    "C:/Spice64/ngspice.exe",
    "/usr/local/bin/ngspice",
    "ngspice",
];

/// Batch, output, rawfile and autorun are always set by the adapter.
const RUN_SWITCHES: &[&str] = &["-b", "-o", "-r", "-a"];

/// KiCad, LTspice, PSPICE and netlist compatibility.
pub const DEFAULT_COMPATIBILITY_MODE: &str = "kiltpsa";

#[derive(Clone, Copy, PartialEq, Eq)]
enum Param {
    None,
    File,
    Term,
    /// `name=value`.
    VarValue,
}

const SWITCHES: &[(&str, Param)] = &[
    ("-c", Param::File),
    ("--circuitfile", Param::File),
    ("-D", Param::VarValue),
    ("--define", Param::VarValue),
    ("-i", Param::None),
    ("--interactive", Param::None),
    ("-n", Param::None),
    ("--no-spiceinit", Param::None),
    ("-q", Param::None),
    ("--completion", Param::None),
    ("--soa-log", Param::File),
    ("-s", Param::None),
    ("--server", Param::None),
    ("-t", Param::Term),
    ("--term", Param::Term),
];

/// ngspice in batch mode.
///
/// `compatibility_mode` is passed as `-D ngbehavior=<mode>`; recent ngspice versions need one.
#[derive(Debug, Clone)]
pub struct NGspice {
    pub compatibility_mode: Option<String>,
}

impl Default for NGspice {
    fn default() -> Self {
        Self {
            compatibility_mode: Some(DEFAULT_COMPATIBILITY_MODE.to_string()),
        }
    }
}

impl NGspice {
    pub fn with_compatibility_mode(mode: Option<impl Into<String>>) -> Self {
        Self {
            compatibility_mode: mode.map(Into::into),
        }
    }
}

impl Backend for NGspice {
    fn name(&self) -> &'static str {
        NAME
    }

    fn search_paths(&self) -> &'static [&'static str] {
        SEARCH_PATHS
    }

    fn valid_switch(
        &self,
        _exe: Option<&Executable>,
        switch: &str,
        param: &str,
    ) -> ExecResult<Vec<String>> {
        let Some(switch) = normalize_switch(switch) else {
            return Ok(Vec::new());
        };
        if RUN_SWITCHES.contains(&switch.as_str()) {
            info!(%switch, "switch is already part of the default run switches");
            return Ok(Vec::new());
        }

        let kind = SWITCHES
            .iter()
            .find(|(name, _)| *name == switch)
            .map(|(_, p)| *p)
            .ok_or_else(|| ExecError::InvalidSwitch {
                backend: NAME,
                switch: switch.clone(),
            })?;

        let param = param.trim();
        if kind == Param::VarValue
            && self.compatibility_mode.is_some()
            && param.to_ascii_lowercase().starts_with("ngbehavior")
        {
            info!(%switch, param, "ngbehavior is set through the compatibility mode");
            return Ok(Vec::new());
        }

        match kind {
            Param::None => Ok(vec![switch]),
            Param::File | Param::Term => {
                let param = require_param(&switch, param)?;
                Ok(vec![switch, param])
            }
            Param::VarValue if param.contains('=') => Ok(vec![switch, param.to_string()]),
            Param::VarValue => Err(ExecError::InvalidSwitchParameter {
                switch,
                param: param.to_string(),
            }),
        }
    }

    fn command_line(
        &self,
        exe: &Executable,
        netlist: &Path,
        switches: &[String],
    ) -> ExecResult<Vec<String>> {
        let mut args: Vec<String> = exe.prefix_args().to_vec();
        args.extend(switches.iter().cloned());
        if let Some(mode) = &self.compatibility_mode {
            args.push("-D".to_string());
            args.push(format!("ngbehavior={mode}"));
        }
        args.extend([
            "-b".to_string(),
            "-o".to_string(),
            path_arg(&self.log_file(netlist)),
            "-r".to_string(),
            path_arg(&self.raw_file(netlist)),
            path_arg(netlist),
        ]);
        Ok(args)
    }
}
