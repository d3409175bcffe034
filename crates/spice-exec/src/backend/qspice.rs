use std::path::Path;

use super::{Backend, path_arg, require_param};
use crate::{
    discovery::{self, Executable},
    error::{ExecError, ExecResult},
};

const NAME: &str = "qspice";

const SEARCH_PATHS: &[&str] = &[
    "~/Qspice/QSPICE64.exe",
    "~/AppData/Local/Programs/Qspice/QSPICE64.exe",
    "C:/Program Files/QSPICE/QSPICE64.exe",
];

const LIBRARY_PATHS: &[&str] = &["C:/Program Files/QSPICE", "~/Documents/QSPICE"];

/// `(name, takes a path)`. Qspice switch names carry no leading dash.
const SWITCHES: &[(&str, bool)] = &[
    ("ASCII", false),
    ("binary", false),
    ("BSIM1", false),
    ("Meyer", false),
    ("o", true),
    ("ProtectSelections", true),
    ("ProtectSubcircuits", true),
    ("r", true),
];

/// QSPICE. Windows only; raw output uses the `.qraw` extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct Qspice;

impl Backend for Qspice {
    fn name(&self) -> &'static str {
        NAME
    }

    fn raw_extension(&self) -> &'static str {
        "qraw"
    }

    fn search_paths(&self) -> &'static [&'static str] {
        SEARCH_PATHS
    }

    fn library_paths(&self) -> &'static [&'static str] {
        LIBRARY_PATHS
    }

    fn locate(&self) -> Option<Executable> {
        if cfg!(windows) {
            discovery::search(NAME, SEARCH_PATHS, false)
        } else {
            None
        }
    }

    fn valid_switch(
        &self,
        _exe: Option<&Executable>,
        switch: &str,
        param: &str,
    ) -> ExecResult<Vec<String>> {
        let name = switch.trim().trim_start_matches('-');
        if name.is_empty() {
            return Ok(Vec::new());
        }
        let (name, takes_path) = SWITCHES
            .iter()
            .find(|(n, _)| *n == name)
            .copied()
            .ok_or_else(|| ExecError::InvalidSwitch {
                backend: NAME,
                switch: switch.trim().to_string(),
            })?;

        let token = format!("-{name}");
        if takes_path {
            let param = require_param(&token, param)?;
            Ok(vec![token, param])
        } else {
            Ok(vec![token])
        }
    }

    fn command_line(
        &self,
        exe: &Executable,
        netlist: &Path,
        switches: &[String],
    ) -> ExecResult<Vec<String>> {
        let mut args: Vec<String> = exe.prefix_args().to_vec();
        args.extend([
            "-o".to_string(),
            path_arg(&self.log_file(netlist)),
            path_arg(netlist),
        ]);
        args.extend(switches.iter().cloned());
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switches_without_dash() {
        let b = Qspice;
        assert_eq!(b.valid_switch(None, "ASCII", "").unwrap(), vec!["-ASCII"]);
        assert_eq!(b.valid_switch(None, "-binary", "").unwrap(), vec!["-binary"]);
        assert_eq!(b.valid_switch(None, "r", "out.qraw").unwrap(), vec!["-r", "out.qraw"]);
        assert!(b.valid_switch(None, " ", "").unwrap().is_empty());
        assert!(matches!(
            b.valid_switch(None, "ascii", ""),
            Err(ExecError::InvalidSwitch { .. })
        ));
    }

    #[test]
    fn command_line_layout() {
        let exe = Executable::new(vec!["C:/Program Files/QSPICE/QSPICE64.exe".into()], None).unwrap();
        let args = Qspice
            .command_line(&exe, Path::new("C:/w/buck_1.net"), &["-binary".into()])
            .unwrap();
        assert_eq!(args, vec!["-o", "C:/w/buck_1.log", "C:/w/buck_1.net", "-binary"]);
    }

    #[cfg(not(windows))]
    #[test]
    fn not_located_off_windows() {
        assert!(Qspice.locate().is_none());
    }
}
