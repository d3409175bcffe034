use std::{env, path::Path};

use tracing::info;

use super::{Backend, normalize_switch, path_arg, require_param};
use crate::{
    discovery::{self, Executable, expand_home},
    error::{ExecError, ExecResult},
};

const NAME: &str = "ltspice";

/// Windows install locations, newest first. Also searched inside the wine prefix.
const SEARCH_PATHS: &[&str] = &[
    "~/AppData/Local/Programs/ADI/LTspice/LTspice.exe",
    "~/Local Settings/Application Data/Programs/ADI/LTspice/LTspice.exe",
    "C:/Program Files/ADI/LTspice/LTspice.exe",
    "C:/Program Files/LTC/LTspiceXVII/XVIIx64.exe",
    "C:/Program Files (x86)/LTC/LTspiceXVII/XVIIx64.exe",
    "C:/Program Files (x86)/LTC/LTspiceIV/scad3.exe",
];

const LIBRARY_PATHS: &[&str] = &[
    "~/AppData/Local/LTspice/lib",
    "~/Documents/LTspiceXVII/lib/",
    "~/Documents/LTspice/lib/",
    "~/My Documents/LTspiceXVII/lib/",
    "~/My Documents/LTspice/lib/",
    "~/Local Settings/Application Data/LTspice/lib",
];

const MACOS_NATIVE: &str = "/Applications/LTspice.app/Contents/MacOS/LTspice";
const DEFAULT_WINE_FOLDER: &str = "~/.wine/drive_c/Program Files/LTC/LTspiceXVII";
const DEFAULT_EXE: &str = "XVIIx64.exe";

/// Always set by the adapter.
const RUN_SWITCHES: &[&str] = &["-Run", "-b"];

#[derive(Clone, Copy)]
enum Form {
    Flag(&'static str),
    /// Switch followed by a path token.
    WithPath(&'static str),
    /// Path glued to the switch, no space.
    Joined(&'static str),
}

const SWITCHES: &[(&str, Form)] = &[
    ("-alt", Form::Flag("-alt")),
    ("-ascii", Form::Flag("-ascii")),
    ("-big", Form::Flag("-big")),
    ("-encrypt", Form::Flag("-encrypt")),
    ("-fastaccess", Form::Flag("-FastAccess")),
    ("-FixUpSchematicFonts", Form::Flag("-FixUpSchematicFonts")),
    ("-FixUpSymbolFonts", Form::Flag("-FixUpSymbolFonts")),
    ("-ini", Form::WithPath("-ini")),
    ("-I", Form::Joined("-I")),
    ("-max", Form::Flag("-max")),
    ("-netlist", Form::Flag("-netlist")),
    ("-norm", Form::Flag("-norm")),
    ("-PCBnetlist", Form::Flag("-PCBnetlist")),
    ("-SOI", Form::Flag("-SOI")),
    ("-sync", Form::Flag("-sync")),
];

/// Analog Devices LTspice, native on Windows, through wine elsewhere.
///
/// The raw and log files always land next to the netlist with `.raw`/`.log` extensions.
#[derive(Debug, Clone, Copy, Default)]
pub struct LTspice;

impl LTspice {
    fn macos_native(exe: Option<&Executable>) -> bool {
        cfg!(target_os = "macos") && exe.is_some_and(|e| !e.is_wine())
    }

    /// `LTSPICEFOLDER` / `LTSPICEEXECUTABLE`, both optional, always run through wine.
    fn from_env() -> Option<Executable> {
        let folder = env::var("LTSPICEFOLDER").ok().filter(|s| !s.is_empty());
        let exe = env::var("LTSPICEEXECUTABLE").ok().filter(|s| !s.is_empty());
        if folder.is_none() && exe.is_none() {
            return None;
        }
        let folder = expand_home(folder.as_deref().unwrap_or(DEFAULT_WINE_FOLDER));
        let exe = exe.unwrap_or_else(|| DEFAULT_EXE.to_string());
        let path = folder.join(&exe).to_string_lossy().into_owned();
        Executable::new(vec!["wine".to_string(), path], Some(exe))
    }
}

impl Backend for LTspice {
    fn name(&self) -> &'static str {
        NAME
    }

    fn search_paths(&self) -> &'static [&'static str] {
        SEARCH_PATHS
    }

    fn wine_capable(&self) -> bool {
        true
    }

    fn library_paths(&self) -> &'static [&'static str] {
        LIBRARY_PATHS
    }

    fn locate(&self) -> Option<Executable> {
        if cfg!(windows) {
            return discovery::search(NAME, SEARCH_PATHS, false);
        }
        if let Some(exe) = Self::from_env() {
            return Some(exe);
        }
        discovery::search(NAME, SEARCH_PATHS, true).or_else(|| {
            (cfg!(target_os = "macos") && Path::new(MACOS_NATIVE).exists())
                .then(|| Executable::new(vec![MACOS_NATIVE.to_string()], None))
                .flatten()
        })
    }

    fn valid_switch(
        &self,
        exe: Option<&Executable>,
        switch: &str,
        param: &str,
    ) -> ExecResult<Vec<String>> {
        if Self::macos_native(exe) {
            return Err(ExecError::Unsupported(
                "macOS native LTspice does not accept command line switches, run it under wine".into(),
            ));
        }
        let Some(switch) = normalize_switch(switch) else {
            return Ok(Vec::new());
        };
        if RUN_SWITCHES.contains(&switch.as_str()) {
            info!(%switch, "switch is already part of the default run switches");
            return Ok(Vec::new());
        }

        let form = SWITCHES
            .iter()
            .find(|(name, _)| *name == switch)
            .map(|(_, form)| *form)
            .ok_or_else(|| ExecError::InvalidSwitch {
                backend: NAME,
                switch: switch.clone(),
            })?;

        Ok(match form {
            Form::Flag(token) => vec![token.to_string()],
            Form::WithPath(token) => vec![token.to_string(), require_param(&switch, param)?],
            Form::Joined(token) => vec![format!("{token}{}", require_param(&switch, param)?)],
        })
    }

    fn command_line(
        &self,
        exe: &Executable,
        netlist: &Path,
        switches: &[String],
    ) -> ExecResult<Vec<String>> {
        let mut args: Vec<String> = exe.prefix_args().to_vec();
        let netlist_arg = path_arg(netlist);

        if Self::macos_native(Some(exe)) {
            let is_asc = netlist
                .extension()
                .is_some_and(|e| e.eq_ignore_ascii_case("asc"));
            if is_asc {
                return Err(ExecError::Unsupported(
                    "macOS native LTspice cannot simulate '.asc' files, use a netlist or run under wine".into(),
                ));
            }
            args.extend(["-b".to_string(), netlist_arg]);
        } else if exe.is_wine() {
            // Z: maps to the host root inside wine.
            args.extend(["-Run".to_string(), "-b".to_string(), format!("Z:{netlist_arg}")]);
        } else {
            args.extend(["-Run".to_string(), "-b".to_string(), netlist_arg]);
        }
        args.extend(switches.iter().cloned());
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wine_exe() -> Executable {
        Executable::new(
            vec!["wine".into(), "/home/u/.wine/drive_c/Program Files/ADI/LTspice/LTspice.exe".into()],
            None,
        )
        .unwrap()
    }

    #[test]
    fn switch_table() {
        let b = LTspice;
        let exe = wine_exe();
        assert_eq!(b.valid_switch(Some(&exe), "ascii", "").unwrap(), vec!["-ascii"]);
        assert_eq!(b.valid_switch(Some(&exe), "-fastaccess", "").unwrap(), vec!["-FastAccess"]);
        assert_eq!(
            b.valid_switch(Some(&exe), "-ini", "/tmp/my.ini").unwrap(),
            vec!["-ini", "/tmp/my.ini"]
        );
        assert_eq!(b.valid_switch(Some(&exe), "-I", "/lib/sym").unwrap(), vec!["-I/lib/sym"]);
    }

    #[test]
    fn default_and_empty_switches_yield_nothing() {
        let b = LTspice;
        assert!(b.valid_switch(None, "-Run", "").unwrap().is_empty());
        assert!(b.valid_switch(None, "b", "").unwrap().is_empty());
        assert!(b.valid_switch(None, "", "").unwrap().is_empty());
    }

    #[test]
    fn unknown_switch_is_rejected() {
        let err = LTspice.valid_switch(None, "-turbo", "").unwrap_err();
        assert!(matches!(err, ExecError::InvalidSwitch { switch, .. } if switch == "-turbo"));
    }

    #[test]
    fn path_switch_requires_parameter() {
        let err = LTspice.valid_switch(None, "-ini", " ").unwrap_err();
        assert!(matches!(err, ExecError::InvalidSwitchParameter { .. }));
    }

    #[test]
    fn wine_command_line_prefixes_drive() {
        let args = LTspice
            .command_line(&wine_exe(), Path::new("/work/rc_1.net"), &["-alt".into()])
            .unwrap();
        assert_eq!(
            args,
            vec![
                "/home/u/.wine/drive_c/Program Files/ADI/LTspice/LTspice.exe",
                "-Run",
                "-b",
                "Z:/work/rc_1.net",
                "-alt"
            ]
        );
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn native_command_line() {
        let exe = Executable::new(vec!["C:/Program Files/ADI/LTspice/LTspice.exe".into()], None).unwrap();
        let args = LTspice
            .command_line(&exe, Path::new("C:/work/rc_1.net"), &[])
            .unwrap();
        assert_eq!(args, vec!["-Run", "-b", "C:/work/rc_1.net"]);
    }
}
