use std::path::Path;

use tracing::info;

use super::{Backend, normalize_switch, path_arg, require_param};
use crate::{
    discovery::Executable,
    error::{ExecError, ExecResult},
};

const NAME: &str = "xyce";

const SEARCH_PATHS: &[&str] = &["C:/Program Files/Xyce 7.9 NORAD/bin/xyce.exe", "xyce"];

/// Log and raw file locations are always set by the adapter.
const RUN_SWITCHES: &[&str] = &["-l", "-r"];

const REDEFINED_PARAM_POLICIES: &[&str] = &["ignore", "uselast", "usefirst", "warn", "error"];

#[derive(Clone, Copy)]
enum Param {
    None,
    /// Free-form text, passed through.
    Text,
    Int,
    OnOff,
    TrueFalse,
    RedefinedParams,
}

const SWITCHES: &[(&str, Param)] = &[
    ("-capabilities", Param::None),
    ("-license", Param::None),
    ("-param", Param::Text),
    ("-doc", Param::Text),
    ("-doc_cat", Param::Text),
    ("-count", Param::None),
    ("-syntax", Param::None),
    ("-norun", Param::None),
    ("-namesfile", Param::Text),
    ("-noise_names_file", Param::Text),
    ("-quiet", Param::None),
    ("-jacobian_test", Param::None),
    ("-hspice-ext", Param::Text),
    ("-redefined_params", Param::RedefinedParams),
    ("-subckt_multiplier", Param::TrueFalse),
    ("-delim", Param::Text),
    ("-o", Param::Text),
    ("-per-processor", Param::None),
    ("-remeasure", Param::Text),
    ("-nox", Param::OnOff),
    ("-linsolv", Param::Text),
    ("-maxord", Param::Int),
    ("-max-warnings", Param::Int),
    ("-prf", Param::Text),
    ("-rsf", Param::Text),
    ("-a", Param::None),
    ("-randseed", Param::Int),
    ("-plugin", Param::Text),
];

/// Sandia Xyce.
#[derive(Debug, Clone, Copy, Default)]
pub struct Xyce;

impl Backend for Xyce {
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

        if matches!(kind, Param::None) {
            return Ok(vec![switch]);
        }

        let param = require_param(&switch, param)?;
        let ok = match kind {
            Param::None | Param::Text => true,
            Param::Int => param.parse::<i64>().is_ok(),
            Param::OnOff => matches!(param.to_ascii_lowercase().as_str(), "on" | "off"),
            Param::TrueFalse => matches!(param.to_ascii_lowercase().as_str(), "true" | "false"),
            Param::RedefinedParams => REDEFINED_PARAM_POLICIES.contains(&param.as_str()),
        };
        if !ok {
            return Err(ExecError::InvalidSwitchParameter { switch, param });
        }
        Ok(vec![switch, param])
    }

    fn command_line(
        &self,
        exe: &Executable,
        netlist: &Path,
        switches: &[String],
    ) -> ExecResult<Vec<String>> {
        let mut args: Vec<String> = exe.prefix_args().to_vec();
        args.extend(switches.iter().cloned());
        args.extend([
            "-l".to_string(),
            path_arg(&self.log_file(netlist)),
            "-r".to_string(),
            path_arg(&self.raw_file(netlist)),
            path_arg(netlist),
        ]);
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_parameters() {
        let b = Xyce;
        assert_eq!(b.valid_switch(None, "-maxord", "3").unwrap(), vec!["-maxord", "3"]);
        assert_eq!(b.valid_switch(None, "nox", "OFF").unwrap(), vec!["-nox", "OFF"]);
        assert_eq!(
            b.valid_switch(None, "-redefined_params", "usefirst").unwrap(),
            vec!["-redefined_params", "usefirst"]
        );

        for (switch, bad) in [
            ("-maxord", "three"),
            ("-nox", "maybe"),
            ("-subckt_multiplier", "yes"),
            ("-redefined_params", "sometimes"),
        ] {
            assert!(
                matches!(
                    b.valid_switch(None, switch, bad),
                    Err(ExecError::InvalidSwitchParameter { .. })
                ),
                "{switch} {bad}"
            );
        }
    }

    #[test]
    fn flags_and_defaults() {
        let b = Xyce;
        assert_eq!(b.valid_switch(None, "-quiet", "ignored").unwrap(), vec!["-quiet"]);
        assert!(b.valid_switch(None, "-l", "x.log").unwrap().is_empty());
    }

    #[test]
    fn command_line_layout() {
        let exe = Executable::new(vec!["xyce".into()], None).unwrap();
        let args = Xyce
            .command_line(&exe, Path::new("/w/amp_4.net"), &["-quiet".into()])
            .unwrap();
        assert_eq!(
            args,
            vec!["-quiet", "-l", "/w/amp_4.log", "-r", "/w/amp_4.raw", "/w/amp_4.net"]
        );
    }
}
