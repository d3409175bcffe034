use std::path::Path;

use super::{Backend, normalize_switch, path_arg};
use crate::{discovery::Executable, error::ExecResult};

/// Runs the circuit file itself as a shell script: `sh <netlist> <netlist> <raw> <log>`.
///
/// Lets the scheduler be driven against real OS processes without a simulator installed. Inside the script
/// `$1` is the netlist, `$2` the raw file and `$3` the log, which it is expected to write itself. Switches
/// follow as `$4` onwards.
#[derive(Debug, Clone, Copy, Default)]
pub struct Shell;

impl Backend for Shell {
    fn name(&self) -> &'static str {
        "shell"
    }

    fn locate(&self) -> Option<Executable> {
        if cfg!(windows) {
            Executable::new(vec!["cmd".into(), "/C".into()], None)
        } else {
            Executable::new(vec!["sh".into()], None)
        }
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
        let param = param.trim();
        if param.is_empty() {
            Ok(vec![switch])
        } else {
            Ok(vec![switch, param.to_string()])
        }
    }

    fn command_line(
        &self,
        exe: &Executable,
        netlist: &Path,
        switches: &[String],
    ) -> ExecResult<Vec<String>> {
        let mut args: Vec<String> = exe.prefix_args().to_vec();
        let netlist_arg = path_arg(netlist);
        args.extend([
            netlist_arg.clone(),
            netlist_arg,
            path_arg(&self.raw_file(netlist)),
            path_arg(&self.log_file(netlist)),
        ]);
        args.extend(switches.iter().cloned());
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_sees_netlist_raw_and_log_as_positionals() {
        let exe = Executable::new(vec!["sh".into()], None).unwrap();
        let args = Shell
            .command_line(&exe, Path::new("/w/rc_1.net"), &["-x".into()])
            .unwrap();
        // `sh` takes the first operand as the script and `$0`; the rest become `$1..`.
        assert_eq!(
            args,
            vec!["/w/rc_1.net", "/w/rc_1.net", "/w/rc_1.raw", "/w/rc_1.log", "-x"]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn positional_parameters_reach_the_script() {
        let dir = std::env::temp_dir().join(format!("spice-shell-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let net = dir.join("args.net");
        std::fs::write(&net, "printf '%s\\n' \"$1\" > \"$2\"\necho log > \"$3\"\n").unwrap();

        let exe = Shell.locate().unwrap();
        let args = Shell.command_line(&exe, &net, &[]).unwrap();
        let status = tokio::process::Command::new(exe.program())
            .args(&args)
            .status()
            .await
            .unwrap();
        assert!(status.success());

        let raw = std::fs::read_to_string(Shell.raw_file(&net)).unwrap();
        assert_eq!(raw.trim(), net.display().to_string());
        assert!(Shell.log_file(&net).exists());
    }
}
