//! POSIX rlimits for simulator processes.
//!
//! Applied between `fork()` and `execve()`, so the simulator never starts unrestricted.
//! Non-Unix targets log the request and run without limits.
use tokio::process::Command;

/// Resource limits for one simulator process. `None` keeps the inherited value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RlimitConfig {
    /// `RLIMIT_NOFILE`.
    pub max_open_files: Option<u64>,
    /// `RLIMIT_FSIZE`. A raw file growing past it gets the simulator `SIGXFSZ`.
    pub max_file_size_bytes: Option<u64>,
    /// Sets `RLIMIT_CORE` to zero so crashed simulators leave no core files in the output folder.
    pub disable_core_dumps: bool,
}

/// Which limit an entry of [`RlimitConfig::entries`] sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    OpenFiles,
    FileSize,
    CoreSize,
}

impl RlimitConfig {
    pub fn is_empty(&self) -> bool {
        self.entries().iter().all(Option::is_none)
    }

    /// Limits to apply, in a fixed-size table so the child side never allocates.
    pub fn entries(&self) -> [Option<(Limit, u64)>; 3] {
        [
            self.max_open_files.map(|n| (Limit::OpenFiles, n)),
            self.max_file_size_bytes.map(|n| (Limit::FileSize, n)),
            self.disable_core_dumps.then_some((Limit::CoreSize, 0)),
        ]
    }
}

/// Install the limits on `cmd`. Does nothing for an empty config.
pub fn attach_rlimits(cmd: &mut Command, config: &RlimitConfig) {
    if config.is_empty() {
        return;
    }

    #[cfg(unix)]
    unix_impl::install(cmd, config.entries());

    #[cfg(not(unix))]
    {
        let _ = cmd;
        tracing::warn!(target: "spice_exec::limits", ?config, "rlimits are only supported on unix; ignored");
    }
}

#[cfg(unix)]
mod unix_impl {
    use std::io;

    use tokio::process::Command;

    use super::Limit;

    pub(super) fn install(cmd: &mut Command, table: [Option<(Limit, u64)>; 3]) {
        // SAFETY: the hook only reads a copied array and calls setrlimit, which is async-signal-safe.
        unsafe {
            cmd.pre_exec(move || table.iter().flatten().try_for_each(|&(limit, value)| set(limit, value)));
        }
    }

    fn set(limit: Limit, value: u64) -> io::Result<()> {
        let resource = match limit {
            Limit::OpenFiles => libc::RLIMIT_NOFILE,
            Limit::FileSize => libc::RLIMIT_FSIZE,
            Limit::CoreSize => libc::RLIMIT_CORE,
        };
        let value = value as libc::rlim_t;
        let rlim = libc::rlimit {
            rlim_cur: value,
            rlim_max: value,
        };
        match unsafe { libc::setrlimit(resource, &rlim) } {
            0 => Ok(()),
            _ => Err(io::Error::last_os_error()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_follow_the_config() {
        assert!(RlimitConfig::default().is_empty());

        let cfg = RlimitConfig {
            max_file_size_bytes: Some(1 << 20),
            disable_core_dumps: true,
            ..Default::default()
        };
        assert!(!cfg.is_empty());
        assert_eq!(
            cfg.entries(),
            [None, Some((Limit::FileSize, 1 << 20)), Some((Limit::CoreSize, 0))]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn open_files_limit_reaches_the_child() {
        let cfg = RlimitConfig {
            max_open_files: Some(64),
            disable_core_dumps: true,
            ..Default::default()
        };
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "ulimit -n"]).stdout(std::process::Stdio::piped());
        attach_rlimits(&mut cmd, &cfg);

        let out = cmd.output().await.unwrap();
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "64");
    }
}
