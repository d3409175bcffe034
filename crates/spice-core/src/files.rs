use std::{
    io,
    path::{Path, PathBuf},
};

use spice_model::{RunNumber, RunTask};
use tracing::{info, warn};

/// Default netlist name for a run: `<stem>_<run>.<ext>`. Qspice schematics are simulated as `.net`.
pub fn run_file_name(circuit: &Path, run: RunNumber) -> String {
    let stem = circuit
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "circuit".to_string());
    let ext = circuit
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .map(|e| if e.eq_ignore_ascii_case("qsch") { "net".to_string() } else { e });
    match ext {
        Some(ext) => format!("{stem}_{run}.{ext}"),
        None => format!("{stem}_{run}"),
    }
}

/// Every file a finished run may have left behind.
pub(crate) fn task_files(task: &RunTask) -> Vec<PathBuf> {
    let net = &task.netlist_file;
    let mut files: Vec<PathBuf> = task.artifacts().map(Path::to_path_buf).collect();
    files.push(net.with_extension("exe.log"));

    let ext = net
        .extension()
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if ext == "net" || ext == "asc" {
        files.push(net.with_extension("log.raw"));
        files.push(net.with_extension("op.raw"));
    }
    if ext == "asc" {
        files.push(net.with_extension("net"));
    }
    files
}

/// Delete a run's netlist and artifacts. Failures are logged and skipped.
///
/// Returns the number of files removed.
pub fn remove_task_files(task: &RunTask) -> usize {
    task_files(task)
        .iter()
        .filter(|f| remove_if_exists(f))
        .count()
}

/// Delete one file. A missing file is not an error; any other failure is logged and skipped.
pub fn remove_if_exists(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => {
            info!(file = %path.display(), "deleted");
            true
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => {
            warn!(file = %path.display(), error = %e, "cannot delete file; skipping");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_file_names() {
        let run = RunNumber::new(7);
        assert_eq!(run_file_name(Path::new("/c/rc.net"), run), "rc_7.net");
        assert_eq!(run_file_name(Path::new("buck.qsch"), run), "buck_7.net");
        assert_eq!(run_file_name(Path::new("amp.asc"), run), "amp_7.asc");
        assert_eq!(run_file_name(Path::new("deck"), run), "deck_7");
    }

    #[test]
    fn asc_runs_also_own_their_generated_netlist() {
        let mut task = RunTask::new(RunNumber::new(1), PathBuf::from("/o/amp_1.asc"));
        task.log_file = Some(PathBuf::from("/o/amp_1.log"));
        let files = task_files(&task);
        assert!(files.contains(&PathBuf::from("/o/amp_1.net")));
        assert!(files.contains(&PathBuf::from("/o/amp_1.op.raw")));
        assert!(files.contains(&PathBuf::from("/o/amp_1.exe.log")));
        assert!(files.contains(&PathBuf::from("/o/amp_1.log")));
    }

    #[test]
    fn removal_skips_missing_files() {
        let dir = std::env::temp_dir().join(format!("spice-files-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let net = dir.join("rc_1.net");
        std::fs::write(&net, "*").unwrap();
        std::fs::write(dir.join("rc_1.raw"), "raw").unwrap();

        let mut task = RunTask::new(RunNumber::new(1), net.clone());
        task.raw_file = Some(dir.join("rc_1.raw"));
        task.log_file = Some(dir.join("rc_1.log"));

        assert_eq!(remove_task_files(&task), 2);
        assert!(!net.exists());
        assert_eq!(remove_task_files(&task), 0);
    }
}
