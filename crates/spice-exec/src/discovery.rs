//! Executable discovery.
//!
//! Resolution order for a backend: explicit override, backend-specific environment variables, the
//! backend's search list, then a `PATH` lookup. On Linux and macOS the Windows-style search entries of
//! wine-capable backends are translated into the default wine prefix (`~/.wine/drive_c/`).
use std::{
    env,
    path::{Path, PathBuf},
};

use tracing::{debug, trace};

use crate::error::{ExecError, ExecResult};

/// A resolved simulator command prefix.
///
/// `parts[0]` is the program to spawn; when a loader such as wine is involved the simulator binary is the
/// last element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Executable {
    parts: Vec<String>,
    process_name: String,
}

impl Executable {
    pub fn new(parts: Vec<String>, process_name: Option<String>) -> Option<Self> {
        let first = parts.first()?.clone();
        let process_name = process_name.unwrap_or_else(|| guess_process_name(&first));
        Some(Self {
            parts,
            process_name,
        })
    }

    /// Build from a user-supplied override string.
    ///
    /// An existing path is taken verbatim. A string containing `\` is a single Windows path. Anything
    /// else is split on whitespace so a loader prefix can be given.
    pub fn from_override(
        backend: &'static str,
        raw: &str,
        process_name: Option<String>,
    ) -> ExecResult<Self> {
        let raw = raw.trim();
        let parts: Vec<String> = if Path::new(raw).exists() {
            vec![to_posix(raw)]
        } else if raw.contains('\\') {
            vec![to_posix(raw)]
        } else {
            raw.split_whitespace().map(str::to_string).collect()
        };

        let not_found = || ExecError::ExecutableNotFound {
            backend,
            detail: Some(format!("provided executable was not found '{raw}'")),
        };
        let first = parts.first().ok_or_else(not_found)?;
        if !Path::new(first).exists() && which(first).is_none() {
            return Err(not_found());
        }
        Executable::new(parts, process_name).ok_or_else(not_found)
    }

    /// Program to spawn.
    pub fn program(&self) -> &str {
        &self.parts[0]
    }

    /// Arguments that belong to the loader prefix.
    pub fn prefix_args(&self) -> &[String] {
        &self.parts[1..]
    }

    /// The simulator binary itself, even behind a loader.
    pub fn simulator_path(&self) -> &str {
        self.parts.last().map(String::as_str).unwrap_or_default()
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    pub fn process_name(&self) -> &str {
        &self.process_name
    }

    /// Whether the simulator runs under the wine compatibility layer.
    pub fn is_wine(&self) -> bool {
        self.program().to_ascii_lowercase().contains("wine")
    }

    /// True when the program exists on disk or on `PATH`. Never spawns anything.
    pub fn exists(&self) -> bool {
        Path::new(self.program()).exists() || which(self.program()).is_some()
    }
}

/// Walk a backend's search list and return the first executable that exists.
///
/// `wine` selects how Windows-style entries are treated on non-Windows hosts: translated into the wine
/// prefix and launched through `wine`, or skipped in favour of plain paths and `PATH` lookups.
pub(crate) fn search(backend: &'static str, candidates: &[&str], wine: bool) -> Option<Executable> {
    for candidate in candidates {
        trace!(backend, candidate, "probing executable");
        if cfg!(windows) {
            let path = expand_home(candidate);
            if path.exists() {
                return found(backend, vec![path_string(&path)]);
            }
            continue;
        }

        if wine && is_windows_style(candidate) {
            let host = wine_host_path(candidate, &default_wine_c_drive(), &user_name());
            if host.exists() {
                return found(backend, vec!["wine".to_string(), path_string(&host)]);
            }
            continue;
        }

        let path = expand_home(candidate);
        if path.exists() {
            return found(backend, vec![path_string(&path)]);
        }
        if which(candidate).is_some() {
            return found(backend, vec![candidate.to_string()]);
        }
    }
    None
}

fn found(backend: &'static str, parts: Vec<String>) -> Option<Executable> {
    let exe = Executable::new(parts, None)?;
    debug!(backend, exe = ?exe.parts(), "simulator executable found");
    Some(exe)
}

/// Translate a Windows-style path (forward slashes, `C:/...` or `~/...`) into the host path inside a wine
/// prefix.
///
/// `~` is the Windows user profile, i.e. `C:/users/<user>`, not the host home directory.
pub fn wine_host_path(win_path: &str, c_drive: &Path, user: &str) -> PathBuf {
    let win_path = match win_path.strip_prefix('~') {
        Some(rest) => format!("C:/users/{user}{rest}"),
        None => win_path.to_string(),
    };
    match strip_drive(&win_path) {
        Some(rest) => c_drive.join(rest),
        None => PathBuf::from(win_path),
    }
}

/// Expand a library directory (absolute or `~`-relative) and keep it only if it is an existing directory.
///
/// When `exe` lives inside a wine prefix (`.../drive_c/...`), Windows-style paths resolve inside that prefix.
pub fn expand_local_dir(path: &str, exe: Option<&str>) -> Option<PathBuf> {
    let c_drive = if cfg!(windows) {
        None
    } else {
        exe.and_then(|e| e.find("/drive_c/").map(|i| PathBuf::from(&e[..i + "/drive_c/".len()])))
    };

    let expanded = match c_drive {
        Some(c_drive) => {
            let host = wine_host_path(path, &c_drive, &user_name());
            expand_home(&path_string(&host))
        }
        None => expand_home(path),
    };
    expanded.is_dir().then_some(expanded)
}

/// OS-visible process name for an executable.
pub fn guess_process_name(exe: &str) -> String {
    if exe.is_empty() {
        return String::new();
    }
    let path = Path::new(exe);
    if cfg!(target_os = "macos") {
        if exe.contains("wine") {
            return "wine-preloader".to_string();
        }
        return path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
    }
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `PATH` lookup.
pub(crate) fn which(program: &str) -> Option<PathBuf> {
    if program.contains('/') || program.contains('\\') {
        return None;
    }
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths).find_map(|dir| {
        let candidate = dir.join(program);
        if candidate.is_file() {
            return Some(candidate);
        }
        if cfg!(windows) {
            let exe = candidate.with_extension("exe");
            if exe.is_file() {
                return Some(exe);
            }
        }
        None
    })
}

pub(crate) fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
}

pub(crate) fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix('~')
        && let Some(home) = home_dir()
    {
        return home.join(rest.trim_start_matches(['/', '\\']));
    }
    PathBuf::from(path)
}

pub(crate) fn default_wine_c_drive() -> PathBuf {
    expand_home("~/.wine/drive_c")
}

fn user_name() -> String {
    env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .unwrap_or_default()
}

fn is_windows_style(path: &str) -> bool {
    path.starts_with('~') || strip_drive(path).is_some()
}

fn strip_drive(path: &str) -> Option<&str> {
    path.strip_prefix("C:/").or_else(|| path.strip_prefix("c:/"))
}

fn to_posix(path: &str) -> String {
    path.replace('\\', "/")
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
