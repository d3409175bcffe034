use std::time::Duration;

use tokio::process::Child;
use tracing::{debug, warn};

/// Time a simulator gets to exit after SIGTERM before it is killed.
pub(crate) const KILL_GRACE: Duration = Duration::from_millis(500);

/// Terminate a child and its process group, then reap it.
///
/// SIGTERM to the whole group first, SIGKILL after `grace`.
#[cfg(unix)]
pub(crate) async fn kill_graceful(child: &mut Child, grace: Duration) -> std::io::Result<()> {
    let Some(pid) = child.id() else {
        return Ok(());
    };
    let pgid = -(pid as libc::pid_t);

    // SAFETY: plain kill(2) on a process group we created.
    unsafe {
        libc::kill(pgid, libc::SIGTERM);
    }
    if tokio::time::timeout(grace, child.wait()).await.is_ok() {
        debug!(pid, "simulator exited after SIGTERM");
        return Ok(());
    }

    warn!(pid, "simulator ignored SIGTERM; killing process group");
    unsafe {
        libc::kill(pgid, libc::SIGKILL);
    }
    child.kill().await
}

#[cfg(not(unix))]
pub(crate) async fn kill_graceful(child: &mut Child, _grace: Duration) -> std::io::Result<()> {
    child.kill().await
}
