mod housekeeper;
mod ledger;

pub use ledger::ServerTask;

use std::{
    path::{Component, Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use serde_json::Value;
use spice_core::{
    BoxError, Callback, CallbackArgs, RunnerConfig, RunnerStats, SimRunner, SubmitOptions,
};
use spice_exec::Simulator;
use spice_model::RunNumber;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{archive, error::ApiError, handler::ApiHandler, wire::ServerInfo};
use ledger::{Attach, Ledger};

const METHODS: &[&str] = &[
    "start_session",
    "add_sources",
    "run",
    "status",
    "get_files",
    "close_session",
];

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Uploads are unpacked and simulated here.
    pub output_folder: PathBuf,
    pub parallel_sims: usize,
    pub timeout: Option<Duration>,
    /// How often finished runs are collected from the scheduler.
    pub poll_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 9000,
            output_folder: PathBuf::from("./temp"),
            parallel_sims: 4,
            timeout: Some(Duration::from_secs(300)),
            poll_interval: Duration::from_millis(200),
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn runner_config(&self) -> RunnerConfig {
        RunnerConfig::default()
            .with_parallel_sims(self.parallel_sims.max(1))
            .with_timeout(self.timeout)
            .with_output_folder(&self.output_folder)
    }
}

/// Session front end over one [`SimRunner`].
///
/// Every run zips its raw and log files when it ends, whatever the outcome. A housekeeper task moves finished
/// runs out of the scheduler every [`ServerConfig::poll_interval`]; [`ApiHandler::get_files`] hands the archive
/// over once and deletes everything the run left on disk.
pub struct SimServer {
    runner: Arc<SimRunner>,
    ledger: Arc<Ledger>,
    cfg: ServerConfig,
    stop: CancellationToken,
    housekeeper: Mutex<Option<JoinHandle<()>>>,
}

impl SimServer {
    /// Build the scheduler and start the housekeeper. Must be called inside a tokio runtime.
    pub fn new(simulator: Simulator, cfg: ServerConfig) -> Result<Arc<Self>, ApiError> {
        std::fs::create_dir_all(&cfg.output_folder)?;
        let runner = Arc::new(SimRunner::new(simulator, cfg.runner_config())?);
        let ledger = Arc::new(Ledger::default());
        let stop = CancellationToken::new();

        let housekeeper = tokio::spawn(housekeeper::housekeep(
            Arc::clone(&runner),
            Arc::clone(&ledger),
            cfg.poll_interval,
            stop.clone(),
        ));

        info!(
            simulator = runner.simulator().name(),
            output_folder = %cfg.output_folder.display(),
            parallel_sims = cfg.parallel_sims,
            "simulation server ready"
        );
        Ok(Arc::new(Self {
            runner,
            ledger,
            cfg,
            stop,
            housekeeper: Mutex::new(Some(housekeeper)),
        }))
    }

    pub fn runner(&self) -> &SimRunner {
        &self.runner
    }

    pub fn config(&self) -> &ServerConfig {
        &self.cfg
    }

    pub fn is_running(&self) -> bool {
        !self.stop.is_cancelled()
    }

    /// Wait for every run, stop the housekeeper and delete everything still on disk.
    pub async fn shutdown(&self) {
        let stats = self.runner.stats();
        info!(
            pending = stats.pending,
            running = stats.running,
            "stopping simulation server"
        );
        self.runner.drain(None, false).await;
        housekeeper::collect(&self.runner, &self.ledger);

        self.stop.cancel();
        let handle = self
            .housekeeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!(error = %e, "housekeeper ended abnormally");
        }

        let leftovers = self.ledger.take_finished();
        let runner = Arc::clone(&self.runner);
        let removed = tokio::task::spawn_blocking(move || {
            leftovers.iter().map(ServerTask::remove_files).sum::<usize>() + runner.cleanup_all()
        })
        .await
        .unwrap_or_default();
        info!(removed, "simulation server stopped");
    }

    async fn unpack(&self, archive: Vec<u8>) -> Result<Vec<PathBuf>, ApiError> {
        let dir = self.cfg.output_folder.clone();
        tokio::task::spawn_blocking(move || archive::unpack(&archive, &dir))
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?
    }
}

/// Callback attached to every server run: zip whatever artifacts exist next to them.
fn zip_artifacts(
    raw: Option<&Path>,
    log: Option<&Path>,
    _args: &CallbackArgs,
) -> Result<Value, BoxError> {
    let files: Vec<&Path> = raw.into_iter().chain(log).collect();
    let Some(first) = files.first() else {
        return Ok(Value::Null);
    };
    let dest = first.with_extension("zip");
    archive::pack_to_file(&files, &dest)?;
    Ok(Value::String(dest.display().to_string()))
}

/// A plain relative path that stays inside the working directory.
fn is_contained(name: &str) -> bool {
    let path = Path::new(name);
    !name.is_empty() && path.components().all(|c| matches!(c, Component::Normal(_)))
}

#[async_trait]
impl ApiHandler for SimServer {
    async fn start_session(&self) -> Result<String, ApiError> {
        let session = self.ledger.open();
        info!(%session, "session started");
        Ok(session)
    }

    async fn add_sources(&self, session: &str, archive: Vec<u8>) -> Result<bool, ApiError> {
        if !self.ledger.contains(session) {
            warn!(%session, "add_sources for unknown session");
            return Ok(false);
        }
        let files = self.unpack(archive).await?;
        debug!(%session, files = files.len(), "sources added");
        Ok(true)
    }

    #[instrument(level = "debug", skip(self, archive), fields(bytes = archive.len()))]
    async fn run(
        &self,
        session: &str,
        circuit: &str,
        archive: Vec<u8>,
    ) -> Result<Option<RunNumber>, ApiError> {
        if !self.ledger.contains(session) {
            warn!(%session, "run for unknown session");
            return Ok(None);
        }
        if !is_contained(circuit) {
            return Err(ApiError::InvalidRequest(format!(
                "circuit name must be a relative path: {circuit}"
            )));
        }
        self.unpack(archive).await?;

        let path = self.cfg.output_folder.join(circuit);
        if !path.is_file() {
            return Err(ApiError::InvalidRequest(format!(
                "circuit {circuit} is not in the archive"
            )));
        }

        let opts = SubmitOptions::new()
            .with_callback(Callback::in_process(zip_artifacts))
            .callback_on_error(true);
        let handle = self.runner.submit(path.as_path(), opts).await?;
        let run = handle.run_number();

        match self.ledger.attach(session, run) {
            Attach::Owned => {}
            Attach::Orphaned => {
                warn!(%session, run = %run, "session closed while submitting");
                return Ok(None);
            }
            Attach::Stale(task) => {
                warn!(%session, run = %run, "session closed while submitting; run already finished");
                let removed = tokio::task::spawn_blocking(move || task.remove_files())
                    .await
                    .unwrap_or_default();
                debug!(run = %run, removed, "deleted files of a stale run");
                return Ok(None);
            }
        }
        info!(%session, run = %run, circuit, "run submitted");
        Ok(Some(run))
    }

    async fn status(&self, session: &str) -> Result<Vec<RunNumber>, ApiError> {
        self.ledger
            .terminal(session)
            .ok_or_else(|| ApiError::SessionNotFound(session.to_string()))
    }

    async fn get_files(
        &self,
        session: &str,
        run: RunNumber,
    ) -> Result<Option<(String, Vec<u8>)>, ApiError> {
        let Some(task) = self.ledger.claim(session, run) else {
            debug!(%session, run = %run, "nothing to send");
            return Ok(None);
        };

        let name = task.archive_name();
        let bytes = tokio::task::spawn_blocking(move || {
            let bytes = match &task.zip_file {
                Some(zip) => std::fs::read(zip).map_err(ApiError::from),
                None => archive::pack(&[]),
            };
            task.remove_files();
            bytes
        })
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

        info!(%session, run = %run, %name, bytes = bytes.len(), "files sent");
        Ok(Some((name, bytes)))
    }

    async fn close_session(&self, session: &str) -> Result<bool, ApiError> {
        let Some(done) = self.ledger.close(session) else {
            return Ok(false);
        };
        let removed = tokio::task::spawn_blocking(move || {
            done.iter().map(ServerTask::remove_files).sum::<usize>()
        })
        .await
        .unwrap_or_default();
        info!(%session, removed, "session closed");
        Ok(true)
    }

    fn server_info(&self) -> ServerInfo {
        ServerInfo {
            methods: METHODS.iter().map(|m| m.to_string()).collect(),
            running: self.is_running(),
            hostname: hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_default(),
            simulator: self.runner.simulator().name().to_string(),
            sessions: self.ledger.session_count(),
            stats: self.runner.stats(),
        }
    }

    fn stats(&self) -> RunnerStats {
        self.runner.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circuit_names_stay_inside() {
        assert!(is_contained("rc.net"));
        assert!(is_contained("sub/rc.net"));
        assert!(!is_contained(""));
        assert!(!is_contained("../rc.net"));
        assert!(!is_contained("/etc/passwd"));
    }

    #[test]
    fn defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.addr(), "localhost:9000");
        assert_eq!(cfg.poll_interval, Duration::from_millis(200));
        assert_eq!(cfg.runner_config().parallel_sims, 4);
        let one = ServerConfig {
            parallel_sims: 0,
            ..ServerConfig::default()
        };
        assert_eq!(one.runner_config().parallel_sims, 1);
    }

    #[test]
    fn zip_is_named_after_the_artifacts() {
        let dir = std::env::temp_dir().join(format!("spice-api-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let raw = dir.join("rc_1.raw");
        let log = dir.join("rc_1.log");
        std::fs::write(&raw, "raw").unwrap();
        std::fs::write(&log, "log").unwrap();

        let out = zip_artifacts(Some(raw.as_path()), Some(log.as_path()), &Vec::new()).unwrap();
        assert_eq!(out, Value::String(dir.join("rc_1.zip").display().to_string()));
        assert!(dir.join("rc_1.zip").exists());
        assert_eq!(zip_artifacts(None, None, &Vec::new()).unwrap(), Value::Null);
    }
}
