use std::{
    collections::{BTreeMap, VecDeque},
    path::{Path, PathBuf},
    time::Duration,
};

use serde::de::DeserializeOwned;
use spice_model::RunNumber;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::{
    archive,
    error::ApiError,
    wire::{
        FilesResponse, OkResponse, RunRequest, RunResponse, ServerInfo, SessionResponse,
        SourcesRequest, StatusResponse,
    },
};

/// Minimum spacing between two status polls in [`SimClient::next_finished`].
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {message}")]
    Server { status: u16, message: String },

    #[error("session {0} is not known to the server")]
    SessionRejected(String),

    #[error("archive: {0}")]
    Archive(#[from] ApiError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One session on a remote simulation server.
///
/// Remembers which circuit each run came from so results can be written next to it.
pub struct SimClient {
    http: reqwest::Client,
    base: String,
    session: String,
    /// Submitted, not yet reported finished.
    started: BTreeMap<RunNumber, PathBuf>,
    /// Reported finished, not yet fetched.
    finished: BTreeMap<RunNumber, PathBuf>,
    ready: VecDeque<RunNumber>,
    last_poll: Option<Instant>,
}

impl SimClient {
    /// Connect to `base` (e.g. `http://localhost:9000`) and start a session.
    pub async fn connect(base: impl Into<String>) -> Result<Self, ClientError> {
        let base = base.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::new();
        let resp = http.post(format!("{base}/api/v1/sessions")).send().await?;
        let SessionResponse { session } = decode(resp).await?;
        info!(%base, %session, "connected to simulation server");

        Ok(Self {
            http,
            base,
            session,
            started: BTreeMap::new(),
            finished: BTreeMap::new(),
            ready: VecDeque::new(),
            last_poll: None,
        })
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    fn url(&self, tail: &str) -> String {
        format!("{}/api/v1/sessions/{}{tail}", self.base, self.session)
    }

    pub async fn server_info(&self) -> Result<ServerInfo, ClientError> {
        let resp = self
            .http
            .get(format!("{}/api/v1/server", self.base))
            .send()
            .await?;
        decode(resp).await
    }

    /// Upload supporting files (libraries, includes) for later runs.
    pub async fn add_sources(&self, files: &[PathBuf]) -> Result<bool, ClientError> {
        let paths: Vec<&Path> = files.iter().map(PathBuf::as_path).collect();
        let archive = archive::pack(&paths)?;
        let resp = self
            .http
            .post(self.url("/sources"))
            .json(&SourcesRequest { archive })
            .send()
            .await?;
        let OkResponse { ok } = decode(resp).await?;
        Ok(ok)
    }

    /// Upload `circuit` with its `dependencies` and start a simulation of it.
    pub async fn run(
        &mut self,
        circuit: &Path,
        dependencies: &[PathBuf],
    ) -> Result<RunNumber, ClientError> {
        let name = circuit
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut paths = vec![circuit];
        paths.extend(dependencies.iter().map(PathBuf::as_path));
        let archive = archive::pack(&paths)?;

        let resp = self
            .http
            .post(self.url("/runs"))
            .json(&RunRequest {
                circuit: name,
                archive,
            })
            .send()
            .await?;
        let RunResponse { run } = decode(resp).await?;
        let run = u64::try_from(run)
            .map(RunNumber::new)
            .map_err(|_| ClientError::SessionRejected(self.session.clone()))?;

        debug!(run = %run, circuit = %circuit.display(), "run started");
        self.started.insert(run, circuit.to_path_buf());
        Ok(run)
    }

    /// Finished runs the server still holds for this session.
    pub async fn status(&self) -> Result<Vec<RunNumber>, ClientError> {
        let resp = self.http.get(self.url("/status")).send().await?;
        let StatusResponse { runs } = decode(resp).await?;
        Ok(runs)
    }

    /// Wait for the next run of this session to finish. `None` once every started run was reported.
    pub async fn next_finished(&mut self) -> Result<Option<RunNumber>, ClientError> {
        loop {
            if let Some(run) = self.ready.pop_front() {
                return Ok(Some(run));
            }
            if self.started.is_empty() {
                return Ok(None);
            }
            if let Some(last) = self.last_poll {
                tokio::time::sleep_until(last + MIN_POLL_INTERVAL).await;
            }
            self.last_poll = Some(Instant::now());

            for run in self.status().await? {
                if let Some(circuit) = self.started.remove(&run) {
                    self.finished.insert(run, circuit);
                    self.ready.push_back(run);
                }
            }
        }
    }

    /// Fetch the result archive of `run` into `dir`, or next to its circuit when `dir` is `None`.
    ///
    /// `Ok(None)` when the server had nothing (unknown, unfinished or already fetched).
    pub async fn get_run_data(
        &mut self,
        run: RunNumber,
        dir: Option<&Path>,
    ) -> Result<Option<PathBuf>, ClientError> {
        let resp = self
            .http
            .get(self.url(&format!("/runs/{run}/files")))
            .send()
            .await?;
        let FilesResponse { name, archive } = decode(resp).await?;
        if name.is_empty() {
            return Ok(None);
        }

        let circuit = self.finished.remove(&run).or_else(|| self.started.remove(&run));
        let dir = match dir {
            Some(dir) => dir.to_path_buf(),
            None => circuit
                .as_deref()
                .and_then(Path::parent)
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        };
        let dest = dir.join(&name);
        tokio::fs::write(&dest, &archive).await?;
        debug!(run = %run, file = %dest.display(), bytes = archive.len(), "run data saved");
        Ok(Some(dest))
    }

    /// End the session; the server deletes every file it still holds for it.
    pub async fn close_session(self) -> Result<bool, ClientError> {
        let resp = self.http.delete(self.url("")).send().await?;
        let OkResponse { ok } = decode(resp).await?;
        info!(session = %self.session, "session closed");
        Ok(ok)
    }
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json().await?);
    }
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or(body);
    Err(ClientError::Server {
        status: status.as_u16(),
        message,
    })
}
