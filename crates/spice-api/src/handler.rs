use async_trait::async_trait;
use spice_core::RunnerStats;
use spice_model::RunNumber;

use crate::{error::ApiError, wire::ServerInfo};

/// Simulation session API.
///
/// [`crate::SimServer`] is the stock implementation; wrap it to add authentication, quotas and the like.
#[async_trait]
pub trait ApiHandler: Send + Sync + 'static {
    /// Open a session and return its token.
    async fn start_session(&self) -> Result<String, ApiError>;

    /// Unpack supporting files (libraries, includes) into the working directory.
    ///
    /// `Ok(false)` for an unknown session.
    async fn add_sources(&self, session: &str, archive: Vec<u8>) -> Result<bool, ApiError>;

    /// Unpack `archive`, then simulate `circuit` from it. `Ok(None)` for an unknown session.
    async fn run(
        &self,
        session: &str,
        circuit: &str,
        archive: Vec<u8>,
    ) -> Result<Option<RunNumber>, ApiError>;

    /// Runs of the session that reached a terminal state and were not fetched yet.
    async fn status(&self, session: &str) -> Result<Vec<RunNumber>, ApiError>;

    /// Archive name and bytes for a finished run, at most once. `Ok(None)` when there is nothing to send.
    async fn get_files(
        &self,
        session: &str,
        run: RunNumber,
    ) -> Result<Option<(String, Vec<u8>)>, ApiError>;

    /// Drop the session and every file it still owns. `Ok(false)` for an unknown session.
    async fn close_session(&self, session: &str) -> Result<bool, ApiError>;

    fn server_info(&self) -> ServerInfo;

    fn stats(&self) -> RunnerStats;
}
