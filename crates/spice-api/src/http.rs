use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{delete, get, post},
};
use spice_model::RunNumber;
use tracing::{debug, error};

use crate::{
    error::ApiError,
    handler::ApiHandler,
    metrics::Metrics,
    wire::{
        FilesResponse, OkResponse, RunRequest, RunResponse, SessionResponse, SourcesRequest,
        StatusResponse,
    },
};

/// Uploads carry whole circuit directories.
const DEFAULT_BODY_LIMIT: usize = 256 * 1024 * 1024;

/// HTTP API service builder.
pub struct HttpApi<H> {
    handler: Arc<H>,
    metrics: Option<Arc<Metrics>>,
    body_limit: usize,
}

impl<H> HttpApi<H>
where
    H: ApiHandler,
{
    pub fn new(handler: Arc<H>) -> Self {
        Self {
            handler,
            metrics: None,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    /// Serve `metrics` on `GET /metrics`.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes;
        self
    }

    /// Build axum router with mounted endpoints.
    ///
    /// Routes:
    /// - POST /api/v1/sessions - start_session
    /// - DELETE /api/v1/sessions/{session} - close_session
    /// - POST /api/v1/sessions/{session}/sources - add_sources
    /// - POST /api/v1/sessions/{session}/runs - run
    /// - GET /api/v1/sessions/{session}/status - status
    /// - GET /api/v1/sessions/{session}/runs/{run}/files - get_files
    /// - GET /api/v1/server - server introspection
    /// - GET /healthz - liveness
    /// - GET /metrics - prometheus, when configured
    pub fn router(self) -> Router {
        let api = Router::new()
            .route("/healthz", get(healthz))
            .route("/api/v1/server", get(server_info::<H>))
            .route("/api/v1/sessions", post(start_session::<H>))
            .route("/api/v1/sessions/{session}", delete(close_session::<H>))
            .route("/api/v1/sessions/{session}/sources", post(add_sources::<H>))
            .route("/api/v1/sessions/{session}/runs", post(run::<H>))
            .route("/api/v1/sessions/{session}/status", get(status::<H>))
            .route(
                "/api/v1/sessions/{session}/runs/{run}/files",
                get(get_files::<H>),
            )
            .layer(DefaultBodyLimit::max(self.body_limit))
            .with_state(Arc::clone(&self.handler));

        match self.metrics {
            Some(metrics) => api.merge(
                Router::new()
                    .route("/metrics", get(scrape::<H>))
                    .with_state((self.handler, metrics)),
            ),
            None => api,
        }
    }
}

async fn healthz() -> impl IntoResponse {
    "ok"
}

/// GET /api/v1/server
async fn server_info<H>(State(handler): State<Arc<H>>) -> impl IntoResponse
where
    H: ApiHandler,
{
    Json(handler.server_info())
}

/// POST /api/v1/sessions
async fn start_session<H>(State(handler): State<Arc<H>>) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let session = handler.start_session().await?;
    Ok(Json(SessionResponse { session }))
}

/// POST /api/v1/sessions/{session}/sources
async fn add_sources<H>(
    State(handler): State<Arc<H>>,
    Path(session): Path<String>,
    Json(req): Json<SourcesRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    debug!(%session, bytes = req.archive.len(), "add_sources");
    let ok = handler.add_sources(&session, req.archive).await?;
    Ok(Json(OkResponse { ok }))
}

/// POST /api/v1/sessions/{session}/runs
async fn run<H>(
    State(handler): State<Arc<H>>,
    Path(session): Path<String>,
    Json(req): Json<RunRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    debug!(%session, circuit = %req.circuit, bytes = req.archive.len(), "run");
    let run = handler
        .run(&session, &req.circuit, req.archive)
        .await?
        .map_or(-1, |r| i64::try_from(r.get()).unwrap_or(i64::MAX));
    Ok(Json(RunResponse { run }))
}

/// GET /api/v1/sessions/{session}/status
async fn status<H>(
    State(handler): State<Arc<H>>,
    Path(session): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let runs = handler.status(&session).await?;
    Ok(Json(StatusResponse { runs }))
}

/// GET /api/v1/sessions/{session}/runs/{run}/files
async fn get_files<H>(
    State(handler): State<Arc<H>>,
    Path((session, run)): Path<(String, u64)>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let files = handler.get_files(&session, RunNumber::new(run)).await?;
    let response = match files {
        Some((name, archive)) => FilesResponse { name, archive },
        None => FilesResponse::default(),
    };
    Ok(Json(response))
}

/// DELETE /api/v1/sessions/{session}
async fn close_session<H>(
    State(handler): State<Arc<H>>,
    Path(session): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let ok = handler.close_session(&session).await?;
    Ok(Json(OkResponse { ok }))
}

/// GET /metrics
async fn scrape<H>(State((handler, metrics)): State<(Arc<H>, Arc<Metrics>)>) -> impl IntoResponse
where
    H: ApiHandler,
{
    let info = handler.server_info();
    metrics.observe(&info.stats, info.sessions);
    match metrics.encode() {
        Ok((content_type, body)) => ([(header::CONTENT_TYPE, content_type)], body).into_response(),
        Err(e) => {
            error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics").into_response()
        }
    }
}
