//! HTTP API.
//!
//! Agent routes implement the polling protocol spoken by the in-place test
//! agent. Control routes let a local front-end start, cancel and inspect runs.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::channel::ChannelError;
use crate::run::{CancelReason, Orchestrator, RunError, launch_run};
use jlc_common::protocol::{BODY_LIMIT_BYTES, PLACE_GUID_HEADER, PLACE_ID_HEADER, routes};
use jlc_common::{AgentIdentity, AggregatedTestResult};

/// Shared state for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub orchestrator: Arc<Orchestrator>,
    /// Daemon version.
    pub version: &'static str,
    /// Daemon start time.
    pub started_at: Instant,
}

/// Failure responses for agent requests.
#[derive(Debug)]
enum AgentRejection {
    MissingHeader(&'static str),
    Channel(ChannelError),
}

impl From<ChannelError> for AgentRejection {
    fn from(err: ChannelError) -> Self {
        Self::Channel(err)
    }
}

impl IntoResponse for AgentRejection {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::MissingHeader(name) => (
                StatusCode::BAD_REQUEST,
                format!("missing required header `{name}`"),
            ),
            Self::Channel(err @ ChannelError::AdmissionRejected { .. }) => {
                (StatusCode::FORBIDDEN, err.to_string())
            }
            Self::Channel(err @ ChannelError::Closed) => (StatusCode::GONE, err.to_string()),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

fn agent_identity(headers: &HeaderMap) -> Result<AgentIdentity, AgentRejection> {
    let header = |name: &'static str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or(AgentRejection::MissingHeader(name))
    };
    Ok(AgentIdentity {
        place_id: header(PLACE_ID_HEADER)?,
        place_guid: header(PLACE_GUID_HEADER)?,
    })
}

/// Router for the agent polling protocol only.
pub fn create_agent_router(state: HttpState) -> Router {
    agent_routes()
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .with_state(Arc::new(state))
}

/// Router with agent, control and health routes.
pub fn create_router(state: HttpState) -> Router {
    agent_routes()
        .route("/control/run", post(start_run_handler))
        .route("/control/cancel", post(cancel_handler))
        .route("/control/status", get(status_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .with_state(Arc::new(state))
}

fn agent_routes() -> Router<Arc<HttpState>> {
    Router::new()
        .route(routes::POLL, get(poll_handler))
        .route(routes::LOG, post(log_handler))
        .route(routes::RESULTS, post(results_handler))
        .route(routes::FAIL, post(fail_handler))
}

/// Handler for `GET /` - drain pending commands.
async fn poll_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AgentRejection> {
    let identity = agent_identity(&headers)?;
    let commands = state.orchestrator.poll(&identity).await?;
    Ok(Json(commands))
}

/// Handler for `POST /log` - append output lines.
async fn log_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    Json(lines): Json<Vec<String>>,
) -> Result<StatusCode, AgentRejection> {
    let identity = agent_identity(&headers)?;
    state.orchestrator.append_log(&identity, lines).await?;
    Ok(StatusCode::OK)
}

/// Handler for `POST /results` - reconcile and complete the run.
async fn results_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    Json(result): Json<AggregatedTestResult>,
) -> Result<StatusCode, AgentRejection> {
    let identity = agent_identity(&headers)?;
    state.orchestrator.complete(&identity, result).await?;
    Ok(StatusCode::OK)
}

/// Handler for `POST /fail` - the body is an arbitrary diagnostic.
async fn fail_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AgentRejection> {
    let identity = agent_identity(&headers)?;
    let diagnostic = serde_json::from_slice::<Value>(&body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()));
    state.orchestrator.fail(&identity, diagnostic).await?;
    Ok(StatusCode::OK)
}

/// Handler for `POST /control/run`.
async fn start_run_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    match launch_run(&state.orchestrator).await {
        Ok(started) => (StatusCode::OK, Json(json!(started))),
        Err(err) => {
            let status = match err {
                RunError::AlreadyRunning => StatusCode::CONFLICT,
                RunError::Sourcemap(_) | RunError::Locate(_) | RunError::Config(_) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
            };
            debug!("run request refused: {}", err);
            (status, Json(json!({ "error": err.to_string() })))
        }
    }
}

/// Handler for `POST /control/cancel`.
async fn cancel_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let cancelled = state.orchestrator.cancel(CancelReason::User).await;
    Json(json!({ "cancelled": cancelled }))
}

/// Handler for `GET /control/status` - phase, output and visible tree.
async fn status_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    Json(state.orchestrator.snapshot().await)
}

/// Handler for `/health` - Basic daemon health check.
async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let status = state.orchestrator.status().await;
    Json(json!({
        "status": "healthy",
        "version": state.version,
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "run": status,
    }))
}

/// Bind the listener and serve `router` until `shutdown` resolves.
///
/// Binding happens before spawning so a port conflict is reported to the
/// caller instead of being lost in the task.
pub async fn start_server<F>(
    port: u16,
    router: Router,
    shutdown: F,
) -> std::io::Result<tokio::task::JoinHandle<Result<(), std::io::Error>>>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening for the test agent on {}", addr);

    Ok(tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
    }))
}
