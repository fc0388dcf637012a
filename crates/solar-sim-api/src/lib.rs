//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "HTTP probes, metrics scrape, and debug info endpoints."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---

use std::fmt;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use solar_sim_core::{FarmStore, FarmView};
use solar_sim_data::FarmId;
use solar_sim_metrics::FarmExporter;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Read access to the farms currently held in memory.
pub trait FarmStatusSource: Send + Sync + 'static {
    /// Farms whose data has been loaded, in configuration order.
    fn loaded_farms(&self) -> Vec<FarmId>;

    fn farm_views(&self) -> Vec<FarmView>;
}

impl FarmStatusSource for FarmStore {
    fn loaded_farms(&self) -> Vec<FarmId> {
        self.farm_ids()
    }

    fn farm_views(&self) -> Vec<FarmView> {
        self.views()
    }
}

/// Produces the `/metrics` body.
pub trait MetricsRenderer: Send + Sync + 'static {
    fn render(&self) -> Result<String>;

    fn content_type(&self) -> &'static str;
}

impl MetricsRenderer for FarmExporter {
    fn render(&self) -> Result<String> {
        FarmExporter::render(self)
    }

    fn content_type(&self) -> &'static str {
        FarmExporter::content_type(self)
    }
}

/// Effective runtime settings echoed by `/info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeInfo {
    pub update_interval_ms: u64,
    pub data_path: String,
}

/// Shared API state exposed to handlers.
pub struct ApiState {
    started: Instant,
    expected_farms: usize,
    farms: Arc<dyn FarmStatusSource>,
    metrics: Arc<dyn MetricsRenderer>,
    runtime: RuntimeInfo,
}

impl ApiState {
    /// `started` is the moment the process came up; `/health` reports uptime from it.
    pub fn new(
        started: Instant,
        expected_farms: usize,
        farms: Arc<dyn FarmStatusSource>,
        metrics: Arc<dyn MetricsRenderer>,
        runtime: RuntimeInfo,
    ) -> Self {
        Self {
            started,
            expected_farms,
            farms,
            metrics,
            runtime,
        }
    }

    fn health(&self) -> HealthResponse {
        HealthResponse {
            status: "ok",
            timestamp: Utc::now().to_rfc3339(),
            uptime: self.started.elapsed().as_secs_f64(),
        }
    }

    /// Ready once exactly the configured number of farms hold a series.
    fn readiness(&self) -> Option<Vec<FarmId>> {
        let loaded = self.farms.loaded_farms();
        (loaded.len() == self.expected_farms).then_some(loaded)
    }

    fn info(&self) -> InfoResponse {
        let farms = self
            .farms
            .farm_views()
            .into_iter()
            .map(|view| (view.farm.clone(), view))
            .collect();
        InfoResponse {
            farms,
            config: self.runtime.clone(),
        }
    }
}

impl fmt::Debug for ApiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiState")
            .field("expected_farms", &self.expected_farms)
            .field("runtime", &self.runtime)
            .finish_non_exhaustive()
    }
}

/// Handle to the running API server.
#[derive(Debug)]
pub struct ApiServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl ApiServer {
    /// Address actually bound, which differs from the requested one for port 0.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(err.into()),
        }
    }
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/ready", get(get_ready))
        .route("/metrics", get(get_metrics))
        .route("/info", get(get_info))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Bind `addr` and serve the API on a background task.
pub fn spawn_api_server(state: Arc<ApiState>, addr: SocketAddr) -> Result<ApiServer> {
    let listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind API listener {addr}"))?;
    listener
        .set_nonblocking(true)
        .context("failed to configure API listener as non-blocking")?;
    let addr = listener
        .local_addr()
        .context("failed to read API listener address")?;
    let tcp_listener =
        TcpListener::from_std(listener).context("failed to create tokio listener")?;

    let router = router(state);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        info!(address = %addr, "api server listening");
        if let Err(err) = axum::serve(tcp_listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
        {
            error!(address = %addr, error = %err, "api server exited with error");
            return Err(err.into());
        }
        info!(address = %addr, "api server stopped");
        Ok(())
    });

    Ok(ApiServer {
        addr,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
    /// Seconds since the process started.
    uptime: f64,
}

#[derive(Debug, Serialize)]
struct ReadyResponse {
    status: &'static str,
    farms: Vec<FarmId>,
}

#[derive(Debug, Serialize)]
struct InfoResponse {
    farms: IndexMap<FarmId, FarmView>,
    config: RuntimeInfo,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: &'static str,
    message: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    label: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, label: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            label,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            status: self.label,
            message: self.message,
        });
        (self.status, body).into_response()
    }
}

async fn get_health(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    Json(state.health())
}

async fn get_ready(State(state): State<Arc<ApiState>>) -> Result<Json<ReadyResponse>, ApiError> {
    match state.readiness() {
        Some(farms) => Ok(Json(ReadyResponse {
            status: "ready",
            farms,
        })),
        None => Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "not ready",
            "Farm data not loaded yet",
        )),
    }
}

async fn get_metrics(State(state): State<Arc<ApiState>>) -> Result<Response, ApiError> {
    let body = state.metrics.render().map_err(|err| {
        error!(error = %err, "failed to generate metrics");
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "error",
            "Error generating metrics",
        )
    })?;
    let content_type = state.metrics.content_type();
    Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
}

async fn get_info(State(state): State<Arc<ApiState>>) -> Json<InfoResponse> {
    Json(state.info())
}
