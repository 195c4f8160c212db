//! HTTP server for feeding live keystroke timings into the analyzer.
//!
//! This module provides an HTTP server that:
//! - Accepts batches of microsecond timestamps via POST /ingest
//! - Serves the current analysis state via GET /snapshot
//! - Retunes the bin rate of the live analyzer via POST /bin-rate
//!
//! # Architecture
//!
//! ```text
//! Capture tool ──→ POST /ingest ──→ Analyzer ──→ GET /snapshot ──→ dashboard
//!                                       ↓
//!                               [Spectral rounds]
//! ```

use crate::engine::{Analyzer, AnalyzerSnapshot};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
    /// Bin rate for the analyzer behind the server
    pub bin_rate: u32,
}

impl ServerConfig {
    /// Create a new server configuration
    pub fn new(port: u16, bin_rate: u32) -> Self {
        Self { port, bin_rate }
    }
}

/// Shared server state
pub struct ServerState {
    /// The analyzer all endpoints feed and read.
    ///
    /// Writers (ingest, bin-rate, reset) are exclusive, so concurrent
    /// batches are applied one at a time in arrival order.
    analyzer: RwLock<Analyzer>,
}

impl ServerState {
    /// Create new server state, or `None` if the bin rate is invalid
    pub fn new(config: &ServerConfig) -> Option<Self> {
        let analyzer = Analyzer::with_bin_rate(config.bin_rate)?;
        Some(Self {
            analyzer: RwLock::new(analyzer),
        })
    }
}

/// Batch of key-press timestamps from a capture tool
#[derive(Debug, Clone, Deserialize)]
pub struct IngestRequest {
    /// Press timestamps in microseconds since recording start
    pub timestamps: Vec<u64>,
}

/// Response from ingest endpoint
#[derive(Debug, Clone, Serialize)]
pub struct IngestResponse {
    pub status: String,
    /// Events from this batch that passed the monotonicity filter
    pub accepted: u64,
    /// Events from this batch that arrived out of order
    pub rejected: u64,
    /// Whether a spectral round is running after this batch
    pub calculating: bool,
}

/// Request to retune the analyzer's bin rate
#[derive(Debug, Clone, Deserialize)]
pub struct BinRateRequest {
    pub bin_rate: u32,
}

/// Response from bin-rate endpoint
#[derive(Debug, Clone, Serialize)]
pub struct BinRateResponse {
    pub status: String,
    pub bin_rate: u32,
    pub interval_us: f64,
}

/// Response from reset endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ResetResponse {
    pub status: String,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /snapshot
async fn snapshot(State(state): State<Arc<ServerState>>) -> Json<AnalyzerSnapshot> {
    let analyzer = state.analyzer.read().await;
    Json(analyzer.snapshot())
}

/// POST /ingest
///
/// Accepts a batch of press timestamps, feeds them to the analyzer, and
/// reports how the batch fared. Out-of-order events are counted, not fatal.
async fn ingest(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<IngestRequest>,
) -> Json<IngestResponse> {
    let mut analyzer = state.analyzer.write().await;
    let accepted_before = analyzer.accepted();
    let rejected_before = analyzer.rejected();

    analyzer.add(&request.timestamps);

    Json(IngestResponse {
        status: "ok".to_string(),
        accepted: analyzer.accepted() - accepted_before,
        rejected: analyzer.rejected() - rejected_before,
        calculating: analyzer.calculating(),
    })
}

/// POST /bin-rate
///
/// Switches the analyzer to a new bin rate, replaying all retained events.
async fn set_bin_rate(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<BinRateRequest>,
) -> Result<Json<BinRateResponse>, (StatusCode, Json<ErrorResponse>)> {
    let mut analyzer = state.analyzer.write().await;
    if !analyzer.set_bin_rate(request.bin_rate) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("Invalid bin rate {}: must be 125 * 2^k", request.bin_rate),
                code: "INVALID_BIN_RATE".to_string(),
            }),
        ));
    }

    Ok(Json(BinRateResponse {
        status: "ok".to_string(),
        bin_rate: analyzer.bin_rate(),
        interval_us: analyzer.interval(),
    }))
}

/// POST /reset
async fn reset(State(state): State<Arc<ServerState>>) -> Json<ResetResponse> {
    let mut analyzer = state.analyzer.write().await;
    analyzer.reset();
    Json(ResetResponse {
        status: "ok".to_string(),
    })
}

/// Run the HTTP server
///
/// Returns the bound address, a shutdown trigger, and the join handle of
/// the serving task so callers can wait out a graceful shutdown.
pub async fn run(
    config: ServerConfig,
) -> anyhow::Result<(
    SocketAddr,
    tokio::sync::oneshot::Sender<()>,
    tokio::task::JoinHandle<()>,
)> {
    let state = Arc::new(
        ServerState::new(&config)
            .ok_or_else(|| anyhow::anyhow!("invalid bin rate: {}", config.bin_rate))?,
    );

    let app = Router::new()
        .route("/health", get(health))
        .route("/snapshot", get(snapshot))
        .route("/ingest", post(ingest))
        .route("/bin-rate", post(set_bin_rate))
        .route("/reset", post(reset))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Jitter analyzer server listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx, handle))
}
