use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::put;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::adapter::Adapter;
use crate::adapter::PairingError;
use crate::adapter::SyncError;
use crate::engine::Engine;

/// Response for the /v1/ping endpoint
#[derive(Serialize)]
struct PingResponse {
    status: String,
}

/// Response for the /v1/info endpoint
#[derive(Serialize)]
struct InfoResponse {
    version: String,
    hostname: String,
    adapter: String,
    pairing: bool,
}

/// Response for a property write
#[derive(Serialize)]
struct WriteResponse {
    /// Value cached right now; the device may still override it
    value: Value,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Body of POST /v1/pairing
#[derive(Debug, Default, Deserialize)]
struct PairingRequest {
    timeout_secs: Option<u64>,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub version: &'static str,
    pub adapter: Arc<Adapter>,
    pub engine: Arc<Engine>,
}

fn error_response(status: StatusCode, error: impl ToString) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

/// Handler for GET /v1/ping
#[tracing::instrument]
async fn ping() -> impl IntoResponse {
    tracing::debug!("Handling /v1/ping request");
    (
        StatusCode::OK,
        Json(PingResponse {
            status: "ok".to_string(),
        }),
    )
}

/// Handler for GET /v1/info
#[tracing::instrument(skip(state))]
async fn info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::debug!("Handling /v1/info request");

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    (
        StatusCode::OK,
        Json(InfoResponse {
            version: state.version.to_string(),
            hostname,
            adapter: state.adapter.name().to_string(),
            pairing: state.adapter.is_pairing(),
        }),
    )
}

/// Handler for GET /v1/devices
#[tracing::instrument(skip(state))]
async fn devices(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.engine.state_snapshot();
    (StatusCode::OK, Json(snapshot.as_ref().clone()))
}

/// Handler for PUT /v1/devices/:id/properties/:name
#[tracing::instrument(skip(state))]
async fn write_property(
    State(state): State<Arc<AppState>>,
    Path((device_id, name)): Path<(String, String)>,
    Json(value): Json<Value>,
) -> Response {
    match state.adapter.set_property(&device_id, &name, value).await {
        Ok(value) => (StatusCode::OK, Json(WriteResponse { value })).into_response(),
        Err(e @ (SyncError::UnknownDevice(_) | SyncError::UnknownProperty { .. })) => {
            error_response(StatusCode::NOT_FOUND, e)
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

/// Handler for POST /v1/pairing
#[tracing::instrument(skip(state))]
async fn start_pairing(
    State(state): State<Arc<AppState>>,
    body: Option<Json<PairingRequest>>,
) -> Response {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let timeout = request
        .timeout_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| state.adapter.pairing_timeout());

    match state.adapter.start_pairing(timeout) {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e @ PairingError::AlreadyPairing) => error_response(StatusCode::CONFLICT, e),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

/// Handler for DELETE /v1/pairing
#[tracing::instrument(skip(state))]
async fn cancel_pairing(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.adapter.cancel_pairing();
    StatusCode::NO_CONTENT
}

/// Create the API router with all endpoints
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/ping", get(ping))
        .route("/v1/info", get(info))
        .route("/v1/devices", get(devices))
        .route("/v1/devices/:id/properties/:name", put(write_property))
        .route(
            "/v1/pairing",
            axum::routing::post(start_pairing).delete(cancel_pairing),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP API server
///
/// Binds to `listen:port` and serves until `shutdown_rx` fires.
pub async fn serve(
    listen: String,
    port: u16,
    state: Arc<AppState>,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> anyhow::Result<()> {
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", listen, port).parse()?;
    tracing::info!("Starting HTTP API server on {}", addr);

    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            tracing::info!("HTTP API server shutting down gracefully");
        })
        .await?;

    Ok(())
}
