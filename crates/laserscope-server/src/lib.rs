//! Laserscope Web Server - Axum HTTP + WebSocket
//!
//! Exposes the acquisition core to remote observers: packets stream out over
//! `/ws`, single-byte actuator values stream in on the same socket, and a
//! small set of HTTP endpoints report status and negotiate sampling settings.

pub mod api;
pub mod ws;

use axum::http::{header, HeaderValue, StatusCode, Uri};
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use laserscope_core::outputs::OutputChannel;
use laserscope_core::{Broadcaster, OutputControls, SettingsNegotiator};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;

/// Shared application state accessible from all handlers
#[derive(Clone)]
pub struct AppState {
    /// Display name reported by `/status`
    pub name: Arc<str>,
    /// Sampling settings shared with the acquisition loop
    pub settings: Arc<SettingsNegotiator>,
    /// Observer registry shared with the acquisition loop
    pub broadcaster: Arc<Broadcaster>,
    /// The two output channels
    pub outputs: Arc<OutputControls>,
    /// Server configuration
    pub config: ServerConfig,
    /// Process start, for uptime
    pub started_at: DateTime<Utc>,
}

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Bind address
    pub bind_addr: String,
    /// Packets that may wait for one slow observer before it starts missing packets
    pub observer_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 80,
            bind_addr: "0.0.0.0".to_string(),
            observer_queue: 4,
        }
    }
}

impl AppState {
    pub fn new(
        name: impl Into<Arc<str>>,
        settings: Arc<SettingsNegotiator>,
        broadcaster: Arc<Broadcaster>,
        outputs: Arc<OutputControls>,
        config: ServerConfig,
    ) -> Self {
        Self {
            name: name.into(),
            settings,
            broadcaster,
            outputs,
            config,
            started_at: Utc::now(),
        }
    }
}

async fn not_found(uri: Uri) -> StatusCode {
    tracing::debug!(%uri, "Requested page not found");
    StatusCode::NOT_FOUND
}

/// Build the Axum router with all routes
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(api::get_status))
        .route("/enable_slow", api::output_route(OutputChannel::Slow, true))
        .route("/enable_fast", api::output_route(OutputChannel::Fast, true))
        .route("/disable_slow", api::output_route(OutputChannel::Slow, false))
        .route("/disable_fast", api::output_route(OutputChannel::Fast, false))
        .route("/get_sample_settings", get(api::get_sample_settings))
        .route("/set_sample_settings", post(api::set_sample_settings))
        // Observer channel
        .route("/ws", get(ws::ws_handler))
        .fallback(not_found)
        .layer(CorsLayer::permissive())
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .with_state(state)
}

/// Serve on an already bound listener until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Bind to the configured address and serve until `shutdown` resolves
pub async fn start_server<F>(state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("{}:{}", state.config.bind_addr, state.config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Laserscope web server listening");

    serve(listener, state, shutdown).await
}
