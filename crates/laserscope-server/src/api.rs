//! HTTP command endpoints
//!
//! Paths and JSON shapes match what the scope's web page already uses.

use crate::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Json, Redirect};
use axum::routing::{post, MethodRouter};
use laserscope_core::outputs::OutputChannel;
use laserscope_core::SettingsSnapshot;
use serde::{Deserialize, Serialize};

/// Status response
#[derive(Serialize)]
pub struct StatusResponse {
    pub name: String,
    pub slow: bool,
    pub fast: bool,
    pub version: String,
    pub build_date: String,
    pub uptime_seconds: u64,
    /// Connected observers
    pub observers: usize,
    /// Packets delivered to at least one observer
    pub packets_delivered: u64,
    /// Packets no observer could accept
    pub packets_dropped: u64,
}

/// Settings update request; absent fields count as zero and get clamped
#[derive(Debug, Deserialize)]
pub struct SampleSettingsRequest {
    #[serde(default)]
    pub resolution: f64,
    #[serde(default)]
    pub duration: f64,
}

/// GET /status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let uptime = (chrono::Utc::now() - state.started_at).num_seconds().max(0) as u64;
    Json(StatusResponse {
        name: state.name.to_string(),
        slow: state.outputs.is_enabled(OutputChannel::Slow),
        fast: state.outputs.is_enabled(OutputChannel::Fast),
        version: laserscope_core::VERSION.to_string(),
        build_date: laserscope_core::BUILD_DATE.to_string(),
        uptime_seconds: uptime,
        observers: state.broadcaster.observer_count(),
        packets_delivered: state.broadcaster.packets_delivered(),
        packets_dropped: state.broadcaster.packets_dropped(),
    })
}

/// POST route driving one output channel high or low
pub fn output_route(channel: OutputChannel, high: bool) -> MethodRouter<AppState> {
    post(move |State(state): State<AppState>| async move {
        if high {
            state.outputs.enable(channel);
        } else {
            state.outputs.disable(channel);
        }
        StatusCode::OK
    })
}

/// GET /get_sample_settings
pub async fn get_sample_settings(State(state): State<AppState>) -> Json<SettingsSnapshot> {
    Json(state.settings.current())
}

/// POST /set_sample_settings
///
/// Applies the request and redirects to the settings query. The reply shows
/// the new duration at once; the new resolution appears after the current
/// packet completes.
pub async fn set_sample_settings(
    State(state): State<AppState>,
    Json(request): Json<SampleSettingsRequest>,
) -> Redirect {
    state
        .settings
        .request_settings(request.resolution, request.duration);
    Redirect::to("/get_sample_settings")
}
