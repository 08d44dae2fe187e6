//! Standalone test server for E2E testing
//!
//! Starts the Axum server and a real acquisition loop fed by the simulated
//! sensor, so the whole observer protocol can be exercised without a board.

use laserscope_core::acquisition::engine::AcquisitionConfig;
use laserscope_core::hardware::{LoggingActuator, LoggingOutputPins, SimulatedSensor};
use laserscope_core::{
    Acquisition, AcquisitionHandle, Broadcaster, Clock, MonotonicClock, OutputControls,
    SettingsNegotiator, TriggerLatch,
};
use laserscope_server::{AppState, ServerConfig};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("laserscope=debug".parse().unwrap()),
        )
        .init();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8920u16);

    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let settings = Arc::new(SettingsNegotiator::default());
    let trigger = Arc::new(TriggerLatch::new());
    let actuator = Arc::new(LoggingActuator::new(laserscope_core::ACTUATOR_STARTUP_VALUE));
    let broadcaster = Arc::new(Broadcaster::new(actuator));
    let outputs = Arc::new(OutputControls::new(Arc::new(LoggingOutputPins)));

    let acquisition = Acquisition::new(
        Arc::clone(&clock),
        Box::new(SimulatedSensor::new(Arc::clone(&clock))),
        Arc::clone(&settings),
        trigger,
        Arc::clone(&broadcaster),
        AcquisitionConfig::default(),
    );
    let _acquisition = match AcquisitionHandle::spawn(acquisition) {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!("Acquisition error: {}", e);
            std::process::exit(1);
        }
    };

    let config = ServerConfig {
        port,
        bind_addr: "127.0.0.1".to_string(),
        ..Default::default()
    };
    let state = AppState::new("test-server", settings, broadcaster, outputs, config);

    tracing::info!(port, "Test server starting");

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    if let Err(e) = laserscope_server::start_server(state, shutdown).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
