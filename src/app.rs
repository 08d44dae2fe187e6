//! Application wiring
//!
//! Builds the shared state from an [`AppConfig`], starts the acquisition
//! thread and the optional simulated trigger, and hands the server state
//! back to the caller.

use crate::config::AppConfig;
use laserscope_core::acquisition::engine::{AcquisitionConfig, AcquisitionError};
use laserscope_core::hardware::{
    spawn_periodic_trigger, LoggingActuator, LoggingOutputPins, SimulatedSensor,
    TriggerSourceHandle,
};
use laserscope_core::{
    Acquisition, AcquisitionHandle, Broadcaster, Clock, MonotonicClock, OutputControls,
    SettingsNegotiator, TriggerLatch,
};
use laserscope_server::{AppState, ServerConfig};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error("Failed to start trigger source: {0}")]
    TriggerSource(#[source] std::io::Error),
}

/// A running scope: acquisition thread plus the state the server needs
pub struct Scope {
    state: AppState,
    actuator: Arc<LoggingActuator>,
    trigger: Arc<TriggerLatch>,
    acquisition: AcquisitionHandle,
    trigger_source: Option<TriggerSourceHandle>,
}

impl Scope {
    /// Start acquisition on the monotonic clock with the simulated sensor
    pub fn start(config: &AppConfig) -> Result<Self, ScopeError> {
        let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
        let settings = Arc::new(SettingsNegotiator::new(
            config.resolution_ms(),
            config.duration_ms(),
        ));
        let trigger = Arc::new(TriggerLatch::new());
        let actuator = Arc::new(LoggingActuator::new(
            laserscope_core::ACTUATOR_STARTUP_VALUE,
        ));
        let broadcaster = Arc::new(Broadcaster::new(actuator.clone()));
        let outputs = Arc::new(OutputControls::new(Arc::new(LoggingOutputPins)));

        let acquisition = Acquisition::new(
            Arc::clone(&clock),
            Box::new(SimulatedSensor::new(Arc::clone(&clock))),
            Arc::clone(&settings),
            Arc::clone(&trigger),
            Arc::clone(&broadcaster),
            AcquisitionConfig {
                buffer_size: config.buffer_size,
                ..Default::default()
            },
        );
        let acquisition = AcquisitionHandle::spawn(acquisition)?;

        let trigger_source = match config.simulated_trigger_period_ms {
            Some(period_ms) if period_ms > 0 => Some(
                spawn_periodic_trigger(
                    Arc::clone(&trigger),
                    Arc::clone(&clock),
                    Duration::from_millis(period_ms),
                )
                .map_err(ScopeError::TriggerSource)?,
            ),
            _ => None,
        };

        let server_config = ServerConfig {
            port: config.port,
            bind_addr: config.bind_addr.clone(),
            observer_queue: config.observer_queue,
        };
        let state = AppState::new(
            config.name.as_str(),
            settings,
            broadcaster,
            outputs,
            server_config,
        );

        tracing::info!(
            name = %config.name,
            resolution_ms = config.resolution_ms(),
            duration_ms = config.duration_ms(),
            buffer_size = config.buffer_size,
            "Scope started"
        );

        Ok(Self {
            state,
            actuator,
            trigger,
            acquisition,
            trigger_source,
        })
    }

    /// State to hand to the web server
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// The analog output driven by observers
    pub fn actuator(&self) -> &Arc<LoggingActuator> {
        &self.actuator
    }

    /// The trigger latch, for wiring an external edge source
    pub fn trigger(&self) -> &Arc<TriggerLatch> {
        &self.trigger
    }

    /// Check if the acquisition thread is still running
    pub fn is_running(&self) -> bool {
        self.acquisition.is_alive()
    }

    /// Stop the trigger source and the acquisition thread
    pub fn shutdown(mut self) {
        if let Some(mut source) = self.trigger_source.take() {
            source.stop();
        }
        self.acquisition.stop();
        tracing::info!("Scope stopped");
    }
}
