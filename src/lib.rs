//! Laserscope - networked oscilloscope for laser scan diagnostics
//!
//! This library re-exports the acquisition core from `laserscope-core`
//! and adds the application layer: persistent configuration and the
//! wiring that connects the sampling loop to the web server.

pub mod app;
pub mod config;

pub use laserscope_core::acquisition;
pub use laserscope_core::clock;
pub use laserscope_core::hardware;
pub use laserscope_core::outputs;
pub use laserscope_core::stream;

pub use laserscope_core::{
    Acquisition, AcquisitionHandle, Broadcaster, Clock, Micros, MonotonicClock, OutputChannel,
    OutputControls, SettingsNegotiator, SettingsSnapshot, TriggerLatch,
};
pub use laserscope_core::{BUILD_DATE, DEFAULT_DURATION_MS, DEFAULT_RESOLUTION_MS, VERSION};

pub use app::{Scope, ScopeError};
pub use config::AppConfig;
