//! Laserscope Core - sampling loop, packet assembly and settings negotiation
//!
//! This library implements the acquisition side of the remote laser
//! oscilloscope: a single cooperative polling loop samples an analog input,
//! assembles fixed-duration packets and hands them to a broadcaster that
//! streams them to connected observers. Triggers are latched from a separate
//! edge context and sampling settings are negotiated asynchronously, taking
//! effect at packet boundaries.

pub mod acquisition;
pub mod clock;
pub mod hardware;
pub mod outputs;
pub mod stream;

pub use acquisition::engine::{Acquisition, AcquisitionHandle};
pub use acquisition::settings::{SettingsNegotiator, SettingsSnapshot};
pub use acquisition::trigger::TriggerLatch;
pub use clock::{Clock, Micros, MonotonicClock};
pub use outputs::{OutputChannel, OutputControls};
pub use stream::broadcaster::Broadcaster;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (YYYY-MM-DD), set by build.rs
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Maximum number of samples in one packet
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Default sample spacing in milliseconds when none is configured
pub const DEFAULT_RESOLUTION_MS: f64 = 2.0;

/// Default packet duration in milliseconds when none is configured
pub const DEFAULT_DURATION_MS: f64 = 60.0;

/// Value written to the actuator at startup (full scale)
pub const ACTUATOR_STARTUP_VALUE: u8 = 255;
