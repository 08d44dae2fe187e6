//! Acquisition module
//!
//! This module contains the sampling side of the scope:
//! - Trigger edge latching ([`trigger`])
//! - Sample and packet-completion scheduling ([`scheduler`])
//! - Fixed-capacity packet storage ([`buffer`])
//! - Deferred sampling settings ([`settings`])
//! - The polling loop tying them together ([`engine`])

pub mod buffer;
pub mod engine;
pub mod scheduler;
pub mod settings;
pub mod trigger;
