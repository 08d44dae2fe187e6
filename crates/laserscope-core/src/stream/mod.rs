//! Packet streaming to observers
//!
//! - Completed packets and their wire metadata ([`packet`])
//! - Observer registry, fan-out and inbound control bytes ([`broadcaster`])

pub mod broadcaster;
pub mod packet;
