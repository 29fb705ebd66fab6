//! heptap - VoIP capture decoder
//!
//! Turns raw captured frames into classified records: tunnels (GRE, ERSPAN,
//! VXLAN) are unwrapped, IP fragments reassembled, and payloads tagged as
//! SIP, RTCP, DNS or correlated syslog before they go to the output queue.

pub mod capture;
pub mod config;
pub mod correlation;
pub mod decoder;
pub mod error;
pub mod protocol;
pub mod queue;
pub mod record;
pub mod telemetry;

pub use error::{Error, Result};
