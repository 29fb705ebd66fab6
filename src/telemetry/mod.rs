//! Telemetry module for logging and decoder statistics.

mod logging;
mod metrics;

pub use logging::init_logging;
pub use metrics::{Counter, DecoderStats};
