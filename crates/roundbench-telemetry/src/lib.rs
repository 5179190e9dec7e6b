//! Prometheus metrics and structured logging for roundbench.
//!
//! - Structured logging with tracing, on stderr so stdout carries only the
//!   run record
//! - Prometheus counters and histograms for runs, phases, REST calls and
//!   push decoding

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
