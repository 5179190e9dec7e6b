//! Round-trip latency harness.
//!
//! Orchestrates one measured run:
//! - Open the user data stream before any action is sent
//! - Place a resting order and wait for its `NEW` confirmation
//! - Cancel it and wait for its `CANCELED` confirmation
//! - Emit the checkpoint record, complete or partial

pub mod app;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod report;
pub mod venue;

pub use app::Application;
pub use config::AppConfig;
pub use coordinator::{RoundTrip, RoundTripConfig, RunState};
pub use error::{AppError, AppResult};
pub use report::{FailureKind, RunFailure, RunReport, RunStats, RunStatus};
pub use venue::{BoxFuture, LiveVenue, MockVenue, Venue};
