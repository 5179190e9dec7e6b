//! Shared helpers for integration tests.

pub mod mock_venue;
