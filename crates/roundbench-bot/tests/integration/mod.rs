//! Integration tests for roundbench-bot.
//!
//! These tests drive full runs over real sockets:
//! - Signed REST requests against an in-process venue
//! - Push confirmations over a WebSocket user stream
//! - Failure paths ending in a partial record

pub mod common;
