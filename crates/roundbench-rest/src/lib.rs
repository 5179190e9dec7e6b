//! Signed REST client for the roundbench harness.
//!
//! Builds authenticated requests against the venue's REST API:
//! - `ApiCredentials` / `KeySource`: key material loading
//! - `RequestSigner`: HMAC-SHA256 over the canonical query string
//! - `TimestampGenerator`: strictly increasing request timestamps
//! - `SignedClient`: send, error classification, listen key lifecycle

pub mod client;
pub mod credentials;
pub mod error;
pub mod signer;
pub mod timestamp;

pub use client::{SignedClient, TimedResponse, LISTEN_KEY_PATH, ORDER_PATH};
pub use credentials::{ApiCredentials, KeySource};
pub use error::{RestError, RestResult};
pub use reqwest::Method;
pub use signer::RequestSigner;
pub use timestamp::{Clock, SystemClock, TimestampGenerator};
