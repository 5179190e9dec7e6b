//! User data stream session for the roundbench harness.
//!
//! Provides the push side of a run:
//! - Listen key acquisition and WebSocket connect (TCP_NODELAY)
//! - A background listener that answers pings and decodes order updates
//! - A bounded, ordered queue of confirmation events for a single consumer

pub mod error;
pub mod message;
pub mod session;

pub use error::{WsError, WsResult};
pub use message::{decode_user_stream, Decoded, LISTEN_KEY_EXPIRED};
pub use session::{PushSession, SessionConfig, SessionFeed};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any connection is made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
