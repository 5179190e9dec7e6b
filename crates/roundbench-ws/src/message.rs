//! User data stream message decoding.
//!
//! Only order updates and listen key expiry matter to a run. Everything else
//! is dropped without counting; order updates that fail to parse are reported
//! as `Malformed` so the listener can count them.

use std::time::Instant;

use roundbench_core::{ClientOrderId, ConfirmationEvent, ExecutionType, ORDER_TRADE_UPDATE};
use serde::Deserialize;
use serde_json::Value;

/// Event type sent when the listen key is no longer valid.
pub const LISTEN_KEY_EXPIRED: &str = "listenKeyExpired";

/// Outcome of decoding one text frame.
#[derive(Debug, Clone)]
pub enum Decoded {
    Confirmation(ConfirmationEvent),
    ListenKeyExpired,
    /// No `e` field, or an event type the harness does not track.
    Ignored,
    /// Not JSON, or an order update missing required fields.
    Malformed(String),
}

/// Order payload (`o`) of an `ORDER_TRADE_UPDATE`.
#[derive(Debug, Deserialize)]
struct RawOrderUpdate {
    /// Symbol.
    s: String,
    /// Client order id.
    c: String,
    /// Execution type.
    x: String,
    /// Venue order id.
    #[serde(default)]
    i: Option<u64>,
}

/// Decode a text frame read at `received_at`.
pub fn decode_user_stream(text: &str, received_at: Instant) -> Decoded {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => return Decoded::Malformed(format!("invalid JSON: {e}")),
    };

    let Some(event_type) = value.get("e").and_then(Value::as_str) else {
        return Decoded::Ignored;
    };

    match event_type {
        ORDER_TRADE_UPDATE => {}
        LISTEN_KEY_EXPIRED => return Decoded::ListenKeyExpired,
        _ => return Decoded::Ignored,
    }

    let Some(order) = value.get("o") else {
        return Decoded::Malformed("order update without `o`".to_string());
    };
    let raw: RawOrderUpdate = match RawOrderUpdate::deserialize(order) {
        Ok(raw) => raw,
        Err(e) => return Decoded::Malformed(format!("invalid order update: {e}")),
    };

    Decoded::Confirmation(ConfirmationEvent {
        event_type: event_type.to_string(),
        execution: ExecutionType::from(raw.x.as_str()),
        client_order_id: ClientOrderId::from_string(raw.c),
        symbol: raw.s,
        order_id: raw.i,
        event_time_ms: value.get("E").and_then(Value::as_i64),
        received_at,
    })
}
