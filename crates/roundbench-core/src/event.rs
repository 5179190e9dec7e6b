//! Confirmation events decoded from the push channel.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

use crate::order::ClientOrderId;

/// Event type of the only push message relevant to a run.
pub const ORDER_TRADE_UPDATE: &str = "ORDER_TRADE_UPDATE";

/// Execution type reported by an order update (`o.x`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionType {
    New,
    Canceled,
    /// Trades, expiries, amendments. Never advances a run.
    Other(String),
}

impl ExecutionType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::New => "NEW",
            Self::Canceled => "CANCELED",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for ExecutionType {
    fn from(s: &str) -> Self {
        match s {
            "NEW" => Self::New,
            "CANCELED" => Self::Canceled,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ExecutionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded order update, consumed once by the coordinator.
#[derive(Debug, Clone)]
pub struct ConfirmationEvent {
    /// Event type (`e`); always `ORDER_TRADE_UPDATE` once decoded.
    pub event_type: String,
    /// Resulting state of the order (`o.x`).
    pub execution: ExecutionType,
    /// Correlation identifier (`o.c`).
    pub client_order_id: ClientOrderId,
    /// Venue symbol (`o.s`).
    pub symbol: String,
    /// Venue-assigned order id (`o.i`).
    pub order_id: Option<u64>,
    /// Venue event time in ms (`E`).
    pub event_time_ms: Option<i64>,
    /// When the listener read the frame off the socket.
    pub received_at: Instant,
}

impl ConfirmationEvent {
    /// True when this event confirms `expected` for the given order.
    pub fn confirms(&self, client_order_id: &ClientOrderId, expected: &ExecutionType) -> bool {
        self.event_type == ORDER_TRADE_UPDATE
            && &self.client_order_id == client_order_id
            && &self.execution == expected
    }
}
