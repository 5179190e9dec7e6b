//! Place and cancel actions.
//!
//! An `Action` knows its own request parameters in the exact order the venue
//! signs them. The request timestamp is not part of the action: the signed
//! client appends it (and the signature) at send time.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, CoreResult};
use crate::order::{ClientOrderId, OrderSide, OrderType, TimeInForce};

/// Which leg of the round trip an action belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Place,
    Cancel,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Place => write!(f, "place"),
            Self::Cancel => write!(f, "cancel"),
        }
    }
}

/// The resting order a run places and then cancels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSpec {
    /// Venue symbol (e.g., "BTCUSDT").
    pub symbol: String,
    pub side: OrderSide,
    #[serde(default)]
    pub order_type: OrderType,
    #[serde(default)]
    pub time_in_force: TimeInForce,
    pub quantity: Decimal,
    pub price: Decimal,
}

impl OrderSpec {
    /// Check the order can be sent as-is.
    pub fn validate(&self) -> CoreResult<()> {
        if self.symbol.is_empty() {
            return Err(CoreError::InvalidOrder("symbol is empty".to_string()));
        }
        // Sent unescaped in the signed query string.
        if !self
            .symbol
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        {
            return Err(CoreError::InvalidOrder(format!(
                "symbol must be uppercase letters and digits, got {:?}",
                self.symbol
            )));
        }
        if self.quantity <= Decimal::ZERO {
            return Err(CoreError::InvalidOrder(format!(
                "quantity must be positive, got {}",
                self.quantity
            )));
        }
        if self.price <= Decimal::ZERO {
            return Err(CoreError::InvalidOrder(format!(
                "price must be positive, got {}",
                self.price
            )));
        }
        Ok(())
    }
}

/// A command sent through the signed request channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Place {
        order: OrderSpec,
        client_order_id: ClientOrderId,
        recv_window_ms: u64,
    },
    Cancel {
        symbol: String,
        client_order_id: ClientOrderId,
        recv_window_ms: u64,
    },
}

impl Action {
    /// Build a place action after validating the order.
    pub fn place(
        order: OrderSpec,
        client_order_id: ClientOrderId,
        recv_window_ms: u64,
    ) -> CoreResult<Self> {
        order.validate()?;
        Ok(Self::Place {
            order,
            client_order_id,
            recv_window_ms,
        })
    }

    /// Derive the cancel for this place action.
    ///
    /// Returns `None` for a cancel: a cancel can only ever target the
    /// identifier of a place issued earlier in the same run.
    pub fn cancel_for(&self, recv_window_ms: u64) -> Option<Self> {
        match self {
            Self::Place {
                order,
                client_order_id,
                ..
            } => Some(Self::Cancel {
                symbol: order.symbol.clone(),
                client_order_id: client_order_id.clone(),
                recv_window_ms,
            }),
            Self::Cancel { .. } => None,
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Place { .. } => ActionKind::Place,
            Self::Cancel { .. } => ActionKind::Cancel,
        }
    }

    /// Correlation identifier carried by the push confirmation.
    pub fn client_order_id(&self) -> &ClientOrderId {
        match self {
            Self::Place {
                client_order_id, ..
            }
            | Self::Cancel {
                client_order_id, ..
            } => client_order_id,
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            Self::Place { order, .. } => &order.symbol,
            Self::Cancel { symbol, .. } => symbol,
        }
    }

    pub fn recv_window_ms(&self) -> u64 {
        match self {
            Self::Place { recv_window_ms, .. } | Self::Cancel { recv_window_ms, .. } => {
                *recv_window_ms
            }
        }
    }

    /// Request parameters in signing order, without `timestamp`.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::Place {
                order,
                client_order_id,
                recv_window_ms,
            } => vec![
                ("symbol", order.symbol.clone()),
                ("side", order.side.as_str().to_string()),
                ("type", order.order_type.as_str().to_string()),
                ("timeInForce", order.time_in_force.as_str().to_string()),
                ("newClientOrderId", client_order_id.to_string()),
                ("quantity", order.quantity.normalize().to_string()),
                ("price", order.price.normalize().to_string()),
                ("recvWindow", recv_window_ms.to_string()),
            ],
            Self::Cancel {
                symbol,
                client_order_id,
                recv_window_ms,
            } => vec![
                ("symbol", symbol.clone()),
                ("origClientOrderId", client_order_id.to_string()),
                ("recvWindow", recv_window_ms.to_string()),
            ],
        }
    }
}
