//! Core domain types for the roundbench harness.
//!
//! This crate provides the types shared by every component of a run:
//! - `Action`: the place/cancel commands sent to the venue
//! - `ConfirmationEvent`: decoded push notifications correlated to actions
//! - `TimingRecorder` / `TimingSnapshot`: the append-only checkpoint record
//! - `OrderSide`, `OrderType`, `TimeInForce`, `ClientOrderId`: order vocabulary

pub mod action;
pub mod error;
pub mod event;
pub mod order;
pub mod timing;

pub use action::{Action, ActionKind, OrderSpec};
pub use error::{CoreError, CoreResult};
pub use event::{ConfirmationEvent, ExecutionType, ORDER_TRADE_UPDATE};
pub use order::{ClientOrderId, OrderSide, OrderType, TimeInForce};
pub use timing::{Checkpoint, Interval, Phase, TimingRecorder, TimingSnapshot};
