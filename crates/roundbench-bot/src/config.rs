//! Application configuration.

use std::path::Path;
use std::time::Duration;

use roundbench_core::{
    Action, ClientOrderId, OrderSide, OrderSpec, OrderType, TimeInForce,
};
use roundbench_rest::KeySource;
use roundbench_ws::SessionConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::coordinator::RoundTripConfig;
use crate::error::{AppError, AppResult};

/// Default config path when neither `--config` nor `ROUNDBENCH_CONFIG` is set.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// The order placed and then cancelled by a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderConfig {
    #[serde(default = "default_symbol")]
    pub symbol: String,
    #[serde(default = "default_side")]
    pub side: OrderSide,
    #[serde(default)]
    pub time_in_force: TimeInForce,
    /// Order size, as a decimal string.
    #[serde(default = "default_quantity")]
    pub quantity: Decimal,
    /// Limit price; far from the market so the order rests.
    #[serde(default = "default_price")]
    pub price: Decimal,
    /// Fixed correlation id. Generated per run when absent.
    #[serde(default)]
    pub client_order_id: Option<String>,
    /// recvWindow of the place request (ms).
    #[serde(default = "default_place_recv_window_ms")]
    pub place_recv_window_ms: u64,
    /// recvWindow of the cancel request (ms).
    #[serde(default = "default_cancel_recv_window_ms")]
    pub cancel_recv_window_ms: u64,
}

fn default_symbol() -> String {
    "BTCUSDT".to_string()
}

fn default_side() -> OrderSide {
    OrderSide::Buy
}

fn default_quantity() -> Decimal {
    Decimal::new(1, 3)
}

fn default_price() -> Decimal {
    Decimal::new(20_000, 0)
}

fn default_place_recv_window_ms() -> u64 {
    5_000
}

fn default_cancel_recv_window_ms() -> u64 {
    50_000
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            side: default_side(),
            time_in_force: TimeInForce::default(),
            quantity: default_quantity(),
            price: default_price(),
            client_order_id: None,
            place_recv_window_ms: default_place_recv_window_ms(),
            cancel_recv_window_ms: default_cancel_recv_window_ms(),
        }
    }
}

/// Per-step time bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadlineConfig {
    /// Listen key plus stream connect (ms).
    #[serde(default = "default_session_open_timeout_ms")]
    pub session_open_timeout_ms: u64,
    /// From each ack to its push confirmation (ms).
    #[serde(default = "default_confirm_timeout_ms")]
    pub confirm_timeout_ms: u64,
    /// HTTP request timeout (ms).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_session_open_timeout_ms() -> u64 {
    10_000
}

fn default_confirm_timeout_ms() -> u64 {
    10_000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self {
            session_open_timeout_ms: default_session_open_timeout_ms(),
            confirm_timeout_ms: default_confirm_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Push session configuration subset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsConfig {
    /// Capacity of the listener-to-coordinator queue.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_event_buffer() -> usize {
    64
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            event_buffer: default_event_buffer(),
        }
    }
}

/// Where API credentials are read from.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default = "default_api_key_source")]
    pub api_key: KeySource,
    #[serde(default = "default_api_secret_source")]
    pub api_secret: KeySource,
}

fn default_api_key_source() -> KeySource {
    KeySource::env("BINANCE_KEY")
}

fn default_api_secret_source() -> KeySource {
    KeySource::env("BINANCE_SECRET")
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            api_key: default_api_key_source(),
            api_secret: default_api_secret_source(),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// REST origin.
    #[serde(default = "default_rest_url")]
    pub rest_url: String,
    /// User data stream base URL.
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    #[serde(default)]
    pub order: OrderConfig,
    #[serde(default)]
    pub deadlines: DeadlineConfig,
    #[serde(default)]
    pub websocket: WsConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

fn default_rest_url() -> String {
    "https://fapi.binance.com".to_string()
}

fn default_ws_url() -> String {
    "wss://fstream.binance.com/ws".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rest_url: default_rest_url(),
            ws_url: default_ws_url(),
            order: OrderConfig::default(),
            deadlines: DeadlineConfig::default(),
            websocket: WsConfig::default(),
            credentials: CredentialsConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config {path}: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load from an explicit path, or from the default path if it exists.
    ///
    /// An explicit path must exist. A missing default file falls back to
    /// built-in defaults.
    pub fn load(explicit_path: Option<&str>) -> AppResult<Self> {
        match explicit_path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::from_file(DEFAULT_CONFIG_PATH),
            None => {
                tracing::warn!(path = DEFAULT_CONFIG_PATH, "Config file not found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Apply command-line overrides.
    pub fn apply_overrides(
        &mut self,
        symbol: Option<String>,
        client_order_id: Option<String>,
        confirm_timeout_ms: Option<u64>,
    ) {
        if let Some(symbol) = symbol {
            self.order.symbol = symbol;
        }
        if let Some(id) = client_order_id {
            self.order.client_order_id = Some(id);
        }
        if let Some(ms) = confirm_timeout_ms {
            self.deadlines.confirm_timeout_ms = ms;
        }
    }

    /// Check values that would otherwise fail mid-run.
    pub fn validate(&self) -> AppResult<()> {
        if self.deadlines.confirm_timeout_ms == 0 {
            return Err(AppError::Config(
                "deadlines.confirm_timeout_ms must be positive".to_string(),
            ));
        }
        if self.deadlines.session_open_timeout_ms == 0 {
            return Err(AppError::Config(
                "deadlines.session_open_timeout_ms must be positive".to_string(),
            ));
        }
        if self.websocket.event_buffer == 0 {
            return Err(AppError::Config(
                "websocket.event_buffer must be positive".to_string(),
            ));
        }
        self.place_action()?;
        Ok(())
    }

    /// Build the place action of a run.
    pub fn place_action(&self) -> AppResult<Action> {
        let client_order_id = match &self.order.client_order_id {
            Some(id) => ClientOrderId::parse(id.as_str())?,
            None => ClientOrderId::new(),
        };
        let order = OrderSpec {
            symbol: self.order.symbol.clone(),
            side: self.order.side,
            order_type: OrderType::Limit,
            time_in_force: self.order.time_in_force,
            quantity: self.order.quantity,
            price: self.order.price,
        };
        Ok(Action::place(
            order,
            client_order_id,
            self.order.place_recv_window_ms,
        )?)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            ws_url: self.ws_url.clone(),
            event_buffer: self.websocket.event_buffer,
        }
    }

    pub fn round_trip_config(&self) -> RoundTripConfig {
        RoundTripConfig {
            session_open_timeout: Duration::from_millis(self.deadlines.session_open_timeout_ms),
            confirm_timeout: Duration::from_millis(self.deadlines.confirm_timeout_ms),
            cancel_recv_window_ms: self.order.cancel_recv_window_ms,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.deadlines.request_timeout_ms)
    }
}
