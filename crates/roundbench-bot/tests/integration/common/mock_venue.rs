//! Mock futures venue for integration tests.
//!
//! One axum server plays both channels:
//! - `POST/DELETE /fapi/v1/listenKey` hands out (or mangles) a listen key
//! - `POST/DELETE /fapi/v1/order` checks the API key and HMAC signature,
//!   records the request and schedules the push confirmation
//! - `GET /ws/{listenKey}` streams order updates to connected sessions

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use roundbench_rest::{ApiCredentials, RequestSigner, LISTEN_KEY_PATH, ORDER_PATH};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

pub const MOCK_API_KEY: &str = "mock-key";
pub const MOCK_SECRET: &str = "mock-secret";
pub const MOCK_LISTEN_KEY: &str = "mock-listen-key";

/// Delay between an order ack and its push confirmation.
const CONFIRM_DELAY: Duration = Duration::from_millis(5);

/// What the listen key endpoint returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenKeyMode {
    Valid,
    /// 200 with a body that is not JSON.
    Malformed,
}

/// Behaviour of a mock venue.
#[derive(Debug, Clone)]
pub struct MockVenueConfig {
    pub listen_key: ListenKeyMode,
    pub confirm_place: bool,
    pub confirm_cancel: bool,
}

impl Default for MockVenueConfig {
    fn default() -> Self {
        Self {
            listen_key: ListenKeyMode::Valid,
            confirm_place: true,
            confirm_cancel: true,
        }
    }
}

/// A request seen by the order endpoint.
#[derive(Debug, Clone)]
pub struct RecordedOrder {
    pub method: &'static str,
    pub query: String,
}

impl RecordedOrder {
    pub fn param(&self, name: &str) -> Option<&str> {
        query_param(&self.query, name)
    }
}

struct MockState {
    config: MockVenueConfig,
    signer_credentials: ApiCredentials,
    events: broadcast::Sender<String>,
    orders: Mutex<Vec<RecordedOrder>>,
    listen_keys_closed: AtomicU32,
    stream_connections: AtomicU32,
}

/// A running mock venue.
pub struct MockVenueServer {
    addr: SocketAddr,
    state: Arc<MockState>,
    handle: JoinHandle<()>,
}

impl MockVenueServer {
    /// Start a mock venue on an available port.
    pub async fn start(config: MockVenueConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        let state = Arc::new(MockState {
            config,
            signer_credentials: ApiCredentials::new(MOCK_API_KEY, MOCK_SECRET),
            events,
            orders: Mutex::new(Vec::new()),
            listen_keys_closed: AtomicU32::new(0),
            stream_connections: AtomicU32::new(0),
        });

        let app = Router::new()
            .route(LISTEN_KEY_PATH, post(create_listen_key).delete(close_listen_key))
            .route(ORDER_PATH, post(place_order).delete(cancel_order))
            .route("/ws/{key}", get(user_stream))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn rest_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn orders(&self) -> Vec<RecordedOrder> {
        self.state.orders.lock().clone()
    }

    pub fn listen_keys_closed(&self) -> u32 {
        self.state.listen_keys_closed.load(Ordering::SeqCst)
    }

    pub fn stream_connections(&self) -> u32 {
        self.state.stream_connections.load(Ordering::SeqCst)
    }
}

impl Drop for MockVenueServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn query_param<'a>(query: &'a str, name: &str) -> Option<&'a str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
}

fn error_response(status: StatusCode, code: i64, msg: &str) -> Response {
    (status, Json(json!({"code": code, "msg": msg}))).into_response()
}

fn has_api_key(headers: &HeaderMap) -> bool {
    headers
        .get("X-MBX-APIKEY")
        .and_then(|v| v.to_str().ok())
        == Some(MOCK_API_KEY)
}

async fn create_listen_key(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if !has_api_key(&headers) {
        return error_response(StatusCode::UNAUTHORIZED, -2015, "Invalid API-key");
    }
    match state.config.listen_key {
        ListenKeyMode::Valid => Json(json!({"listenKey": MOCK_LISTEN_KEY})).into_response(),
        ListenKeyMode::Malformed => (StatusCode::OK, "listenKey=oops").into_response(),
    }
}

async fn close_listen_key(State(state): State<Arc<MockState>>) -> Json<Value> {
    state.listen_keys_closed.fetch_add(1, Ordering::SeqCst);
    Json(json!({}))
}

async fn place_order(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    handle_order(&state, "POST", &headers, query.unwrap_or_default())
}

async fn cancel_order(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    handle_order(&state, "DELETE", &headers, query.unwrap_or_default())
}

fn handle_order(
    state: &Arc<MockState>,
    method: &'static str,
    headers: &HeaderMap,
    query: String,
) -> Response {
    state.orders.lock().push(RecordedOrder {
        method,
        query: query.clone(),
    });

    if !has_api_key(headers) {
        return error_response(StatusCode::UNAUTHORIZED, -2015, "Invalid API-key");
    }

    let Some((unsigned, signature)) = query.rsplit_once("&signature=") else {
        return error_response(
            StatusCode::BAD_REQUEST,
            -1102,
            "Mandatory parameter 'signature' was not sent",
        );
    };
    if RequestSigner::new(&state.signer_credentials).sign(unsigned) != signature {
        return error_response(
            StatusCode::BAD_REQUEST,
            -1022,
            "Signature for this request is not valid.",
        );
    }

    let (id_param, execution, confirm) = match method {
        "POST" => ("newClientOrderId", "NEW", state.config.confirm_place),
        _ => ("origClientOrderId", "CANCELED", state.config.confirm_cancel),
    };
    let client_order_id = query_param(unsigned, id_param).unwrap_or_default().to_string();
    let symbol = query_param(unsigned, "symbol").unwrap_or_default().to_string();

    if confirm {
        let events = state.events.clone();
        let frame = order_update(&symbol, &client_order_id, execution);
        let noise = order_update(&symbol, "someone_else", execution);
        tokio::spawn(async move {
            tokio::time::sleep(CONFIRM_DELAY).await;
            let _ = events.send(r#"{"e":"ACCOUNT_UPDATE","E":1,"T":1,"a":{}}"#.to_string());
            let _ = events.send(noise);
            let _ = events.send(frame);
        });
    }

    Json(json!({
        "orderId": 42,
        "symbol": symbol,
        "clientOrderId": client_order_id,
        "status": execution,
    }))
    .into_response()
}

fn order_update(symbol: &str, client_order_id: &str, execution: &str) -> String {
    json!({
        "e": "ORDER_TRADE_UPDATE",
        "E": 1_700_000_000_000_i64,
        "T": 1_700_000_000_000_i64,
        "o": {
            "s": symbol,
            "c": client_order_id,
            "S": "BUY",
            "o": "LIMIT",
            "x": execution,
            "X": execution,
            "i": 42
        }
    })
    .to_string()
}

async fn user_stream(
    ws: WebSocketUpgrade,
    Path(key): Path<String>,
    State(state): State<Arc<MockState>>,
) -> Response {
    if key != MOCK_LISTEN_KEY {
        return StatusCode::NOT_FOUND.into_response();
    }
    state.stream_connections.fetch_add(1, Ordering::SeqCst);
    // Subscribed before the handshake response is sent.
    let events = state.events.subscribe();
    ws.on_upgrade(move |socket| forward_events(socket, events))
}

async fn forward_events(socket: WebSocket, mut events: broadcast::Receiver<String>) {
    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(text) => {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                _ => {}
            },
        }
    }
}
