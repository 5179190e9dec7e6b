//! Signed HTTP client for the venue REST API.
//!
//! Sends place/cancel actions as signed requests and manages the user data
//! stream listen key. Checkpoints around each call belong to the caller; the
//! client only notes when the headers and the body of a response arrived.

use std::time::{Duration, Instant};

use reqwest::{Client, Method, StatusCode};
use roundbench_core::{Action, ActionKind};
use serde_json::Value;
use tracing::{debug, warn};

use crate::credentials::ApiCredentials;
use crate::error::{RestError, RestResult};
use crate::signer::RequestSigner;
use crate::timestamp::{SystemClock, TimestampGenerator};

/// Order placement / cancellation endpoint.
pub const ORDER_PATH: &str = "/fapi/v1/order";
/// User data stream listen key endpoint.
pub const LISTEN_KEY_PATH: &str = "/fapi/v1/listenKey";

const API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// Default timeout for API requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Venue error codes that mean the key or signature was not accepted.
const AUTH_ERROR_CODES: [i64; 3] = [-1022, -2014, -2015];

/// A successful response and when its parts were received.
#[derive(Debug, Clone)]
pub struct TimedResponse {
    pub body: Value,
    /// Status line and headers received.
    pub headers_at: Instant,
    /// Body fully read, before JSON parsing.
    pub body_at: Instant,
}

/// Authenticated REST client.
pub struct SignedClient {
    http: Client,
    base_url: String,
    credentials: ApiCredentials,
    timestamps: TimestampGenerator<SystemClock>,
}

impl SignedClient {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `base_url` - REST origin without trailing slash (e.g., "https://fapi.binance.com")
    pub fn new(base_url: impl Into<String>, credentials: ApiCredentials) -> RestResult<Self> {
        Self::with_timeout(base_url, credentials, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        credentials: ApiCredentials,
        timeout: Duration,
    ) -> RestResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| RestError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            timestamps: TimestampGenerator::with_system_clock(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a signed request and return the parsed JSON body.
    ///
    /// `params` are serialized in the given order; `timestamp` and
    /// `signature` are appended.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> RestResult<TimedResponse> {
        let timestamp = self.timestamps.next();
        let query = RequestSigner::new(&self.credentials).signed_query(params, timestamp);
        let url = format!("{}{}?{}", self.base_url, path, query);

        debug!(method = %method, path, timestamp, "Sending signed request");
        self.execute(method, &url).await
    }

    /// Send a place or cancel action to the order endpoint.
    pub async fn submit(&self, action: &Action) -> RestResult<TimedResponse> {
        let method = match action.kind() {
            ActionKind::Place => Method::POST,
            ActionKind::Cancel => Method::DELETE,
        };
        self.send(method, ORDER_PATH, &action.params()).await
    }

    /// Obtain a user data stream listen key.
    ///
    /// Keyed but unsigned.
    pub async fn create_listen_key(&self) -> RestResult<String> {
        let url = format!("{}{}", self.base_url, LISTEN_KEY_PATH);
        let body = self.execute(Method::POST, &url).await?.body;

        match body.get("listenKey").and_then(Value::as_str) {
            Some(key) if !key.is_empty() => Ok(key.to_string()),
            _ => Err(RestError::Decode(format!(
                "listenKey missing from response: {body}"
            ))),
        }
    }

    /// Invalidate the current listen key. Best effort.
    pub async fn close_listen_key(&self) -> RestResult<()> {
        let url = format!("{}{}", self.base_url, LISTEN_KEY_PATH);
        self.execute(Method::DELETE, &url).await.map(|_| ())
    }

    async fn execute(&self, method: Method, url: &str) -> RestResult<TimedResponse> {
        let response = self
            .http
            .request(method, url)
            .header(API_KEY_HEADER, self.credentials.api_key())
            .send()
            .await
            .map_err(|e| RestError::Network(format!("HTTP request failed: {e}")))?;
        let headers_at = Instant::now();

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RestError::Network(format!("Failed to read response body: {e}")))?;
        let body_at = Instant::now();

        match classify(status, &body) {
            Ok(body) => Ok(TimedResponse {
                body,
                headers_at,
                body_at,
            }),
            Err(e) => {
                warn!(status = status.as_u16(), error = %e, "Request failed");
                Err(e)
            }
        }
    }
}

/// Map an HTTP status and body to a parsed value or a typed error.
pub fn classify(status: StatusCode, body: &str) -> RestResult<Value> {
    let parsed: Result<Value, _> = serde_json::from_str(body);
    let (code, msg) = match &parsed {
        Ok(value) => (
            value.get("code").and_then(Value::as_i64),
            value
                .get("msg")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| body.to_string()),
        ),
        Err(_) => (None, body.to_string()),
    };

    let is_auth = status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || code.is_some_and(|c| AUTH_ERROR_CODES.contains(&c));
    if is_auth {
        return Err(RestError::Auth {
            status: status.as_u16(),
            code,
            msg,
        });
    }

    let value = parsed.map_err(|e| {
        RestError::Decode(format!("HTTP {status}: invalid JSON body ({e}): {body}"))
    })?;

    if !status.is_success() {
        return Err(RestError::Rejected {
            status: status.as_u16(),
            code,
            msg,
        });
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::extract::{RawQuery, State};
    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::{Json, Router};
    use parking_lot::Mutex;
    use roundbench_core::{ClientOrderId, OrderSide, OrderSpec, OrderType, TimeInForce};
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_classify_success() {
        let value = classify(StatusCode::OK, r#"{"orderId":1,"status":"NEW"}"#).unwrap();
        assert_eq!(value["status"], "NEW");
    }

    #[test]
    fn test_classify_auth_by_status() {
        let err = classify(StatusCode::UNAUTHORIZED, "not json").unwrap_err();
        assert!(matches!(err, RestError::Auth { status: 401, code: None, .. }));
    }

    #[test]
    fn test_classify_auth_by_code() {
        let err = classify(
            StatusCode::BAD_REQUEST,
            r#"{"code":-1022,"msg":"Signature for this request is not valid."}"#,
        )
        .unwrap_err();
        assert_eq!(
            err,
            RestError::Auth {
                status: 400,
                code: Some(-1022),
                msg: "Signature for this request is not valid.".to_string()
            }
        );

        let err = classify(StatusCode::BAD_REQUEST, r#"{"code":-2015,"msg":"x"}"#).unwrap_err();
        assert!(matches!(err, RestError::Auth { .. }));
    }

    #[test]
    fn test_classify_rejected() {
        let err = classify(
            StatusCode::BAD_REQUEST,
            r#"{"code":-2011,"msg":"Unknown order sent."}"#,
        )
        .unwrap_err();
        assert!(matches!(err, RestError::Rejected { code: Some(-2011), .. }));
    }

    #[test]
    fn test_classify_malformed_body() {
        let err = classify(StatusCode::OK, "<html>oops</html>").unwrap_err();
        assert!(matches!(err, RestError::Decode(_)));

        let err = classify(StatusCode::BAD_GATEWAY, "").unwrap_err();
        assert!(matches!(err, RestError::Decode(_)));
    }

    #[derive(Clone, Default)]
    struct Captured {
        requests: Arc<Mutex<Vec<(String, Option<String>, String)>>>,
    }

    async fn order_handler(
        State(captured): State<Captured>,
        headers: HeaderMap,
        RawQuery(query): RawQuery,
    ) -> Json<Value> {
        let key = headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        captured
            .requests
            .lock()
            .push(("order".to_string(), key, query.unwrap_or_default()));
        Json(json!({"orderId": 42, "status": "NEW"}))
    }

    async fn listen_key_handler() -> Json<Value> {
        Json(json!({"listenKey": "lk-test"}))
    }

    async fn spawn_server(captured: Captured) -> String {
        let app = Router::new()
            .route(ORDER_PATH, post(order_handler).delete(order_handler))
            .route(LISTEN_KEY_PATH, post(listen_key_handler))
            .with_state(captured);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_submit_sends_signed_ordered_query() {
        let captured = Captured::default();
        let base = spawn_server(captured.clone()).await;
        let creds = ApiCredentials::new("api-key-1", "secret-1");
        let client = SignedClient::new(base, creds.clone()).unwrap();

        let order = OrderSpec {
            symbol: "BTCUSDT".to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            time_in_force: TimeInForce::GoodTilCancelled,
            quantity: dec!(0.001),
            price: dec!(20000),
        };
        let place = Action::place(order, ClientOrderId::parse("rb_test").unwrap(), 5000).unwrap();
        let cancel = place.cancel_for(50_000).unwrap();

        let response = client.submit(&place).await.unwrap();
        assert_eq!(response.body["orderId"], 42);
        assert!(response.headers_at <= response.body_at);
        client.submit(&cancel).await.unwrap();

        let requests = captured.requests.lock().clone();
        assert_eq!(requests.len(), 2);

        let signer = RequestSigner::new(&creds);
        let mut timestamps = Vec::new();
        for (_, key, query) in &requests {
            assert_eq!(key.as_deref(), Some("api-key-1"));
            let (unsigned, signature) = query.rsplit_once("&signature=").unwrap();
            assert_eq!(signer.sign(unsigned), signature);
            let ts: u64 = unsigned
                .rsplit_once("&timestamp=")
                .unwrap()
                .1
                .parse()
                .unwrap();
            timestamps.push(ts);
        }

        assert!(requests[0].2.starts_with(
            "symbol=BTCUSDT&side=BUY&type=LIMIT&timeInForce=GTC&newClientOrderId=rb_test\
             &quantity=0.001&price=20000&recvWindow=5000&timestamp="
        ));
        assert!(requests[1]
            .2
            .starts_with("symbol=BTCUSDT&origClientOrderId=rb_test&recvWindow=50000&timestamp="));
        assert!(timestamps[1] > timestamps[0]);
    }

    #[tokio::test]
    async fn test_create_listen_key() {
        let base = spawn_server(Captured::default()).await;
        let client = SignedClient::new(base, ApiCredentials::new("k", "s")).unwrap();

        assert_eq!(client.create_listen_key().await.unwrap(), "lk-test");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client =
            SignedClient::new(format!("http://{addr}"), ApiCredentials::new("k", "s")).unwrap();
        let err = client
            .send(Method::POST, ORDER_PATH, &[("symbol", "BTCUSDT".to_string())])
            .await
            .unwrap_err();
        assert!(matches!(err, RestError::Network(_)));
    }
}
