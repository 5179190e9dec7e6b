//! Venue trait: the two channels a run talks to.
//!
//! `LiveVenue` goes to the exchange through the signed REST client and the
//! user data stream. `MockVenue` scripts both sides in-process for tests.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use roundbench_core::{Action, ActionKind, ConfirmationEvent, ExecutionType, ORDER_TRADE_UPDATE};
use roundbench_rest::{RestError, RestResult, SignedClient, TimedResponse};
use roundbench_telemetry::Metrics;
use roundbench_ws::{PushSession, SessionConfig, SessionFeed, WsError, WsResult};
use serde_json::json;
use tracing::{debug, warn};

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Request/response channel plus push channel of a venue.
pub trait Venue: Send + Sync {
    /// Acquire a subscription and start listening within `timeout`.
    ///
    /// Nothing acquired by a failed open outlives the call.
    fn open_session(&self, timeout: Duration) -> BoxFuture<'_, WsResult<PushSession>>;

    /// Send a place or cancel and return the venue's acknowledgment.
    fn submit<'a>(&'a self, action: &'a Action) -> BoxFuture<'a, RestResult<TimedResponse>>;

    /// Tear down a session. Never fails the run.
    fn close_session(&self, session: PushSession) -> BoxFuture<'_, ()>;
}

/// Exchange-backed venue.
pub struct LiveVenue {
    client: SignedClient,
    session: SessionConfig,
}

impl LiveVenue {
    pub fn new(client: SignedClient, session: SessionConfig) -> Self {
        Self { client, session }
    }

    pub fn client(&self) -> &SignedClient {
        &self.client
    }
}

fn rest_outcome<T>(result: &RestResult<T>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(e) => error_outcome(e),
    }
}

fn error_outcome(err: &RestError) -> &'static str {
    match err {
        RestError::Network(_) | RestError::HttpClient(_) => "network",
        RestError::Auth { .. } | RestError::Credentials(_) => "auth",
        RestError::Decode(_) => "decode",
        RestError::Rejected { .. } => "rejected",
    }
}

impl Venue for LiveVenue {
    fn open_session(&self, timeout: Duration) -> BoxFuture<'_, WsResult<PushSession>> {
        Box::pin(async move {
            let result = PushSession::open(&self.client, &self.session, timeout).await;
            let outcome = match &result {
                Err(WsError::ListenKey(e)) => error_outcome(e),
                _ => "ok",
            };
            Metrics::rest_request("listen_key", outcome);
            result
        })
    }

    fn submit<'a>(&'a self, action: &'a Action) -> BoxFuture<'a, RestResult<TimedResponse>> {
        Box::pin(async move {
            let result = self.client.submit(action).await;
            Metrics::rest_request(&action.kind().to_string(), rest_outcome(&result));
            result
        })
    }

    fn close_session(&self, mut session: PushSession) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            session.close().await;
            if session.listen_key().is_some() {
                if let Err(e) = self.client.close_listen_key().await {
                    warn!(error = %e, "Failed to close listen key");
                }
            }
        })
    }
}

/// Scripted venue for tests.
///
/// By default every submit is acknowledged and confirmed on the push side
/// (`NEW` for a place, `CANCELED` for a cancel). Noise frames queued with
/// [`MockVenue::push_noise`] are delivered before each confirmation.
pub struct MockVenue {
    submits: parking_lot::Mutex<Vec<Action>>,
    feed: parking_lot::Mutex<Option<SessionFeed>>,
    open_error: parking_lot::Mutex<Option<WsError>>,
    open_delay: parking_lot::Mutex<Option<Duration>>,
    submit_errors: parking_lot::Mutex<VecDeque<(ActionKind, RestError)>>,
    noise: parking_lot::Mutex<Vec<String>>,
    confirm_place: AtomicBool,
    confirm_cancel: AtomicBool,
    sessions_closed: parking_lot::Mutex<u32>,
    event_buffer: usize,
}

impl Default for MockVenue {
    fn default() -> Self {
        Self::new()
    }
}

impl MockVenue {
    pub fn new() -> Self {
        Self {
            submits: parking_lot::Mutex::new(Vec::new()),
            feed: parking_lot::Mutex::new(None),
            open_error: parking_lot::Mutex::new(None),
            open_delay: parking_lot::Mutex::new(None),
            submit_errors: parking_lot::Mutex::new(VecDeque::new()),
            noise: parking_lot::Mutex::new(Vec::new()),
            confirm_place: AtomicBool::new(true),
            confirm_cancel: AtomicBool::new(true),
            sessions_closed: parking_lot::Mutex::new(0),
            event_buffer: 64,
        }
    }

    /// Fail the next session open with `err`.
    pub fn fail_open(&self, err: WsError) {
        *self.open_error.lock() = Some(err);
    }

    /// Delay session open.
    pub fn delay_open(&self, delay: Duration) {
        *self.open_delay.lock() = Some(delay);
    }

    /// Fail the next submit of `kind` with `err`.
    pub fn fail_submit(&self, kind: ActionKind, err: RestError) {
        self.submit_errors.lock().push_back((kind, err));
    }

    /// Whether a place is confirmed on the push side.
    pub fn set_confirm_place(&self, confirm: bool) {
        self.confirm_place.store(confirm, Ordering::SeqCst);
    }

    /// Whether a cancel is confirmed on the push side.
    pub fn set_confirm_cancel(&self, confirm: bool) {
        self.confirm_cancel.store(confirm, Ordering::SeqCst);
    }

    /// Raw frames delivered before every confirmation.
    pub fn push_noise(&self, frame: impl Into<String>) {
        self.noise.lock().push(frame.into());
    }

    /// Producer side of the open session, if any.
    pub fn feed(&self) -> Option<SessionFeed> {
        self.feed.lock().clone()
    }

    /// Recorded submits, in order.
    pub fn submits(&self) -> Vec<Action> {
        self.submits.lock().clone()
    }

    pub fn sessions_closed(&self) -> u32 {
        *self.sessions_closed.lock()
    }

    /// Confirmation event as the decoder would produce it.
    pub fn confirmation(action: &Action, execution: ExecutionType) -> ConfirmationEvent {
        ConfirmationEvent {
            event_type: ORDER_TRADE_UPDATE.to_string(),
            execution,
            client_order_id: action.client_order_id().clone(),
            symbol: action.symbol().to_string(),
            order_id: Some(1),
            event_time_ms: None,
            received_at: Instant::now(),
        }
    }

    async fn emit_confirmation(&self, action: &Action) {
        let (execution, enabled) = match action.kind() {
            ActionKind::Place => (ExecutionType::New, &self.confirm_place),
            ActionKind::Cancel => (ExecutionType::Canceled, &self.confirm_cancel),
        };
        if !enabled.load(Ordering::SeqCst) {
            return;
        }
        let Some(feed) = self.feed() else {
            return;
        };
        let noise = self.noise.lock().clone();
        for frame in noise {
            feed.push_text(&frame).await;
        }
        feed.push(Self::confirmation(action, execution)).await;
    }
}

impl Venue for MockVenue {
    fn open_session(&self, timeout: Duration) -> BoxFuture<'_, WsResult<PushSession>> {
        Box::pin(async move {
            let delay = *self.open_delay.lock();
            if let Some(delay) = delay {
                tokio::time::timeout(timeout, tokio::time::sleep(delay))
                    .await
                    .map_err(|_| WsError::OpenTimeout {
                        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    })?;
            }
            let open_error = self.open_error.lock().take();
            if let Some(err) = open_error {
                return Err(err);
            }
            let (session, feed) = PushSession::detached(self.event_buffer);
            *self.feed.lock() = Some(feed);
            Ok(session)
        })
    }

    fn submit<'a>(&'a self, action: &'a Action) -> BoxFuture<'a, RestResult<TimedResponse>> {
        Box::pin(async move {
            self.submits.lock().push(action.clone());

            let scripted = {
                let mut errors = self.submit_errors.lock();
                match errors.iter().position(|(kind, _)| *kind == action.kind()) {
                    Some(idx) => errors.remove(idx).map(|(_, err)| err),
                    None => None,
                }
            };
            if let Some(err) = scripted {
                debug!(kind = %action.kind(), "Mock submit failing");
                return Err(err);
            }

            let headers_at = Instant::now();
            self.emit_confirmation(action).await;
            Ok(TimedResponse {
                body: json!({
                    "orderId": 1,
                    "clientOrderId": action.client_order_id().as_str(),
                    "status": match action.kind() {
                        ActionKind::Place => "NEW",
                        ActionKind::Cancel => "CANCELED",
                    },
                }),
                headers_at,
                body_at: Instant::now(),
            })
        })
    }

    fn close_session(&self, mut session: PushSession) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            session.close().await;
            *self.sessions_closed.lock() += 1;
            self.feed.lock().take();
        })
    }
}
