//! Push session: listen key, connection, and the background listener.
//!
//! The listener task owns the socket and decodes frames as they arrive. Order
//! updates go into a bounded channel in arrival order; when the channel is
//! full the listener waits. A connection loss is delivered in-band as the last
//! item, after every event decoded before it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use roundbench_core::ConfirmationEvent;
use roundbench_rest::SignedClient;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::{WsError, WsResult};
use crate::message::{decode_user_stream, Decoded};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Push session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Stream base URL; the listen key is appended as a path segment.
    pub ws_url: String,
    /// Capacity of the event queue between listener and consumer.
    pub event_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ws_url: "wss://fstream.binance.com/ws".to_string(),
            event_buffer: 64,
        }
    }
}

enum SessionItem {
    Confirmation(ConfirmationEvent),
    Closed(WsError),
}

/// A live user data stream.
///
/// Events are consumed once via [`PushSession::next_event`]; the sequence
/// cannot be restarted.
pub struct PushSession {
    rx: mpsc::Receiver<SessionItem>,
    shutdown: CancellationToken,
    decode_failures: Arc<AtomicU64>,
    listen_key: Option<String>,
    listener: Option<JoinHandle<()>>,
}

impl PushSession {
    /// Obtain a listen key and connect to `{ws_url}/{listenKey}` within
    /// `open_timeout`.
    ///
    /// A listen key obtained before a failed or timed-out connect is closed
    /// again, best effort.
    ///
    /// # Errors
    /// `WsError::ListenKey` if the key request fails, `WsError::OpenTimeout`
    /// past the deadline, or a connect error.
    pub async fn open(
        client: &SignedClient,
        config: &SessionConfig,
        open_timeout: Duration,
    ) -> WsResult<Self> {
        let deadline = tokio::time::Instant::now() + open_timeout;
        let timed_out = || WsError::OpenTimeout {
            timeout_ms: u64::try_from(open_timeout.as_millis()).unwrap_or(u64::MAX),
        };

        let listen_key = tokio::time::timeout_at(deadline, client.create_listen_key())
            .await
            .map_err(|_| timed_out())??;
        debug!("Listen key acquired");

        let url = stream_url(&config.ws_url, &listen_key);
        let connected =
            tokio::time::timeout_at(deadline, Self::connect(&url, config.event_buffer))
                .await
                .unwrap_or_else(|_| Err(timed_out()));

        match connected {
            Ok(mut session) => {
                session.listen_key = Some(listen_key);
                Ok(session)
            }
            Err(e) => {
                warn!(error = %e, "Stream connect failed, releasing listen key");
                if let Err(close_err) = client.close_listen_key().await {
                    warn!(error = %close_err, "Failed to close listen key");
                }
                Err(e)
            }
        }
    }

    /// Connect to a fully-formed stream URL and start the listener.
    pub async fn connect(url: &str, event_buffer: usize) -> WsResult<Self> {
        info!(url = %redact_key(url), "Connecting to user data stream");

        let (stream, _response) = connect_async_tls_with_config(url, None, true, None)
            .await
            .map_err(|e| WsError::ConnectionFailed(e.to_string()))?;

        let (tx, rx) = mpsc::channel(event_buffer.max(1));
        let shutdown = CancellationToken::new();
        let decode_failures = Arc::new(AtomicU64::new(0));

        let listener = tokio::spawn(run_listener(
            stream,
            tx,
            shutdown.clone(),
            Arc::clone(&decode_failures),
        ));

        info!("User data stream connected");
        Ok(Self {
            rx,
            shutdown,
            decode_failures,
            listen_key: None,
            listener: Some(listener),
        })
    }

    /// Session fed by hand instead of a socket.
    pub fn detached(event_buffer: usize) -> (Self, SessionFeed) {
        let (tx, rx) = mpsc::channel(event_buffer.max(1));
        let decode_failures = Arc::new(AtomicU64::new(0));
        let session = Self {
            rx,
            shutdown: CancellationToken::new(),
            decode_failures: Arc::clone(&decode_failures),
            listen_key: None,
            listener: None,
        };
        (
            session,
            SessionFeed {
                tx,
                decode_failures,
            },
        )
    }

    /// Next decoded confirmation, in arrival order.
    ///
    /// # Errors
    /// The terminal session error once, then `WsError::SessionEnded`.
    pub async fn next_event(&mut self) -> WsResult<ConfirmationEvent> {
        match self.rx.recv().await {
            Some(SessionItem::Confirmation(event)) => Ok(event),
            Some(SessionItem::Closed(err)) => Err(err),
            None => Err(WsError::SessionEnded),
        }
    }

    /// Malformed order updates dropped so far.
    pub fn decode_failures(&self) -> u64 {
        self.decode_failures.load(Ordering::Relaxed)
    }

    pub fn listen_key(&self) -> Option<&str> {
        self.listen_key.as_deref()
    }

    /// Stop the listener and send a close frame.
    pub async fn close(&mut self) {
        self.shutdown.cancel();
        if let Some(listener) = self.listener.take() {
            if let Err(e) = listener.await {
                warn!(?e, "Listener task ended abnormally");
            }
        }
        self.rx.close();
    }
}

impl Drop for PushSession {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Producer half of a detached session.
#[derive(Clone)]
pub struct SessionFeed {
    tx: mpsc::Sender<SessionItem>,
    decode_failures: Arc<AtomicU64>,
}

impl SessionFeed {
    /// Queue a confirmation. Returns false once the session is gone.
    pub async fn push(&self, event: ConfirmationEvent) -> bool {
        self.tx.send(SessionItem::Confirmation(event)).await.is_ok()
    }

    /// Decode a raw frame the same way the listener does.
    pub async fn push_text(&self, text: &str) -> bool {
        match decode_user_stream(text, Instant::now()) {
            Decoded::Confirmation(event) => self.push(event).await,
            Decoded::ListenKeyExpired => self.fail(WsError::ListenKeyExpired).await,
            Decoded::Ignored => true,
            Decoded::Malformed(_) => {
                self.decode_failures.fetch_add(1, Ordering::Relaxed);
                true
            }
        }
    }

    /// Deliver a terminal error.
    pub async fn fail(&self, err: WsError) -> bool {
        self.tx.send(SessionItem::Closed(err)).await.is_ok()
    }
}

/// `{base}/{listen_key}` with a single separator.
pub fn stream_url(base: &str, listen_key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), listen_key)
}

/// Listen keys are bearer credentials for the stream; keep them out of logs.
fn redact_key(url: &str) -> String {
    match url.rsplit_once('/') {
        Some((base, _)) => format!("{base}/***"),
        None => url.to_string(),
    }
}

async fn run_listener(
    stream: WsStream,
    tx: mpsc::Sender<SessionItem>,
    shutdown: CancellationToken,
    decode_failures: Arc<AtomicU64>,
) {
    let (mut write, mut read) = stream.split();

    let terminal = loop {
        tokio::select! {
            biased;

            () = shutdown.cancelled() => {
                debug!("Shutdown requested, closing user data stream");
                if let Err(e) = write.send(Message::Close(None)).await {
                    warn!(?e, "Failed to send Close frame during shutdown");
                }
                return;
            }

            msg = read.next() => {
                let received_at = Instant::now();
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                        Ok(text) => text,
                        Err(e) => {
                            decode_failures.fetch_add(1, Ordering::Relaxed);
                            warn!(error = %e, "Dropping non-UTF-8 binary frame");
                            continue;
                        }
                    },
                    Some(Ok(Message::Ping(data))) => {
                        trace!("Received ping, sending pong");
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            break WsError::from(e);
                        }
                        continue;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (f.code.into(), f.reason.to_string()))
                            .unwrap_or((1000, "Normal close".to_string()));
                        warn!(code, %reason, "User data stream closed by server");
                        break WsError::ConnectionClosed { code, reason };
                    }
                    Some(Err(e)) => {
                        warn!(?e, "User data stream read error");
                        break WsError::from(e);
                    }
                    None => {
                        warn!("User data stream ended");
                        break WsError::StreamEnded;
                    }
                    _ => continue,
                };

                match decode_user_stream(&text, received_at) {
                    Decoded::Confirmation(event) => {
                        trace!(
                            client_order_id = %event.client_order_id,
                            execution = %event.execution,
                            "Order update received"
                        );
                        tokio::select! {
                            sent = tx.send(SessionItem::Confirmation(event)) => {
                                if sent.is_err() {
                                    return;
                                }
                            }
                            () = shutdown.cancelled() => return,
                        }
                    }
                    Decoded::ListenKeyExpired => {
                        warn!("Listen key expired");
                        break WsError::ListenKeyExpired;
                    }
                    Decoded::Ignored => {}
                    Decoded::Malformed(reason) => {
                        decode_failures.fetch_add(1, Ordering::Relaxed);
                        warn!(%reason, "Dropping malformed order update");
                    }
                }
            }
        }
    };

    tokio::select! {
        _ = tx.send(SessionItem::Closed(terminal)) => {}
        () = shutdown.cancelled() => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_url() {
        assert_eq!(
            stream_url("wss://fstream.binance.com/ws", "abc"),
            "wss://fstream.binance.com/ws/abc"
        );
        assert_eq!(stream_url("ws://127.0.0.1:9/ws/", "k"), "ws://127.0.0.1:9/ws/k");
    }

    #[test]
    fn test_redact_key() {
        assert_eq!(
            redact_key("wss://fstream.binance.com/ws/secretkey"),
            "wss://fstream.binance.com/ws/***"
        );
    }

    #[tokio::test]
    async fn test_detached_session_preserves_order() {
        let (mut session, feed) = PushSession::detached(4);
        let new = r#"{"e":"ORDER_TRADE_UPDATE","o":{"s":"BTCUSDT","c":"a","x":"NEW"}}"#;
        let canceled = r#"{"e":"ORDER_TRADE_UPDATE","o":{"s":"BTCUSDT","c":"a","x":"CANCELED"}}"#;

        assert!(feed.push_text(new).await);
        assert!(feed.push_text("garbage").await);
        assert!(feed.push_text(canceled).await);
        assert!(feed.fail(WsError::StreamEnded).await);
        drop(feed);

        assert_eq!(session.next_event().await.unwrap().execution.as_str(), "NEW");
        assert_eq!(
            session.next_event().await.unwrap().execution.as_str(),
            "CANCELED"
        );
        assert!(matches!(
            session.next_event().await,
            Err(WsError::StreamEnded)
        ));
        assert!(matches!(
            session.next_event().await,
            Err(WsError::SessionEnded)
        ));
        assert_eq!(session.decode_failures(), 1);
    }
}
