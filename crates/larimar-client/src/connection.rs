//! One relay connection: a single WebSocket with reconnect state.
//!
//! A [`RelayConnection`] owns at most one live socket to one relay. The
//! state machine is `Disconnected → Connecting → Ready`, with
//! `Ready → Disconnected` on close or failure. A compare-and-swap session
//! flag guarantees concurrent callers never open two sockets for the same
//! relay.
//!
//! Transport errors never surface to callers as return values; they drive
//! the per-relay [`ReconnectBackoff`] and are observed through
//! [`ConnectionEvents::on_state`]. Errors are classified structurally from
//! the websocket error variants, never by matching message text.
//!
//! One malformed inbound frame is logged and dropped; the socket stays up.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use larimar_core::message::{ClientMessage, RelayMessage};
use larimar_core::relay_url::NormalizedRelayUrl;

use crate::backoff::{BackoffConfig, ReconnectBackoff};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
}

/// Structured classification of a transport failure.
///
/// Replaces message-text sniffing: the kind is derived from the websocket
/// error variant and the underlying I/O error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The peer closed the connection normally.
    CleanClose,
    /// Send/close races on an already-closed socket; expected noise.
    ExpectedRace,
    /// Connection refused or timed out; the relay looks dead.
    Unreachable,
    /// TLS negotiation failed.
    Tls,
    /// The peer violated the websocket or HTTP protocol.
    Protocol,
    /// Anything else (DNS hiccups, resets, ...); treated as transient.
    Other,
}

/// Classify a websocket error without looking at its message text.
pub fn classify_ws_error(error: &WsError) -> TransportErrorKind {
    match error {
        WsError::ConnectionClosed | WsError::AlreadyClosed => TransportErrorKind::ExpectedRace,
        WsError::Io(io) => match io.kind() {
            std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::TimedOut => {
                TransportErrorKind::Unreachable
            }
            _ => TransportErrorKind::Other,
        },
        WsError::Tls(_) => TransportErrorKind::Tls,
        WsError::Protocol(_) | WsError::Url(_) | WsError::Http(_) | WsError::HttpFormat(_) => {
            TransportErrorKind::Protocol
        }
        _ => TransportErrorKind::Other,
    }
}

/// Configuration for a relay connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Timeout for the websocket handshake.
    pub connect_timeout: Duration,
    /// Outbound command queue depth; sends beyond it are dropped.
    pub outbound_queue: usize,
    pub backoff: BackoffConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            outbound_queue: 64,
            backoff: BackoffConfig::default(),
        }
    }
}

/// Callbacks a connection delivers to its owner.
pub trait ConnectionEvents: Send + Sync {
    /// A decoded inbound frame.
    fn on_frame(&self, relay: &NormalizedRelayUrl, frame: RelayMessage);
    /// The connection changed state. A transition to `Ready` is the
    /// owner's cue to re-issue subscriptions for this relay.
    fn on_state(&self, relay: &NormalizedRelayUrl, state: ConnectionState);
}

enum Outbound {
    Frame(String),
    Shutdown,
}

/// A single relay's websocket connection.
pub struct RelayConnection {
    url: NormalizedRelayUrl,
    config: ConnectionConfig,
    events: Arc<dyn ConnectionEvents>,
    state: Mutex<ConnectionState>,
    /// True while a session task (connect attempt or live socket) exists.
    session_active: AtomicBool,
    /// Set by `disconnect()` so session teardown resets backoff instead of
    /// counting a failure.
    locally_closed: AtomicBool,
    backoff: Mutex<ReconnectBackoff>,
    outbound: Mutex<Option<mpsc::Sender<Outbound>>>,
}

impl RelayConnection {
    pub fn new(
        url: NormalizedRelayUrl,
        config: ConnectionConfig,
        events: Arc<dyn ConnectionEvents>,
    ) -> Arc<Self> {
        let backoff = ReconnectBackoff::new(config.backoff.clone());
        Arc::new(Self {
            url,
            config,
            events,
            state: Mutex::new(ConnectionState::Disconnected),
            session_active: AtomicBool::new(false),
            locally_closed: AtomicBool::new(false),
            backoff: Mutex::new(backoff),
            outbound: Mutex::new(None),
        })
    }

    pub fn url(&self) -> &NormalizedRelayUrl {
        &self.url
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// The delay currently imposed before the next reconnect attempt.
    pub fn retry_delay(&self) -> Duration {
        self.backoff.lock().current_delay()
    }

    /// Open the socket. No-op if a session is already connecting or live.
    pub fn connect(self: &Arc<Self>) {
        if self
            .session_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        self.locally_closed.store(false, Ordering::Release);
        self.backoff.lock().record_attempt(Instant::now());
        self.set_state(ConnectionState::Connecting);

        let conn = Arc::clone(self);
        tokio::spawn(async move { conn.run_session().await });
    }

    /// Connect only if disconnected and the backoff window has elapsed
    /// (or `ignore_backoff` overrides it). The resulting `Ready` state
    /// change is what triggers subscription resync in the owner.
    pub fn connect_and_sync_if_disconnected(self: &Arc<Self>, ignore_backoff: bool) {
        if self.state() != ConnectionState::Disconnected {
            return;
        }
        if !ignore_backoff && !self.backoff.lock().window_elapsed(Instant::now()) {
            return;
        }
        self.connect();
    }

    /// Queue a command if the connection is Ready; silently drop otherwise.
    ///
    /// Dropped sends are not retried here: the orchestration layer re-syncs
    /// on its next invalidation pass after reconnect.
    pub fn send_if_connected(&self, msg: &ClientMessage) -> bool {
        if self.state() != ConnectionState::Ready {
            return false;
        }
        let guard = self.outbound.lock();
        match guard.as_ref() {
            Some(tx) => tx.try_send(Outbound::Frame(msg.to_json())).is_ok(),
            None => false,
        }
    }

    /// Clean, locally-initiated close. Resets backoff to the floor.
    pub fn disconnect(&self) {
        self.locally_closed.store(true, Ordering::Release);
        let guard = self.outbound.lock();
        if let Some(tx) = guard.as_ref() {
            let _ = tx.try_send(Outbound::Shutdown);
        }
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
        self.events.on_state(&self.url, state);
    }

    async fn run_session(self: Arc<Self>) {
        let connected = tokio::time::timeout(
            self.config.connect_timeout,
            connect_async(self.url.as_str()),
        )
        .await;

        let ws = match connected {
            Ok(Ok((ws, _response))) => ws,
            Ok(Err(e)) => {
                let kind = classify_ws_error(&e);
                self.end_session(Some(kind), Some(&e.to_string()));
                return;
            }
            Err(_elapsed) => {
                self.end_session(Some(TransportErrorKind::Unreachable), Some("connect timeout"));
                return;
            }
        };

        tracing::debug!(relay = %self.url, "connected");
        metrics::counter!("relay_connects_total").increment(1);

        let (tx, mut rx) = mpsc::channel::<Outbound>(self.config.outbound_queue);
        *self.outbound.lock() = Some(tx);
        self.backoff.lock().on_success();
        self.set_state(ConnectionState::Ready);

        let (mut sink, mut stream) = ws.split();
        let mut failure: Option<(TransportErrorKind, Option<String>)> = None;

        loop {
            tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(Outbound::Frame(text)) => {
                        if let Err(e) = sink.send(Message::Text(text.into())).await {
                            failure = Some((classify_ws_error(&e), Some(e.to_string())));
                            break;
                        }
                    }
                    Some(Outbound::Shutdown) | None => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                },
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.handle_text(&text),
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | None => {
                        failure = Some((TransportErrorKind::CleanClose, None));
                        break;
                    }
                    // Binary frames are not part of the dialect.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        failure = Some((classify_ws_error(&e), Some(e.to_string())));
                        break;
                    }
                },
            }
        }

        *self.outbound.lock() = None;
        if self.locally_closed.load(Ordering::Acquire) {
            self.end_session(None, None);
        } else {
            match failure {
                Some((kind, detail)) => self.end_session(Some(kind), detail.as_deref()),
                None => self.end_session(Some(TransportErrorKind::CleanClose), None),
            }
        }
    }

    fn handle_text(&self, text: &str) {
        match RelayMessage::from_json(text) {
            Ok(frame) => self.events.on_frame(&self.url, frame),
            Err(e) => {
                metrics::counter!("relay_frames_dropped_total").increment(1);
                tracing::debug!(relay = %self.url, error = %e, "dropping malformed frame");
            }
        }
    }

    /// Session teardown. `kind == None` marks a locally-initiated close.
    fn end_session(&self, kind: Option<TransportErrorKind>, detail: Option<&str>) {
        match kind {
            None => {
                self.backoff.lock().reset();
                tracing::debug!(relay = %self.url, "disconnected (local)");
            }
            Some(kind) => {
                self.backoff
                    .lock()
                    .on_failure(kind == TransportErrorKind::Unreachable);
                match kind {
                    TransportErrorKind::CleanClose | TransportErrorKind::ExpectedRace => {
                        tracing::debug!(relay = %self.url, ?kind, detail, "connection closed");
                    }
                    _ => {
                        tracing::warn!(relay = %self.url, ?kind, detail, "connection failed");
                    }
                }
                metrics::counter!("relay_disconnects_total").increment(1);
            }
        }
        self.session_active.store(false, Ordering::Release);
        self.set_state(ConnectionState::Disconnected);
    }
}
