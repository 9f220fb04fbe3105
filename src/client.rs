use std::sync::{Arc, Mutex};

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::audio::CaptureControl;
use crate::config::ConnectionConfig;
use crate::error::{ConnectionErrorKind, Error, Result};
use crate::protocol::client_events::ClientEvent;
use crate::protocol::server_events::ServerEvent;
use crate::transport::ws::{self, WsTransport, close_reason};
use crate::transport::{Incoming, Transport};

const TRACE_LOG_MAX_BYTES: usize = 1024;
const COMMAND_CHANNEL_CAPACITY: usize = 64;
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Connection lifecycle. Transitions are monotonic; `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// Socket open, session not yet acknowledged by the backend.
    Connected,
    /// Backend acknowledged the session; content and audio commands are
    /// accepted.
    Ready,
    Closed,
}

#[derive(Debug, Clone)]
struct DisconnectInfo {
    reason: String,
    kind: ConnectionErrorKind,
}

/// Events fanned out by the dispatch task.
///
/// Every successfully parsed frame arrives as `Server`; frames that are
/// not valid JSON surface as `SerializationError` without affecting the
/// connection. `Disconnected` fires once when the socket closes.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Server(ServerEvent),
    SerializationError { message: String },
    Disconnected { code: u16, reason: String },
}

enum Command {
    Send {
        event: ClientEvent,
        respond: oneshot::Sender<Result<()>>,
    },
    Close {
        respond: oneshot::Sender<Result<()>>,
    },
}

/// Client for one Voice Live session.
///
/// Owns the socket through a dispatch task; all mutable session state
/// (connection state, recorded session id) is mutated only by that task.
/// Commands cross over an mpsc channel, inbound events fan out on
/// broadcast channels.
#[must_use]
pub struct VoiceLiveClient {
    cmd_tx: mpsc::Sender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    events_tx: broadcast::Sender<SessionEvent>,
    raw_tx: broadcast::Sender<Value>,
    session_id: Arc<Mutex<Option<String>>>,
    disconnect: Arc<Mutex<Option<DisconnectInfo>>>,
    capture: Arc<Mutex<CaptureControl>>,
}

impl VoiceLiveClient {
    /// Connect to the Voice Live endpoint described by `config`.
    ///
    /// On return the client is in the `Connected` state; use
    /// [`wait_for_ready`](Self::wait_for_ready) before sending audio.
    ///
    /// # Errors
    /// Returns a `Connection` error if the WebSocket handshake fails.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let stream = ws::connect(config).await?;
        Ok(Self::from_transport(Box::new(WsTransport::new(stream))))
    }

    pub(crate) fn from_transport(transport: Box<dyn Transport>) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connected);
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (raw_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let session_id = Arc::new(Mutex::new(None));
        let disconnect = Arc::new(Mutex::new(None));
        let capture = Arc::new(Mutex::new(CaptureControl::new()));

        tokio::spawn(dispatch(DispatchContext {
            transport,
            cmd_rx,
            state_tx,
            events_tx: events_tx.clone(),
            raw_tx: raw_tx.clone(),
            session_id: Arc::clone(&session_id),
            disconnect: Arc::clone(&disconnect),
            capture: Arc::clone(&capture),
        }));

        Self {
            cmd_tx,
            state_rx,
            events_tx,
            raw_tx,
            session_id,
            disconnect,
            capture,
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Socket is open (session may or may not be acknowledged yet).
    #[must_use]
    pub fn connected(&self) -> bool {
        matches!(
            self.state(),
            ConnectionState::Connected | ConnectionState::Ready
        )
    }

    #[must_use]
    pub fn ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// Session id recorded from the first `session.created`/`session.updated`.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.session_id.lock().map_or(None, |guard| guard.clone())
    }

    /// Subscribe to the semantic event channel. Every caller gets an
    /// independent receiver, so multiple subscribers all observe every
    /// event; slow subscribers may observe a lag error instead of
    /// blocking the dispatch task.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events_tx.subscribe()
    }

    /// Subscribe to the raw channel: every inbound frame as parsed JSON,
    /// including frames of unrecognized type.
    #[must_use]
    pub fn subscribe_raw(&self) -> broadcast::Receiver<Value> {
        self.raw_tx.subscribe()
    }

    /// The currently attached capture stop switch; stopping is
    /// idempotent. The dispatch task trips it when the backend reports an
    /// audio protocol violation.
    #[must_use]
    pub fn capture_control(&self) -> CaptureControl {
        self.capture
            .lock()
            .map_or_else(|_| CaptureControl::new(), |guard| guard.clone())
    }

    /// Install and return a fresh capture stop switch, re-arming the
    /// automatic violation stop for a restarted pipeline.
    pub fn renew_capture_control(&self) -> CaptureControl {
        let fresh = CaptureControl::new();
        if let Ok(mut guard) = self.capture.lock() {
            *guard = fresh.clone();
        }
        fresh
    }

    /// Wait until the backend has acknowledged the session.
    ///
    /// Resolves immediately when already `Ready`. Any number of callers
    /// may wait concurrently; all are notified on the transition.
    ///
    /// # Errors
    /// Returns a `Connection` error if the connection closes before the
    /// session becomes ready.
    pub async fn wait_for_ready(&self) -> Result<()> {
        let mut rx = self.state_rx.clone();
        loop {
            match *rx.borrow_and_update() {
                ConnectionState::Ready => return Ok(()),
                ConnectionState::Closed | ConnectionState::Disconnected => {
                    return Err(self.closed_error());
                }
                ConnectionState::Connecting | ConnectionState::Connected => {}
            }
            if rx.changed().await.is_err() {
                return Err(Error::ConnectionClosed);
            }
        }
    }

    /// Send a client event.
    ///
    /// Configuration commands are accepted as soon as the socket is open;
    /// audio append additionally requires the `Ready` state.
    ///
    /// # Errors
    /// Returns `NotConnected` (without performing any socket I/O) when the
    /// state does not permit the event, or a transport error if the write
    /// fails.
    pub async fn send(&self, event: ClientEvent) -> Result<()> {
        let state = self.state();
        let permitted = match state {
            ConnectionState::Ready => true,
            ConnectionState::Connected => !event.requires_ready(),
            ConnectionState::Disconnected
            | ConnectionState::Connecting
            | ConnectionState::Closed => false,
        };
        if !permitted {
            return Err(Error::NotConnected { state });
        }

        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Send { event, respond: tx })
            .await
            .map_err(|_| Error::ConnectionClosed)?;
        rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Close the connection with a normal close frame, stopping audio
    /// capture first. Safe to call repeatedly.
    ///
    /// # Errors
    /// Returns a transport error if the close frame cannot be written.
    pub async fn close(&self) -> Result<()> {
        self.capture_control().stop();
        if self.state() == ConnectionState::Closed {
            return Ok(());
        }
        let (tx, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(Command::Close { respond: tx })
            .await
            .is_err()
        {
            return Ok(());
        }
        match rx.await {
            Ok(result) => result,
            Err(_) => Ok(()),
        }
    }

    /// Build the error describing why the connection closed, preferring
    /// the classification recorded from the close frame.
    fn closed_error(&self) -> Error {
        let info = self.disconnect.lock().map_or(None, |guard| guard.clone());
        info.map_or_else(
            || Error::Connection {
                kind: ConnectionErrorKind::Other,
                message: "connection closed before session became ready".to_string(),
            },
            |info| Error::Connection {
                kind: info.kind,
                message: info.reason,
            },
        )
    }
}

struct DispatchContext {
    transport: Box<dyn Transport>,
    cmd_rx: mpsc::Receiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    events_tx: broadcast::Sender<SessionEvent>,
    raw_tx: broadcast::Sender<Value>,
    session_id: Arc<Mutex<Option<String>>>,
    disconnect: Arc<Mutex<Option<DisconnectInfo>>>,
    capture: Arc<Mutex<CaptureControl>>,
}

async fn dispatch(mut ctx: DispatchContext) {
    loop {
        tokio::select! {
            cmd = ctx.cmd_rx.recv() => match cmd {
                Some(Command::Send { event, respond }) => {
                    let result = write_event(&mut *ctx.transport, &event).await;
                    let _ = respond.send(result);
                }
                Some(Command::Close { respond }) => {
                    let result = ctx.transport.close().await;
                    let _ = ctx.state_tx.send(ConnectionState::Closed);
                    let _ = respond.send(result);
                    break;
                }
                // Client dropped; tear the socket down.
                None => {
                    let _ = ctx.transport.close().await;
                    let _ = ctx.state_tx.send(ConnectionState::Closed);
                    break;
                }
            },
            incoming = ctx.transport.next_incoming() => match incoming {
                Ok(Some(Incoming::Frame(text))) => handle_frame(&ctx, &text),
                Ok(Some(Incoming::Closed { code, reason })) => {
                    handle_close(&ctx, code, &reason);
                    break;
                }
                Ok(None) => {
                    handle_close(&ctx, 1006, "");
                    break;
                }
                Err(err) => {
                    tracing::warn!("socket error: {err}");
                    handle_close(&ctx, 1006, &err.to_string());
                    break;
                }
            }
        }
    }
}

async fn write_event(transport: &mut dyn Transport, event: &ClientEvent) -> Result<()> {
    let json = serde_json::to_string(event)?;
    tracing::trace!("sending event: {}", truncate_for_log(&json));
    transport.send_text(json).await
}

fn handle_frame(ctx: &DispatchContext, text: &str) {
    tracing::trace!("received frame: {}", truncate_for_log(text));

    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!("failed to parse server frame: {err}");
            let _ = ctx.events_tx.send(SessionEvent::SerializationError {
                message: err.to_string(),
            });
            return;
        }
    };

    // Every valid frame mirrors on the raw channel, recognized or not.
    let _ = ctx.raw_tx.send(value.clone());

    let event = match ServerEvent::deserialize(value) {
        Ok(event) => event,
        Err(err) => {
            let _ = ctx.events_tx.send(SessionEvent::SerializationError {
                message: err.to_string(),
            });
            return;
        }
    };

    match &event {
        ServerEvent::SessionCreated { session, .. }
        | ServerEvent::SessionUpdated { session, .. } => {
            if let Some(id) = &session.id {
                if let Ok(mut guard) = ctx.session_id.lock() {
                    *guard = Some(id.clone());
                }
            }
            // Ready is reachable only from Connected; later acknowledgements
            // re-affirm it without another transition.
            let became_ready = ctx.state_tx.send_if_modified(|state| {
                if *state == ConnectionState::Connected {
                    *state = ConnectionState::Ready;
                    true
                } else {
                    false
                }
            });
            if became_ready {
                tracing::info!(session_id = ?session.id, "session ready");
            }
        }
        ServerEvent::Error { error, .. } => {
            tracing::warn!("server error: {}", error.message);
            // Audio sent before the session was ready (or after it was
            // invalidated) would otherwise produce an unbounded stream of
            // violations; cut the source off locally.
            if error.is_audio_protocol_violation() {
                let stopped = ctx
                    .capture
                    .lock()
                    .is_ok_and(|guard| guard.stop());
                if stopped {
                    tracing::warn!("stopped audio capture after audio protocol violation");
                }
            }
        }
        ServerEvent::Unknown(value) => {
            tracing::debug!(
                "unhandled event type: {}",
                value.get("type").and_then(|v| v.as_str()).unwrap_or("<none>")
            );
        }
        _ => {}
    }

    let _ = ctx.events_tx.send(SessionEvent::Server(event));
}

fn handle_close(ctx: &DispatchContext, code: u16, raw_reason: &str) {
    let (reason, kind) = close_reason(code, raw_reason);
    tracing::info!(code, %reason, "connection closed");
    // Record the classification before the state flips so waiters that
    // wake on the transition can read it.
    if let Ok(mut guard) = ctx.disconnect.lock() {
        *guard = Some(DisconnectInfo {
            reason: reason.clone(),
            kind,
        });
    }
    let _ = ctx.state_tx.send(ConnectionState::Closed);
    let _ = ctx.events_tx.send(SessionEvent::Disconnected { code, reason });
}

fn truncate_for_log(s: &str) -> &str {
    if s.len() <= TRACE_LOG_MAX_BYTES {
        return s;
    }
    let mut end = TRACE_LOG_MAX_BYTES;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
