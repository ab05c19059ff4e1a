//! WebSocket connection to a ClearNode.
//!
//! One socket, one supervisor task. The supervisor pumps outbound frames,
//! dispatches inbound ones, and on an unexpected drop runs the reconnect
//! loop (`delay(k) = initial · 2^(k−1)`) until the socket is back or the
//! attempt budget is spent.
//!
//! Replies are correlated by **method name**: the earliest pending request
//! whose method matches the reply's method receives it. Two in-flight
//! requests with the same method are therefore resolved in FIFO order, which
//! is only correct if the relay answers in order; callers should keep method
//! names distinct per in-flight request.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use yellow_core::error::{Result, YellowError};
use yellow_core::types::{ReconnectConfig, YellowConfig};

use crate::rpc;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Callback for every inbound message. Errors are logged and discarded.
pub type MessageHandler = Arc<dyn Fn(&Value) -> Result<()> + Send + Sync>;

/// Callback for connection lifecycle events.
pub type ConnectionListener = Arc<dyn Fn(&ConnectionEvent) + Send + Sync>;

/// Connection lifecycle event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Socket is open (first connect or successful reconnect).
    Connected,
    /// Socket is gone for good (client disconnect or reconnects exhausted).
    Disconnected,
    /// A reconnect attempt is scheduled.
    Reconnecting {
        /// 1-based attempt number
        attempt: u32,
        /// Delay before the attempt
        delay: Duration,
    },
    /// Opening the socket failed.
    Error(String),
}

/// Current state of the socket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected.
    Idle,
    /// Initial connect in progress.
    Connecting,
    /// Socket open.
    Open,
    /// Dropped; reconnect loop running.
    Reconnecting,
    /// Closed by the client or after exhausting reconnects.
    Closed,
}

/// Transport settings.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// ClearNode WebSocket URL
    pub url: String,
    /// Socket open timeout
    pub connect_timeout: Duration,
    /// Default `send_and_wait` timeout
    pub request_timeout: Duration,
    /// Reconnection policy
    pub reconnect: ReconnectConfig,
}

impl From<&YellowConfig> for ConnectionConfig {
    fn from(config: &YellowConfig) -> Self {
        Self {
            url: config.ws_url.clone(),
            connect_timeout: config.connect_timeout(),
            request_timeout: config.request_timeout(),
            reconnect: config.reconnect.clone(),
        }
    }
}

struct PendingRequest {
    id: u64,
    method: String,
    reply: oneshot::Sender<Result<Value>>,
}

/// Why the pump loop returned.
enum PumpExit {
    Shutdown,
    Dropped(String),
}

struct Shared {
    config: ConnectionConfig,
    state: RwLock<ConnectionState>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    pending: Mutex<VecDeque<PendingRequest>>,
    handlers: RwLock<Vec<MessageHandler>>,
    listeners: RwLock<Vec<ConnectionListener>>,
    shutdown: Mutex<Option<Arc<Notify>>>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    disposed: AtomicBool,
    next_id: AtomicU64,
}

/// A single WebSocket connection to a ClearNode.
///
/// Cheap to clone; clones share the socket.
#[derive(Clone)]
pub struct ClearNodeConnection {
    shared: Arc<Shared>,
}

impl ClearNodeConnection {
    /// Creates an unconnected connection.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                state: RwLock::new(ConnectionState::Idle),
                outbound: Mutex::new(None),
                pending: Mutex::new(VecDeque::new()),
                handlers: RwLock::new(Vec::new()),
                listeners: RwLock::new(Vec::new()),
                shutdown: Mutex::new(None),
                supervisor: Mutex::new(None),
                disposed: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Returns the current socket state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.read()
    }

    /// Returns true if the socket is open.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Number of requests awaiting a reply.
    pub fn pending_count(&self) -> usize {
        self.shared.pending.lock().len()
    }

    /// Registers a handler for every inbound message.
    pub fn on_message(&self, handler: MessageHandler) {
        self.shared.handlers.write().push(handler);
    }

    /// Registers a lifecycle listener.
    pub fn on_event(&self, listener: ConnectionListener) {
        self.shared.listeners.write().push(listener);
    }

    /// Opens the socket.
    ///
    /// Resolves once the socket is open. Fails if opening errors or the peer
    /// closes before the handshake completes. A no-op if already open. A
    /// reconnect loop still running from an earlier drop is stopped first.
    pub async fn connect(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        let shared = &self.shared;
        shared.retire_supervisor().await;
        shared.disposed.store(false, Ordering::SeqCst);
        shared.set_state(ConnectionState::Connecting);
        info!(url = %shared.config.url, "Connecting to ClearNode");

        let stream = match shared.open_socket().await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "ClearNode connection failed");
                shared.set_state(ConnectionState::Closed);
                shared.emit(&ConnectionEvent::Error(e.to_string()));
                return Err(e);
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = Arc::new(Notify::new());
        *shared.outbound.lock() = Some(tx);
        *shared.shutdown.lock() = Some(shutdown.clone());

        shared.set_state(ConnectionState::Open);
        info!("Connected to ClearNode");
        shared.emit(&ConnectionEvent::Connected);

        let handle = tokio::spawn(supervise(shared.clone(), stream, rx, shutdown));
        *shared.supervisor.lock() = Some(handle);
        Ok(())
    }

    /// Sends a message without waiting for a reply.
    pub fn send(&self, message: &Value) -> Result<()> {
        self.shared.send_text(message.to_string())
    }

    /// Sends a message and waits for the reply whose method is `method`.
    ///
    /// Uses the configured request timeout when `timeout` is `None`.
    pub async fn send_and_wait(
        &self,
        message: &Value,
        method: &str,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let shared = &self.shared;
        let (tx, rx) = oneshot::channel();
        let id = shared.next_id.fetch_add(1, Ordering::Relaxed);
        shared.pending.lock().push_back(PendingRequest {
            id,
            method: method.to_string(),
            reply: tx,
        });

        if let Err(e) = self.send(message) {
            shared.remove_pending(id);
            return Err(e);
        }

        let timeout = timeout.unwrap_or(shared.config.request_timeout);
        debug!(method, id, timeout_ms = timeout.as_millis() as u64, "Awaiting reply");

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(YellowError::NotConnected),
            Err(_) => {
                shared.remove_pending(id);
                Err(YellowError::Timeout {
                    method: method.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Closes the connection.
    ///
    /// Marks the connection disposed so no reconnect can start, stops the
    /// supervisor (which sends a close frame), rejects every pending request,
    /// and drops all message handlers. Safe to call repeatedly.
    pub fn disconnect(&self) {
        let shared = &self.shared;
        shared.disposed.store(true, Ordering::SeqCst);

        if let Some(shutdown) = shared.shutdown.lock().take() {
            shutdown.notify_one();
        }
        shared.supervisor.lock().take();
        shared.outbound.lock().take();

        shared.reject_all(|| YellowError::ClosedByClient);
        shared.handlers.write().clear();

        let was_closed = {
            let mut state = shared.state.write();
            let was = *state == ConnectionState::Closed || *state == ConnectionState::Idle;
            *state = ConnectionState::Closed;
            was
        };
        if !was_closed {
            info!("Disconnected from ClearNode");
            shared.emit(&ConnectionEvent::Disconnected);
        }
    }
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn emit(&self, event: &ConnectionEvent) {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener(event);
        }
    }

    async fn open_socket(&self) -> Result<WsStream> {
        let timeout = self.config.connect_timeout;
        let (stream, _) = tokio::time::timeout(timeout, connect_async(self.config.url.as_str()))
            .await
            .map_err(|_| {
                YellowError::ConnectionFailed(format!("timed out after {}ms", timeout.as_millis()))
            })?
            .map_err(|e| match e {
                tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                    YellowError::ClosedBeforeEstablished
                }
                other => YellowError::ConnectionFailed(other.to_string()),
            })?;
        Ok(stream)
    }

    fn send_text(&self, text: String) -> Result<()> {
        if *self.state.read() != ConnectionState::Open {
            return Err(YellowError::NotConnected);
        }
        let outbound = self.outbound.lock();
        let tx = outbound.as_ref().ok_or(YellowError::NotConnected)?;
        tx.send(Message::Text(text)).map_err(|_| YellowError::NotConnected)
    }

    /// Stops the current supervisor, if any, and waits for it to exit.
    async fn retire_supervisor(&self) {
        let shutdown = self.shutdown.lock().take();
        let handle = self.supervisor.lock().take();
        if let Some(shutdown) = shutdown {
            shutdown.notify_one();
        }
        if let Some(handle) = handle {
            debug!("Stopping previous supervisor");
            let _ = handle.await;
        }
        self.outbound.lock().take();
    }

    fn remove_pending(&self, id: u64) {
        self.pending.lock().retain(|p| p.id != id);
    }

    fn reject_all(&self, err: impl Fn() -> YellowError) {
        let drained: Vec<PendingRequest> = self.pending.lock().drain(..).collect();
        if !drained.is_empty() {
            debug!(count = drained.len(), "Rejecting pending requests");
        }
        for pending in drained {
            let _ = pending.reply.send(Err(err()));
        }
    }

    /// Parses and dispatches one inbound frame.
    fn dispatch(&self, text: &str) {
        let message: Value =
            serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()));

        if let Some(method) = rpc::extract_method(&message) {
            let matched = {
                let mut pending = self.pending.lock();
                pending
                    .iter()
                    .position(|p| p.method == method)
                    .and_then(|idx| pending.remove(idx))
            };
            if let Some(request) = matched {
                debug!(method, id = request.id, "Resolved pending request");
                let _ = request.reply.send(Ok(message.clone()));
            }
        }

        let handlers = self.handlers.read().clone();
        for handler in handlers {
            if let Err(e) = handler(&message) {
                debug!(error = %e, "Message handler failed");
            }
        }
    }

    /// Pumps frames until shutdown or an unexpected drop.
    async fn pump(
        &self,
        sink: &mut WsSink,
        source: &mut WsSource,
        outbound: &mut mpsc::UnboundedReceiver<Message>,
        shutdown: &Notify,
    ) -> PumpExit {
        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    let _ = sink.send(Message::Close(None)).await;
                    let _ = sink.close().await;
                    return PumpExit::Shutdown;
                }
                out = outbound.recv() => match out {
                    Some(frame) => {
                        if let Err(e) = sink.send(frame).await {
                            return PumpExit::Dropped(e.to_string());
                        }
                    }
                    None => return PumpExit::Shutdown,
                },
                incoming = source.next() => match incoming {
                    Some(Ok(Message::Text(text))) => self.dispatch(&text),
                    Some(Ok(Message::Binary(bytes))) => self.dispatch(&String::from_utf8_lossy(&bytes)),
                    Some(Ok(Message::Close(frame))) => {
                        return PumpExit::Dropped(format!("closed by peer: {frame:?}"));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return PumpExit::Dropped(e.to_string()),
                    None => return PumpExit::Dropped("stream ended".into()),
                },
            }
        }
    }

    /// Runs the backoff loop. Returns a fresh socket, or `None` if shut down
    /// or out of attempts (in which case pending requests are rejected and
    /// `Disconnected` is emitted).
    async fn reconnect(&self, shutdown: &Notify) -> Option<WsStream> {
        let policy = &self.config.reconnect;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            if attempt > policy.max_attempts {
                warn!(attempts = policy.max_attempts, "Reconnection exhausted");
                self.reject_all(|| YellowError::ReconnectExhausted {
                    attempts: policy.max_attempts,
                });
                self.set_state(ConnectionState::Closed);
                self.emit(&ConnectionEvent::Disconnected);
                return None;
            }

            let delay = policy.delay_for_attempt(attempt);
            info!(attempt, delay_ms = delay.as_millis() as u64, "Scheduling reconnect");
            self.emit(&ConnectionEvent::Reconnecting { attempt, delay });

            tokio::select! {
                _ = shutdown.notified() => return None,
                _ = tokio::time::sleep(delay) => {}
            }
            if self.is_disposed() {
                return None;
            }

            let result = tokio::select! {
                _ = shutdown.notified() => return None,
                result = self.open_socket() => result,
            };
            match result {
                Ok(stream) => return Some(stream),
                Err(e) => warn!(attempt, error = %e, "Reconnect attempt failed"),
            }
        }
    }
}

/// Owns the socket for its whole life, across reconnects.
async fn supervise(
    shared: Arc<Shared>,
    stream: WsStream,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    shutdown: Arc<Notify>,
) {
    let (mut sink, mut source) = stream.split();

    loop {
        let reason = match shared.pump(&mut sink, &mut source, &mut outbound, &shutdown).await {
            PumpExit::Shutdown => return,
            PumpExit::Dropped(reason) => reason,
        };
        if shared.is_disposed() {
            return;
        }
        warn!(reason = %reason, "ClearNode connection dropped");

        if !shared.config.reconnect.enabled {
            shared.reject_all(|| YellowError::WebSocket(reason.clone()));
            shared.set_state(ConnectionState::Closed);
            shared.emit(&ConnectionEvent::Disconnected);
            return;
        }

        shared.set_state(ConnectionState::Reconnecting);
        match shared.reconnect(&shutdown).await {
            Some(stream) => {
                // frames queued while down were never accepted by `send`
                while outbound.try_recv().is_ok() {}
                (sink, source) = stream.split();
                shared.set_state(ConnectionState::Open);
                info!("Reconnected to ClearNode");
                shared.emit(&ConnectionEvent::Connected);
            }
            None => return,
        }
    }
}
