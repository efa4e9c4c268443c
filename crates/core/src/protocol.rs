//! DevTools protocol connection: request/response correlation over a
//! message transport.
//!
//! Commands are JSON objects `{id, method, params}`; the browser answers with
//! `{id, result}` or `{id, error}` and interleaves unsolicited events that
//! carry a `method` but no `id`. The connection correlates responses by id
//! through oneshot channels and exposes the one event the conversion pipeline
//! cares about, `Page.loadEventFired`, as a single-use waiter.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::{Notify, mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Outbound half of a protocol transport.
pub trait Transport: Send {
    fn send(&mut self, message: Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Everything needed to build a [`CdpConnection`]: the boxed sender and the
/// channel on which inbound messages arrive. The reader that feeds
/// `message_rx` runs elsewhere; dropping its sender signals disconnect.
pub struct TransportParts {
    pub sender: Box<dyn Transport>,
    pub message_rx: mpsc::UnboundedReceiver<Value>,
}

/// A live protocol connection to one page target.
///
/// Liveness starts true and flips to false exactly once, when the inbound
/// stream ends; it never flips back. Every command entry point reads the flag
/// first and fails fast with [`Error::NotConnected`] once it is down.
pub struct CdpConnection {
    next_id: AtomicU32,
    alive: AtomicBool,
    sender: tokio::sync::Mutex<Box<dyn Transport>>,
    callbacks: Mutex<HashMap<u32, oneshot::Sender<Result<Value>>>>,
    load_waiters: Mutex<Vec<oneshot::Sender<()>>>,
    message_rx: Mutex<Option<mpsc::UnboundedReceiver<Value>>>,
    disconnected: Notify,
}

impl CdpConnection {
    pub fn new(parts: TransportParts) -> Self {
        Self {
            next_id: AtomicU32::new(1),
            alive: AtomicBool::new(true),
            sender: tokio::sync::Mutex::new(parts.sender),
            callbacks: Mutex::new(HashMap::new()),
            load_waiters: Mutex::new(Vec::new()),
            message_rx: Mutex::new(Some(parts.message_rx)),
            disconnected: Notify::new(),
        }
    }

    /// Whether the connection is still usable. A stale read is harmless: the
    /// failing command reports the disconnect instead.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Resolves once the connection has gone down. Returns immediately if it
    /// already has.
    pub async fn closed(&self) {
        let notified = self.disconnected.notified();
        if !self.is_alive() {
            return;
        }
        notified.await;
    }

    /// Dispatch loop: correlates responses and fans out events until the
    /// transport ends, then fails everything still pending. Spawn this once
    /// per connection.
    pub async fn run(&self) {
        let mut message_rx = self
            .message_rx
            .lock()
            .take()
            .expect("run() may only be called once");

        while let Some(message) = message_rx.recv().await {
            self.dispatch(message);
        }

        debug!("transport closed, marking connection dead");
        self.alive.store(false, Ordering::SeqCst);
        let pending: Vec<_> = {
            let mut callbacks = self.callbacks.lock();
            callbacks.drain().map(|(_, tx)| tx).collect()
        };
        for callback in pending {
            let _ = callback.send(Err(Error::Protocol(
                "connection closed before response".into(),
            )));
        }
        // Dropping the waiters makes every pending load wait fail.
        self.load_waiters.lock().clear();
        self.disconnected.notify_waiters();
    }

    fn dispatch(&self, message: Value) {
        if let Some(id) = message.get("id").and_then(Value::as_u64) {
            let callback = self.callbacks.lock().remove(&(id as u32));
            let Some(callback) = callback else {
                debug!(id, "dropping response with no pending request");
                return;
            };
            let result = match message.get("error") {
                Some(error) => {
                    let reason = error
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown protocol error");
                    Err(Error::Protocol(reason.to_string()))
                }
                None => Ok(message.get("result").cloned().unwrap_or(Value::Null)),
            };
            let _ = callback.send(result);
            return;
        }

        match message.get("method").and_then(Value::as_str) {
            Some("Page.loadEventFired") => {
                for waiter in self.load_waiters.lock().drain(..) {
                    let _ = waiter.send(());
                }
            }
            Some(method) => debug!(method, "ignoring event"),
            None => warn!("discarding message without id or method"),
        }
    }

    /// Sends a command and awaits its response.
    pub async fn execute(&self, method: &str, params: Value) -> Result<Value> {
        if !self.is_alive() {
            return Err(Error::NotConnected);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.callbacks.lock().insert(id, tx);

        // The dispatch loop may have ended and drained the callback map
        // between the liveness check above and the insert; a callback
        // registered after that drain would never be failed.
        if !self.is_alive() {
            self.callbacks.lock().remove(&id);
            return Err(Error::NotConnected);
        }

        debug!(id, method, "sending command");
        let message = json!({ "id": id, "method": method, "params": params });
        if let Err(err) = self.sender.lock().await.send(message).await {
            self.callbacks.lock().remove(&id);
            return Err(err);
        }

        rx.await
            .map_err(|_| Error::Protocol("connection closed before response".into()))?
    }

    /// Registers a single-use waiter for the next `Page.loadEventFired`.
    /// Register before navigating so the event cannot slip past between the
    /// navigate response and the wait.
    pub fn subscribe_load_event(&self) -> LoadEvent {
        let (tx, rx) = oneshot::channel();
        self.load_waiters.lock().push(tx);
        LoadEvent { receiver: rx }
    }

    /// Closes the outbound transport. The read side winds down on its own
    /// and flips liveness through the dispatch loop.
    pub async fn close(&self) -> Result<()> {
        self.sender.lock().await.close().await
    }
}

/// One-shot subscription to the next load-complete event. There is no
/// timeout: a page that never finishes loading suspends the holder until the
/// connection itself goes down.
pub struct LoadEvent {
    receiver: oneshot::Receiver<()>,
}

impl LoadEvent {
    pub async fn wait(self) -> Result<()> {
        self.receiver.await.map_err(|_| {
            Error::Protocol("connection closed while waiting for load event".into())
        })
    }
}

struct WebSocketSender {
    sink: futures_util::stream::SplitSink<
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        Message,
    >,
}

impl Transport for WebSocketSender {
    fn send(&mut self, message: Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.sink
                .send(Message::Text(message.to_string()))
                .await
                .map_err(|e| Error::Protocol(format!("websocket send failed: {e}")))
        })
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.sink
                .close()
                .await
                .map_err(|e| Error::Dispose(format!("websocket close failed: {e}")))
        })
    }
}

/// Connects to a page target's `webSocketDebuggerUrl` and spawns the read
/// loop that feeds inbound frames to the dispatch loop.
pub(crate) async fn connect(ws_url: &str) -> Result<TransportParts> {
    let (socket, _) = connect_async(ws_url)
        .await
        .map_err(|e| Error::Connection(format!("websocket handshake with {ws_url} failed: {e}")))?;
    let (sink, mut stream) = socket.split();
    let (message_tx, message_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Text(text)) => match serde_json::from_str::<Value>(&text) {
                    Ok(value) => {
                        if message_tx.send(value).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "discarding unparseable frame"),
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    debug!(error = %e, "websocket read failed");
                    break;
                }
            }
        }
        // Dropping message_tx ends the dispatch loop and flips liveness.
    });

    Ok(TransportParts {
        sender: Box::new(WebSocketSender { sink }),
        message_rx,
    })
}
