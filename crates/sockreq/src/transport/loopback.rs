//! In-memory transport for tests and offline use.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Value, json};
use sockreq_core::logging::targets;
use sockreq_core::{EventEmitter, ListenerId};
use url::Url;

use super::{Ack, Listener, Transport, TransportEvent, TransportFactory};
use crate::error::{Result, SocketError};
use crate::headers::HandshakeHeaders;
use crate::options::TransportOptions;

/// Computes an immediate reply for an emitted message.
///
/// Receives the channel name and payload. Returning `None` leaves the
/// acknowledgment pending until [`LoopbackTransport::acknowledge`] is called.
pub type Router = Arc<dyn Fn(&str, &Value) -> Option<Value> + Send + Sync>;

/// A message recorded by [`LoopbackTransport::emit`].
#[derive(Clone, Debug, PartialEq)]
pub struct EmittedMessage {
    /// Acknowledgment id, unique per transport.
    pub id: u64,
    /// Channel the message was emitted on.
    pub channel: String,
    /// Message payload.
    pub payload: Value,
}

struct LoopbackState {
    connected: bool,
    /// Set by the client's `disconnect()`; stops reconnection until `connect()`.
    closed: bool,
    auto_connect: bool,
    connect_calls: usize,
    disconnect_calls: usize,
    handshake: HandshakeHeaders,
    next_id: u64,
    pending: BTreeMap<u64, Ack>,
    emitted: Vec<EmittedMessage>,
    router: Option<Router>,
}

/// A transport that keeps everything in memory.
///
/// The test (or application) plays the server: it fires lifecycle events,
/// inspects emitted messages, and answers acknowledgments either through a
/// [`Router`] or explicitly by id.
///
/// With auto-connect enabled (the default), [`Transport::connect`] succeeds
/// immediately and fires `connect`.
///
/// # Example
///
/// ```
/// use sockreq::transport::{LoopbackTransport, Transport};
/// use sockreq::TransportOptions;
/// use serde_json::json;
///
/// let transport = LoopbackTransport::new("http://localhost:1337".parse().unwrap(), TransportOptions::new());
/// transport.connect(&Default::default());
/// transport.emit("get", json!({"url": "/hello"}), Box::new(|reply| println!("{reply}"))).unwrap();
///
/// let id = transport.emitted()[0].id;
/// assert!(transport.acknowledge(id, json!({"statusCode": 200, "headers": {}, "body": "world"})));
/// ```
pub struct LoopbackTransport {
    url: Url,
    options: TransportOptions,
    events: EventEmitter,
    state: Mutex<LoopbackState>,
}

impl LoopbackTransport {
    /// Create a disconnected transport.
    pub fn new(url: Url, options: TransportOptions) -> Self {
        Self {
            url,
            options,
            events: EventEmitter::new(),
            state: Mutex::new(LoopbackState {
                connected: false,
                closed: false,
                auto_connect: true,
                connect_calls: 0,
                disconnect_calls: 0,
                handshake: HandshakeHeaders::new(),
                next_id: 1,
                pending: BTreeMap::new(),
                emitted: Vec::new(),
                router: None,
            }),
        }
    }

    /// The URL the transport was opened with.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The options the transport was opened with.
    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    /// Answer every emitted message through `router`.
    pub fn set_router<F>(&self, router: F)
    where
        F: Fn(&str, &Value) -> Option<Value> + Send + Sync + 'static,
    {
        self.state.lock().router = Some(Arc::new(router));
    }

    pub(crate) fn set_shared_router(&self, router: Option<Router>) {
        self.state.lock().router = router;
    }

    /// Choose whether [`Transport::connect`] connects immediately.
    ///
    /// When disabled, the connection only opens via
    /// [`simulate_connect`](Self::simulate_connect).
    pub fn set_auto_connect(&self, auto_connect: bool) {
        self.state.lock().auto_connect = auto_connect;
    }

    fn fire_lifecycle(&self, event: TransportEvent, payload: Value) -> usize {
        tracing::debug!(target: targets::TRANSPORT, url = %self.url, %event, "loopback lifecycle event");
        self.events.emit(event.name(), &payload)
    }

    /// Open the connection and fire `connect`.
    pub fn simulate_connect(&self) {
        self.state.lock().connected = true;
        self.fire_lifecycle(TransportEvent::Connect, Value::Null);
    }

    /// Drop the connection and fire `disconnect`.
    pub fn simulate_disconnect(&self) {
        self.state.lock().connected = false;
        self.fire_lifecycle(TransportEvent::Disconnect, json!("transport close"));
    }

    /// Fire `reconnecting` for the given attempt number.
    ///
    /// Ignored after the client closed the transport.
    pub fn simulate_reconnecting(&self, attempt: u32) -> bool {
        {
            let mut state = self.state.lock();
            if state.closed {
                return false;
            }
            state.connected = false;
        }
        self.fire_lifecycle(TransportEvent::Reconnecting, json!(attempt));
        true
    }

    /// Re-open the connection and fire `reconnect`.
    ///
    /// Ignored after the client closed the transport.
    pub fn simulate_reconnect(&self, attempt: u32) -> bool {
        {
            let mut state = self.state.lock();
            if state.closed {
                tracing::trace!(target: targets::TRANSPORT, url = %self.url, "closed transport does not reconnect");
                return false;
            }
            state.connected = true;
        }
        self.fire_lifecycle(TransportEvent::Reconnect, json!(attempt));
        true
    }

    /// Whether the client closed the transport with `disconnect()`.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Fail the connection attempt and fire `connect_error`.
    pub fn simulate_connect_error(&self, reason: &str) {
        self.state.lock().connected = false;
        self.fire_lifecycle(TransportEvent::ConnectError, json!(reason));
    }

    /// Deliver a server-pushed event. Returns the number of listeners invoked.
    pub fn fire(&self, event: &str, payload: &Value) -> usize {
        self.events.emit(event, payload)
    }

    /// Reply to a pending acknowledgment.
    ///
    /// Returns `false` if `id` is unknown or was already answered.
    pub fn acknowledge(&self, id: u64, reply: Value) -> bool {
        let ack = self.state.lock().pending.remove(&id);
        match ack {
            Some(ack) => {
                ack(reply);
                true
            }
            None => false,
        }
    }

    /// Discard every pending acknowledgment without replying.
    pub fn drop_pending(&self) -> usize {
        let dropped = std::mem::take(&mut self.state.lock().pending);
        dropped.len()
    }

    /// Every message emitted so far, oldest first.
    pub fn emitted(&self) -> Vec<EmittedMessage> {
        self.state.lock().emitted.clone()
    }

    /// Ids of messages still awaiting an acknowledgment.
    pub fn pending_ids(&self) -> Vec<u64> {
        self.state.lock().pending.keys().copied().collect()
    }

    /// How many times [`Transport::connect`] was called.
    pub fn connect_calls(&self) -> usize {
        self.state.lock().connect_calls
    }

    /// How many times [`Transport::disconnect`] was called.
    pub fn disconnect_calls(&self) -> usize {
        self.state.lock().disconnect_calls
    }

    /// Handshake headers passed to the most recent connect.
    pub fn handshake_headers(&self) -> HandshakeHeaders {
        self.state.lock().handshake.clone()
    }

    /// Number of listeners registered for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.events.listener_count(event)
    }
}

impl Transport for LoopbackTransport {
    fn connect(&self, handshake: &HandshakeHeaders) {
        let opened = {
            let mut state = self.state.lock();
            state.connect_calls += 1;
            state.closed = false;
            state.handshake = handshake.clone();
            if state.auto_connect && !state.connected {
                state.connected = true;
                true
            } else {
                false
            }
        };
        if opened {
            self.fire_lifecycle(TransportEvent::Connect, Value::Null);
        }
    }

    fn disconnect(&self) {
        let was_connected = {
            let mut state = self.state.lock();
            state.disconnect_calls += 1;
            state.closed = true;
            std::mem::replace(&mut state.connected, false)
        };
        if was_connected {
            self.fire_lifecycle(TransportEvent::Disconnect, json!("io client disconnect"));
        }
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn on(&self, event: &str, listener: Listener) -> ListenerId {
        self.events.on(event, listener)
    }

    fn once(&self, event: &str, listener: Listener) -> ListenerId {
        self.events.once(event, listener)
    }

    fn off(&self, event: &str, id: ListenerId) -> bool {
        self.events.off(event, id)
    }

    fn emit(&self, channel: &str, payload: Value, ack: Ack) -> Result<()> {
        let router = self.state.lock().router.clone();
        let reply = router.and_then(|router| router(channel, &payload));

        {
            let mut state = self.state.lock();
            if !state.connected {
                return Err(SocketError::Transport(format!(
                    "cannot emit on {channel}: socket is not connected"
                )));
            }
            let id = state.next_id;
            state.next_id += 1;
            state.emitted.push(EmittedMessage {
                id,
                channel: channel.to_string(),
                payload,
            });
            if reply.is_none() {
                state.pending.insert(id, ack);
                return Ok(());
            }
        }

        if let Some(reply) = reply {
            ack(reply);
        }
        Ok(())
    }
}

impl std::fmt::Debug for LoopbackTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("LoopbackTransport")
            .field("url", &self.url.as_str())
            .field("connected", &state.connected)
            .field("emitted", &state.emitted.len())
            .field("pending", &state.pending.len())
            .finish()
    }
}

/// Opens [`LoopbackTransport`]s and remembers each one.
pub struct LoopbackFactory {
    router: Option<Router>,
    auto_connect: bool,
    opened: Mutex<Vec<Arc<LoopbackTransport>>>,
}

impl Default for LoopbackFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackFactory {
    /// Create a factory whose transports auto-connect and never auto-reply.
    pub fn new() -> Self {
        Self {
            router: None,
            auto_connect: true,
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Give every opened transport the same router.
    pub fn with_router<F>(mut self, router: F) -> Self
    where
        F: Fn(&str, &Value) -> Option<Value> + Send + Sync + 'static,
    {
        self.router = Some(Arc::new(router));
        self
    }

    /// Open transports that wait for [`LoopbackTransport::simulate_connect`].
    pub fn manual_connect(mut self) -> Self {
        self.auto_connect = false;
        self
    }

    /// Every transport opened so far, oldest first.
    pub fn transports(&self) -> Vec<Arc<LoopbackTransport>> {
        self.opened.lock().clone()
    }

    /// The most recently opened transport.
    pub fn last(&self) -> Option<Arc<LoopbackTransport>> {
        self.opened.lock().last().cloned()
    }
}

impl TransportFactory for LoopbackFactory {
    fn open(&self, url: &Url, options: &TransportOptions) -> Result<Arc<dyn Transport>> {
        let transport = Arc::new(LoopbackTransport::new(url.clone(), options.clone()));
        transport.set_auto_connect(self.auto_connect);
        transport.set_shared_router(self.router.clone());

        tracing::debug!(target: targets::TRANSPORT, %url, "opened loopback transport");
        self.opened.lock().push(transport.clone());
        Ok(transport as Arc<dyn Transport>)
    }
}

impl std::fmt::Debug for LoopbackFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackFactory")
            .field("auto_connect", &self.auto_connect)
            .field("opened", &self.opened.lock().len())
            .finish()
    }
}
