//! The virtual-request connection.

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use sockreq_core::ListenerId;
use sockreq_core::logging::targets;
use url::Url;

use super::pending::PendingResponse;
use super::state::ConnectionState;
use crate::error::{Result, SocketError};
use crate::headers::{self, HandshakeHeaders, Headers, RequestHeaders, SharedHeaders};
use crate::options::TransportOptions;
use crate::queue::RequestQueue;
use crate::request::{Method, VirtualRequest};
use crate::response::ResponseEnvelope;
use crate::transport::{Ack, Transport, TransportEvent, TransportFactory};

struct Shared {
    url: Url,
    options: TransportOptions,
    transport: Arc<dyn Transport>,
    state: Mutex<ConnectionState>,
    headers: RwLock<Headers>,
    global_headers: SharedHeaders,
    queue: RequestQueue,
    lifecycle: Mutex<Vec<(TransportEvent, ListenerId)>>,
}

/// Simulated HTTP over a single persistent socket.
///
/// Requests issued while the socket is not connected are queued and replayed,
/// in order, as soon as the transport reports `connect` or `reconnect`. Each
/// request's completion runs exactly once with the parsed reply, or never if
/// the server does not answer or the request is removed from the queue.
///
/// Cloning is cheap; clones share the same connection. Dropping the last
/// handle disconnects the transport.
///
/// # Example
///
/// ```
/// use sockreq::SocketConnection;
/// use sockreq::transport::LoopbackFactory;
/// use serde_json::json;
///
/// let factory = LoopbackFactory::new().with_router(|_, _| {
///     Some(json!({"statusCode": 200, "headers": {}, "body": "world"}))
/// });
/// let socket = SocketConnection::new("http://localhost:1337", &factory).unwrap();
///
/// socket.get(None, "/hello", None, |result| {
///     assert_eq!(result.unwrap().body_text(), Some("world"));
/// });
/// socket.connect().unwrap();
/// ```
#[derive(Clone)]
pub struct SocketConnection {
    shared: Arc<Shared>,
}

impl SocketConnection {
    /// Open a connection to `url` with default options.
    ///
    /// The connection starts disconnected; call [`connect`](Self::connect).
    pub fn new(url: &str, factory: &dyn TransportFactory) -> Result<Self> {
        Self::with_options(url, TransportOptions::default(), factory)
    }

    /// Open a connection to `url` with the given transport options.
    ///
    /// The client version marker is appended to the query the transport
    /// receives; `options()` still returns what the caller passed.
    pub fn with_options(
        url: &str,
        options: TransportOptions,
        factory: &dyn TransportFactory,
    ) -> Result<Self> {
        Self::open(url, options, factory, SharedHeaders::default())
    }

    /// Open a connection whose requests also carry `global_headers`.
    pub(crate) fn open(
        url: &str,
        options: TransportOptions,
        factory: &dyn TransportFactory,
        global_headers: SharedHeaders,
    ) -> Result<Self> {
        let url = Url::parse(url)?;
        let transport = factory.open(&url, &options.for_transport())?;
        Ok(Self::attach(url, options, transport, global_headers))
    }

    /// Wrap an already opened transport.
    ///
    /// The connection takes ownership of the transport's lifecycle: dropping
    /// the last handle disconnects it.
    pub fn from_transport(url: Url, options: TransportOptions, transport: Arc<dyn Transport>) -> Self {
        Self::attach(url, options, transport, SharedHeaders::default())
    }

    fn attach(
        url: Url,
        options: TransportOptions,
        transport: Arc<dyn Transport>,
        global_headers: SharedHeaders,
    ) -> Self {
        let shared = Arc::new(Shared {
            url,
            options,
            transport,
            state: Mutex::new(ConnectionState::Disconnected),
            headers: RwLock::new(Headers::new()),
            global_headers,
            queue: RequestQueue::new(),
            lifecycle: Mutex::new(Vec::new()),
        });

        let mut listeners = Vec::with_capacity(TransportEvent::ALL.len());
        for event in TransportEvent::ALL {
            let weak: Weak<Shared> = Arc::downgrade(&shared);
            let id = shared.transport.on(
                event.name(),
                Arc::new(move |payload: &Value| {
                    if let Some(shared) = weak.upgrade() {
                        shared.handle_lifecycle(event, payload);
                    }
                }),
            );
            listeners.push((event, id));
        }
        *shared.lifecycle.lock() = listeners;

        tracing::debug!(target: targets::CONNECTION, url = %shared.url, "socket connection created");
        Self { shared }
    }

    /// Start connecting.
    pub fn connect(&self) -> Result<()> {
        self.connect_with_headers(HandshakeHeaders::new())
    }

    /// Start connecting, sending `handshake` headers with the opening request.
    ///
    /// Fails with [`SocketError::AlreadyConnecting`] while an attempt is in
    /// flight and [`SocketError::AlreadyConnected`] once connected.
    pub fn connect_with_headers(&self, handshake: HandshakeHeaders) -> Result<()> {
        {
            let mut state = self.shared.state.lock();
            match *state {
                ConnectionState::Connecting => return Err(SocketError::AlreadyConnecting),
                ConnectionState::Connected => return Err(SocketError::AlreadyConnected),
                ConnectionState::Disconnected | ConnectionState::Reconnecting => {
                    *state = ConnectionState::Connecting;
                }
            }
        }

        tracing::debug!(target: targets::CONNECTION, url = %self.shared.url, "connecting");
        self.shared.transport.connect(&handshake);
        Ok(())
    }

    /// Re-open the transport after it was closed.
    pub fn reconnect(&self) -> Result<()> {
        if self.shared.transport.is_connected() {
            return Err(SocketError::AlreadyConnected);
        }
        {
            let mut state = self.shared.state.lock();
            if *state == ConnectionState::Connecting {
                return Err(SocketError::AlreadyConnecting);
            }
            *state = ConnectionState::Connecting;
        }

        tracing::debug!(target: targets::CONNECTION, url = %self.shared.url, "reconnecting");
        self.shared.transport.connect(&HandshakeHeaders::new());
        Ok(())
    }

    /// Close the connection, or abandon an attempt in progress.
    ///
    /// Queued requests stay queued. Fails with
    /// [`SocketError::AlreadyDisconnected`] if there is nothing to close.
    pub fn disconnect(&self) -> Result<()> {
        let abandoned = {
            let mut state = self.shared.state.lock();
            if state.is_attempting() {
                *state = ConnectionState::Disconnected;
                true
            } else {
                false
            }
        };
        if !abandoned && !self.shared.transport.is_connected() {
            return Err(SocketError::AlreadyDisconnected);
        }

        tracing::debug!(target: targets::CONNECTION, url = %self.shared.url, abandoned, "disconnecting");
        self.shared.transport.disconnect();
        Ok(())
    }

    /// Whether the connection is currently open.
    pub fn is_connected(&self) -> bool {
        *self.shared.state.lock() == ConnectionState::Connected
    }

    /// Get the current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    /// Get the server URL.
    pub fn url(&self) -> &Url {
        &self.shared.url
    }

    /// Get the transport options as supplied by the caller.
    pub fn options(&self) -> &TransportOptions {
        &self.shared.options
    }

    /// Replace the connection-level headers.
    ///
    /// An empty map is ignored. Affects requests built after this call only.
    pub fn set_headers(&self, headers: Headers) {
        if headers.is_empty() {
            tracing::trace!(target: targets::CONNECTION, "ignoring empty connection headers");
            return;
        }
        *self.shared.headers.write() = headers;
    }

    /// Remove every connection-level header.
    pub fn clear_headers(&self) {
        self.shared.headers.write().clear();
    }

    /// Get a copy of the connection-level headers.
    pub fn headers(&self) -> Headers {
        self.shared.headers.read().clone()
    }

    /// Listen for a server-pushed event.
    pub fn on<F>(&self, event: &str, handler: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.shared.transport.on(event, Arc::new(handler))
    }

    /// Listen for the next occurrence of a server-pushed event only.
    pub fn once<F>(&self, event: &str, handler: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.shared.transport.once(event, Arc::new(handler))
    }

    /// Stop listening. Returns `true` if the listener was registered.
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        self.shared.transport.off(event, id)
    }

    /// Issue a virtual request.
    ///
    /// Headers are merged global, then connection, then `extra_headers`;
    /// a `None` value in `extra_headers` removes that header. If the socket
    /// is not connected the request is queued until it is.
    pub fn request<F>(
        &self,
        tag: Option<&str>,
        method: Method,
        path: &str,
        params: Option<Value>,
        extra_headers: RequestHeaders,
        on_complete: F,
    ) where
        F: FnOnce(Result<ResponseEnvelope>) + Send + 'static,
    {
        let headers = {
            let global = self.shared.global_headers.read();
            let connection = self.shared.headers.read();
            headers::merge(&global, &connection, &extra_headers)
        };
        let request = VirtualRequest::new(
            tag.map(str::to_string),
            method,
            path,
            params,
            headers,
            Box::new(on_complete),
        );
        self.shared.submit(request);
    }

    /// Issue a `GET` request.
    pub fn get<F>(&self, tag: Option<&str>, path: &str, params: Option<Value>, on_complete: F)
    where
        F: FnOnce(Result<ResponseEnvelope>) + Send + 'static,
    {
        self.request(tag, Method::Get, path, params, RequestHeaders::new(), on_complete);
    }

    /// Issue a `POST` request.
    pub fn post<F>(&self, tag: Option<&str>, path: &str, params: Option<Value>, on_complete: F)
    where
        F: FnOnce(Result<ResponseEnvelope>) + Send + 'static,
    {
        self.request(tag, Method::Post, path, params, RequestHeaders::new(), on_complete);
    }

    /// Issue a `PUT` request.
    pub fn put<F>(&self, tag: Option<&str>, path: &str, params: Option<Value>, on_complete: F)
    where
        F: FnOnce(Result<ResponseEnvelope>) + Send + 'static,
    {
        self.request(tag, Method::Put, path, params, RequestHeaders::new(), on_complete);
    }

    /// Issue a `DELETE` request.
    pub fn delete<F>(&self, tag: Option<&str>, path: &str, params: Option<Value>, on_complete: F)
    where
        F: FnOnce(Result<ResponseEnvelope>) + Send + 'static,
    {
        self.request(tag, Method::Delete, path, params, RequestHeaders::new(), on_complete);
    }

    /// Issue a virtual request and await its reply.
    ///
    /// The returned future resolves to [`SocketError::Cancelled`] if the
    /// request is removed from the queue before it is sent.
    pub fn request_async(
        &self,
        tag: Option<&str>,
        method: Method,
        path: &str,
        params: Option<Value>,
        extra_headers: RequestHeaders,
    ) -> PendingResponse {
        let (complete, pending) = PendingResponse::pair();
        self.request(tag, method, path, params, extra_headers, complete);
        pending
    }

    /// Issue a `GET` request and await its reply.
    pub fn get_async(&self, tag: Option<&str>, path: &str, params: Option<Value>) -> PendingResponse {
        self.request_async(tag, Method::Get, path, params, RequestHeaders::new())
    }

    /// Issue a `POST` request and await its reply.
    pub fn post_async(&self, tag: Option<&str>, path: &str, params: Option<Value>) -> PendingResponse {
        self.request_async(tag, Method::Post, path, params, RequestHeaders::new())
    }

    /// Issue a `PUT` request and await its reply.
    pub fn put_async(&self, tag: Option<&str>, path: &str, params: Option<Value>) -> PendingResponse {
        self.request_async(tag, Method::Put, path, params, RequestHeaders::new())
    }

    /// Issue a `DELETE` request and await its reply.
    pub fn delete_async(&self, tag: Option<&str>, path: &str, params: Option<Value>) -> PendingResponse {
        self.request_async(tag, Method::Delete, path, params, RequestHeaders::new())
    }

    /// Drop queued requests carrying `tag`. Their completions never run.
    pub fn remove_requests_by_tag(&self, tag: &str) -> Result<usize> {
        self.shared.queue.remove_by_tag(tag)
    }

    /// Drop every queued request. Their completions never run.
    pub fn remove_all_requests(&self) -> usize {
        self.shared.queue.clear_all()
    }

    /// Number of requests waiting for the socket to connect.
    pub fn queued_requests(&self) -> usize {
        self.shared.queue.len()
    }

    /// Whether both handles refer to the same connection.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Shared {
    fn handle_lifecycle(&self, event: TransportEvent, payload: &Value) {
        match event {
            TransportEvent::Connect | TransportEvent::Reconnect => {
                let queued = {
                    let mut state = self.state.lock();
                    *state = ConnectionState::Connected;
                    self.queue.drain_all()
                };
                if event == TransportEvent::Connect {
                    tracing::debug!(target: targets::CONNECTION, url = %self.url, "now connected");
                } else {
                    tracing::debug!(target: targets::CONNECTION, url = %self.url, attempt = %payload, "reconnected successfully");
                }
                self.replay(queued);
            }
            TransportEvent::Disconnect => {
                *self.state.lock() = ConnectionState::Disconnected;
                tracing::warn!(target: targets::CONNECTION, url = %self.url, reason = %payload, "socket was disconnected");
            }
            TransportEvent::Reconnecting => {
                *self.state.lock() = ConnectionState::Reconnecting;
                tracing::debug!(target: targets::CONNECTION, url = %self.url, attempt = %payload, "trying to reconnect");
            }
            TransportEvent::ConnectError => {
                {
                    let mut state = self.state.lock();
                    if state.is_attempting() {
                        *state = ConnectionState::Disconnected;
                    }
                }
                tracing::error!(target: targets::CONNECTION, url = %self.url, error = %payload, "failed to connect");
            }
        }
    }

    /// Emit now if connected, otherwise queue.
    ///
    /// The queue check happens under the state lock so a request can never be
    /// queued after the connect handler has already drained.
    fn submit(&self, request: VirtualRequest) {
        {
            let state = self.state.lock();
            if *state != ConnectionState::Connected {
                self.queue.enqueue(request);
                return;
            }
        }
        self.emit(request);
    }

    fn replay(&self, queued: Vec<VirtualRequest>) {
        if queued.is_empty() {
            return;
        }
        tracing::debug!(target: targets::CONNECTION, count = queued.len(), "replaying queued requests");
        for request in queued {
            self.emit(request);
        }
    }

    fn emit(&self, request: VirtualRequest) {
        tracing::debug!(
            target: targets::CONNECTION,
            method = %request.method(),
            path = request.path(),
            "emitting virtual request"
        );
        let (channel, payload, completion) = request.into_emission();

        // Shared by the ack and the error path below; whichever runs first wins.
        let slot = Arc::new(Mutex::new(Some(completion)));
        let ack_slot = Arc::clone(&slot);
        let ack: Ack = Box::new(move |reply| {
            let Some(complete) = ack_slot.lock().take() else {
                return;
            };
            let result = ResponseEnvelope::from_reply(reply);
            if let Err(err) = &result {
                tracing::warn!(target: targets::CONNECTION, error = %err, "received malformed acknowledgment");
            }
            complete(result);
        });

        if let Err(err) = self.transport.emit(channel, payload, ack) {
            tracing::warn!(target: targets::CONNECTION, channel, error = %err, "failed to emit virtual request");
            let complete = slot.lock().take();
            if let Some(complete) = complete {
                complete(Err(err));
            }
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        for (event, id) in self.lifecycle.get_mut().drain(..) {
            self.transport.off(event.name(), id);
        }
        // The transport has no other owner that could close it.
        self.transport.disconnect();
        if !self.queue.is_empty() {
            tracing::debug!(
                target: targets::CONNECTION,
                url = %self.url,
                dropped = self.queue.len(),
                "connection dropped with queued requests"
            );
        }
    }
}

impl std::fmt::Debug for SocketConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketConnection")
            .field("url", &self.shared.url.as_str())
            .field("state", &self.state())
            .field("queued", &self.shared.queue.len())
            .finish()
    }
}
