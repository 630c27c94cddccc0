//! The narrow interface this crate consumes from a socket transport.
//!
//! A transport owns framing, handshakes, and reconnection backoff. The
//! virtual-request layer only needs to:
//!
//! - start and stop the connection
//! - observe lifecycle events ([`TransportEvent`])
//! - emit a named message with a one-shot acknowledgment callback
//!
//! [`LoopbackTransport`] is an in-memory implementation for tests and
//! offline use.

mod loopback;

use std::sync::Arc;

use serde_json::Value;
use sockreq_core::ListenerId;
use url::Url;

use crate::error::Result;
use crate::headers::HandshakeHeaders;
use crate::options::TransportOptions;

pub use loopback::{EmittedMessage, LoopbackFactory, LoopbackTransport, Router};
pub use sockreq_core::Listener;

/// One-shot callback invoked with the server's reply to an emitted message.
pub type Ack = Box<dyn FnOnce(Value) + Send + 'static>;

/// Lifecycle events published by every transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransportEvent {
    /// The connection was established.
    Connect,
    /// The connection was lost or closed.
    Disconnect,
    /// The transport is attempting to reconnect.
    Reconnecting,
    /// A reconnection attempt succeeded.
    Reconnect,
    /// A connection attempt failed.
    ConnectError,
}

impl TransportEvent {
    /// All lifecycle events.
    pub const ALL: [TransportEvent; 5] = [
        Self::Connect,
        Self::Disconnect,
        Self::Reconnecting,
        Self::Reconnect,
        Self::ConnectError,
    ];

    /// The event name used with [`Transport::on`].
    pub fn name(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::Reconnecting => "reconnecting",
            Self::Reconnect => "reconnect",
            Self::ConnectError => "connect_error",
        }
    }
}

impl std::fmt::Display for TransportEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A persistent, message-based connection to the server.
///
/// Implementations deliver events and acknowledgments on whatever execution
/// context they own. Listeners and acks may call back into the transport, so
/// implementations must not hold internal locks while invoking them.
pub trait Transport: Send + Sync {
    /// Begin connecting, sending `handshake` headers with the opening request.
    fn connect(&self, handshake: &HandshakeHeaders);

    /// Close the connection and stop any reconnection in progress.
    ///
    /// Must be a no-op on a transport that is already closed.
    fn disconnect(&self);

    /// Whether the underlying connection is currently open.
    fn is_connected(&self) -> bool;

    /// Register a listener for every occurrence of `event`.
    fn on(&self, event: &str, listener: Listener) -> ListenerId;

    /// Register a listener for the next occurrence of `event` only.
    fn once(&self, event: &str, listener: Listener) -> ListenerId;

    /// Remove a listener. Returns `true` if it was registered.
    fn off(&self, event: &str, id: ListenerId) -> bool;

    /// Send `payload` on `channel` and invoke `ack` once with the reply.
    ///
    /// If the server never replies, `ack` is never invoked.
    fn emit(&self, channel: &str, payload: Value, ack: Ack) -> Result<()>;
}

/// Opens transports for a URL and option set.
pub trait TransportFactory: Send + Sync {
    /// Open a transport. The connection is not started until
    /// [`Transport::connect`] is called.
    fn open(&self, url: &Url, options: &TransportOptions) -> Result<Arc<dyn Transport>>;
}
