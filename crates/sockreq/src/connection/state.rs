//! Connection state.

/// Lifecycle state of a [`SocketConnection`](super::SocketConnection).
///
/// Only transport lifecycle events move a connection between states, apart
/// from `connect()`/`reconnect()` entering `Connecting` and `disconnect()`
/// abandoning an attempt in progress.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Not connected to any server.
    #[default]
    Disconnected,
    /// `connect()` was called and the transport has not reported back yet.
    Connecting,
    /// Connected; requests are emitted immediately.
    Connected,
    /// Connection lost, the transport is attempting to reconnect.
    Reconnecting,
}

impl ConnectionState {
    /// Whether a connection attempt is in progress.
    pub fn is_attempting(self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Reconnecting => write!(f, "Reconnecting"),
        }
    }
}
