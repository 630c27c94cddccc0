//! A shared default connection.
//!
//! [`ConnectionRegistry`] suits applications that want one implicit
//! connection instead of passing a [`SocketConnection`] around. Registries
//! are ordinary values: create one per logical client and share it behind an
//! `Arc` or a `static` of your own. Two registries never share a URL, options,
//! headers, or connection.

use std::sync::Arc;

use parking_lot::Mutex;
use sockreq_core::logging::targets;

use crate::connection::SocketConnection;
use crate::error::{Result, SocketError};
use crate::headers::{Headers, SharedHeaders};
use crate::options::TransportOptions;
use crate::transport::TransportFactory;

#[derive(Default)]
struct RegistryEntry {
    url: Option<String>,
    options: TransportOptions,
    connection: Option<SocketConnection>,
    reset_pending: bool,
}

impl RegistryEntry {
    fn live_connection_is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(SocketConnection::is_connected)
    }
}

/// Holds the default URL, options, and global headers, and lazily builds the
/// connection they describe.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use sockreq::ConnectionRegistry;
/// use sockreq::transport::LoopbackFactory;
///
/// let registry = ConnectionRegistry::new("api", Arc::new(LoopbackFactory::new()));
/// assert!(registry.socket().is_err());
///
/// registry.set_url("http://localhost:1337").unwrap();
/// let socket = registry.socket().unwrap();
/// assert!(socket.ptr_eq(&registry.socket().unwrap()));
/// ```
pub struct ConnectionRegistry {
    name: String,
    factory: Arc<dyn TransportFactory>,
    entry: Mutex<RegistryEntry>,
    headers: SharedHeaders,
}

impl ConnectionRegistry {
    /// Create an empty registry that opens transports through `factory`.
    pub fn new(name: impl Into<String>, factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            name: name.into(),
            factory,
            entry: Mutex::new(RegistryEntry::default()),
            headers: SharedHeaders::default(),
        }
    }

    /// Get the registry name, used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the URL used for the next connection.
    pub fn set_url(&self, url: impl Into<String>) -> Result<()> {
        let mut entry = self.entry.lock();
        if entry.live_connection_is_connected() {
            return Err(SocketError::StateConflict(
                "Can not change url while socket is connected".into(),
            ));
        }
        let url = url.into();
        tracing::debug!(target: targets::REGISTRY, registry = %self.name, %url, "url updated");
        entry.url = Some(url);
        Ok(())
    }

    /// Get the configured URL.
    pub fn url(&self) -> Option<String> {
        self.entry.lock().url.clone()
    }

    /// Set the transport options used for the next connection.
    pub fn set_options(&self, options: TransportOptions) -> Result<()> {
        let mut entry = self.entry.lock();
        if entry.live_connection_is_connected() {
            return Err(SocketError::StateConflict(
                "Can not change options while socket is connected".into(),
            ));
        }
        entry.options = options;
        Ok(())
    }

    /// Get the configured transport options.
    pub fn options(&self) -> TransportOptions {
        self.entry.lock().options.clone()
    }

    /// Replace the global headers. An empty map is ignored.
    ///
    /// Global headers are read at request time, so the change applies to
    /// every later request on connections built by this registry.
    pub fn set_headers(&self, headers: Headers) {
        if headers.is_empty() {
            return;
        }
        *self.headers.write() = headers;
    }

    /// Get a copy of the global headers.
    pub fn headers(&self) -> Headers {
        self.headers.read().clone()
    }

    /// Get the shared connection, building it on first use.
    ///
    /// A new connection is also built when [`reset_next_connection`] was
    /// called and the current one is not connected; it is opened with
    /// `force_new` set. Fails with [`SocketError::MissingConfiguration`] if
    /// no URL was ever set.
    ///
    /// [`reset_next_connection`]: Self::reset_next_connection
    pub fn socket(&self) -> Result<SocketConnection> {
        let mut entry = self.entry.lock();
        let url = entry
            .url
            .clone()
            .ok_or_else(|| SocketError::MissingConfiguration("Url must be initialized".into()))?;

        if let Some(current) = &entry.connection {
            if !entry.reset_pending || current.is_connected() {
                return Ok(current.clone());
            }
            // Stop a stale attempt so it cannot connect behind the new one.
            if current.state().is_attempting() {
                if let Err(err) = current.disconnect() {
                    tracing::debug!(target: targets::REGISTRY, registry = %self.name, error = %err, "stale connection already stopped");
                }
            }
        }

        let mut options = entry.options.clone();
        if entry.reset_pending {
            options.force_new = true;
        }
        let connection =
            SocketConnection::open(&url, options, self.factory.as_ref(), Arc::clone(&self.headers))?;

        tracing::debug!(
            target: targets::REGISTRY,
            registry = %self.name,
            %url,
            replaced = entry.connection.is_some(),
            "built shared connection"
        );
        entry.reset_pending = false;
        entry.connection = Some(connection.clone());
        Ok(connection)
    }

    /// Make the next [`socket`](Self::socket) call build a fresh connection
    /// if the current one is not connected.
    pub fn reset_next_connection(&self) {
        tracing::debug!(target: targets::REGISTRY, registry = %self.name, "next connection will be rebuilt");
        self.entry.lock().reset_pending = true;
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entry = self.entry.lock();
        f.debug_struct("ConnectionRegistry")
            .field("name", &self.name)
            .field("url", &entry.url)
            .field("connection", &entry.connection)
            .field("reset_pending", &entry.reset_pending)
            .finish()
    }
}
