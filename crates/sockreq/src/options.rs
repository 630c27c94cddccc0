//! Transport configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Query key announcing the client protocol version to the server.
pub const SDK_VERSION_KEY: &str = "__sails_io_sdk_version";

/// Client protocol version sent under [`SDK_VERSION_KEY`].
pub const SDK_VERSION_VALUE: &str = "0.13.7";

/// Options handed to the transport when a connection is opened.
///
/// This layer only reads `query` (to add the version marker) and sets
/// `force_new` when a registry replaces a stale connection. Everything else
/// is passed through to the transport untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportOptions {
    /// Raw query string appended to the connection URL, without a leading `?`.
    pub query: Option<String>,
    /// Ask the transport not to reuse an existing underlying connection.
    pub force_new: bool,
    /// Connection timeout enforced by the transport.
    pub timeout: Option<Duration>,
    /// Arbitrary transport-specific settings.
    pub extra: Map<String, Value>,
}

impl TransportOptions {
    /// Create options with transport defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the raw query string.
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Force a fresh underlying connection.
    pub fn force_new(mut self, force_new: bool) -> Self {
        self.force_new = force_new;
        self
    }

    /// Set the connection timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set a transport-specific option.
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// The query string including the client version marker.
    ///
    /// ```
    /// use sockreq::TransportOptions;
    ///
    /// assert_eq!(TransportOptions::new().effective_query(), "__sails_io_sdk_version=0.13.7");
    /// assert_eq!(
    ///     TransportOptions::new().query("foo=bar").effective_query(),
    ///     "foo=bar&__sails_io_sdk_version=0.13.7"
    /// );
    /// ```
    pub fn effective_query(&self) -> String {
        let marker = format!("{SDK_VERSION_KEY}={SDK_VERSION_VALUE}");
        match self.query.as_deref().map(|q| q.trim_start_matches('?')) {
            Some(query) if !query.is_empty() => format!("{query}&{marker}"),
            _ => marker,
        }
    }

    /// A copy of these options with the version marker folded into `query`.
    pub(crate) fn for_transport(&self) -> Self {
        let mut options = self.clone();
        options.query = Some(self.effective_query());
        options
    }
}
