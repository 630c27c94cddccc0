//! Header scopes and their merge rules.
//!
//! Three scopes contribute to the headers of every virtual request, lowest
//! precedence first:
//!
//! 1. registry-wide (global) headers
//! 2. per-connection headers
//! 3. per-request headers
//!
//! A per-request entry mapped to `None` deletes that header from the result
//! even when a lower scope sets it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

/// Header name to value mapping used by the global and connection scopes.
pub type Headers = HashMap<String, String>;

/// Per-request headers. `None` removes the header from the merged result.
pub type RequestHeaders = HashMap<String, Option<String>>;

/// Handshake headers sent once when the transport connects.
///
/// Each name may carry several values, e.g. multiple `cookie` lines.
pub type HandshakeHeaders = HashMap<String, Vec<String>>;

/// A header scope shared between a registry and the connections it creates.
pub type SharedHeaders = Arc<RwLock<Headers>>;

/// Merge the three header scopes into the effective request headers.
///
/// # Example
///
/// ```
/// use sockreq::headers::{merge, Headers, RequestHeaders};
///
/// let global = Headers::from([("x-one".into(), "foo".into()), ("x-two".into(), "bar".into())]);
/// let connection = Headers::from([("x-two".into(), "baz".into())]);
/// let request = RequestHeaders::from([("x-one".into(), None)]);
///
/// let merged = merge(&global, &connection, &request);
/// assert_eq!(merged.get("x-two").map(String::as_str), Some("baz"));
/// assert!(!merged.contains_key("x-one"));
/// ```
pub fn merge(global: &Headers, connection: &Headers, request: &RequestHeaders) -> Headers {
    let mut merged = global.clone();
    merged.extend(connection.iter().map(|(k, v)| (k.clone(), v.clone())));

    for (name, value) in request {
        match value {
            Some(value) => {
                merged.insert(name.clone(), value.clone());
            }
            None => {
                merged.remove(name);
            }
        }
    }
    merged
}

/// Lift plain headers into the per-request scope.
pub fn to_request_headers(headers: &Headers) -> RequestHeaders {
    headers
        .iter()
        .map(|(k, v)| (k.clone(), Some(v.clone())))
        .collect()
}
