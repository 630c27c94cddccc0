//! Virtual request types.

use serde_json::{Map, Value, json};

use crate::error::Result;
use crate::headers::Headers;
use crate::response::ResponseEnvelope;

/// Callback receiving the outcome of a virtual request, invoked at most once.
pub type Completion = Box<dyn FnOnce(Result<ResponseEnvelope>) + Send + 'static>;

/// HTTP verbs that can be simulated over the socket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    /// HTTP GET method.
    Get,
    /// HTTP POST method.
    Post,
    /// HTTP PUT method.
    Put,
    /// HTTP DELETE method.
    Delete,
}

impl Method {
    /// The message channel a request with this verb is emitted on.
    ///
    /// Also used as the `method` field of the payload.
    pub fn channel(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Post => "post",
            Self::Put => "put",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
            Self::Put => write!(f, "PUT"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// One simulated HTTP call, immutable once built.
///
/// Headers are already merged across all scopes. The completion is consumed
/// when the request is emitted, so it can only ever run once.
pub struct VirtualRequest {
    tag: Option<String>,
    method: Method,
    path: String,
    params: Value,
    headers: Headers,
    completion: Completion,
}

impl VirtualRequest {
    /// Build a request.
    ///
    /// `None` or `null` params become an empty object.
    pub fn new(
        tag: Option<String>,
        method: Method,
        path: impl Into<String>,
        params: Option<Value>,
        headers: Headers,
        completion: Completion,
    ) -> Self {
        let params = match params {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(params) => params,
        };
        Self {
            tag,
            method,
            path: path.into(),
            params,
            headers,
            completion,
        }
    }

    /// Get the cancellation tag, if any.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Get the HTTP verb.
    pub fn method(&self) -> Method {
        self.method
    }

    /// Get the request path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Get the request parameters.
    pub fn params(&self) -> &Value {
        &self.params
    }

    /// Get the effective headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The message body sent to the server.
    ///
    /// ```
    /// use sockreq::{Method, VirtualRequest};
    /// use sockreq::headers::Headers;
    /// use serde_json::json;
    ///
    /// let request = VirtualRequest::new(None, Method::Get, "/hello", None, Headers::new(), Box::new(|_| {}));
    /// assert_eq!(
    ///     request.payload(),
    ///     json!({"method": "get", "url": "/hello", "params": {}, "headers": {}})
    /// );
    /// ```
    pub fn payload(&self) -> Value {
        json!({
            "method": self.method.channel(),
            "url": self.path,
            "params": self.params,
            "headers": self.headers,
        })
    }

    /// Split into the channel name, payload, and completion for emission.
    pub(crate) fn into_emission(self) -> (&'static str, Value, Completion) {
        let payload = self.payload();
        (self.method.channel(), payload, self.completion)
    }
}

impl std::fmt::Debug for VirtualRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualRequest")
            .field("tag", &self.tag)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("params", &self.params)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}
