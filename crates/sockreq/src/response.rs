//! Typed wrapper around acknowledgment replies.

use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Result, SocketError};
use crate::headers::Headers;

/// The body of a virtual response.
///
/// Servers answer with either a plain string or any other JSON value.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseBody {
    /// A string body, kept verbatim.
    Text(String),
    /// Any non-string JSON body, including `null`.
    Json(Value),
}

impl fmt::Display for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Json(value) => write!(f, "{value}"),
        }
    }
}

/// An immutable, parsed reply to a virtual request.
///
/// Built from an acknowledgment carrying `statusCode`, `headers`, and `body`.
/// The raw acknowledgment is kept as [`raw_response`](Self::raw_response).
#[derive(Clone, Debug, PartialEq)]
pub struct ResponseEnvelope {
    status_code: u16,
    headers: Headers,
    body: ResponseBody,
    raw_response: Value,
}

impl ResponseEnvelope {
    /// Parse an acknowledgment payload.
    ///
    /// Fails with [`SocketError::MalformedResponse`] when the reply is not an
    /// object, or when `statusCode`, `headers`, or `body` is missing or has
    /// the wrong shape. A `body` that is present but `null` is accepted.
    pub fn from_reply(reply: Value) -> Result<Self> {
        let object = reply
            .as_object()
            .ok_or_else(|| malformed("reply is not a JSON object"))?;

        let status_code = object
            .get("statusCode")
            .ok_or_else(|| malformed("missing statusCode"))?
            .as_u64()
            .and_then(|code| u16::try_from(code).ok())
            .ok_or_else(|| malformed("statusCode is not a valid status code"))?;

        let raw_headers = object
            .get("headers")
            .ok_or_else(|| malformed("missing headers"))?
            .as_object()
            .ok_or_else(|| malformed("headers is not an object"))?;

        let mut headers = Headers::with_capacity(raw_headers.len());
        for (name, value) in raw_headers {
            let value = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null => continue,
                _ => return Err(malformed(&format!("header {name} is not a scalar"))),
            };
            headers.insert(name.clone(), value);
        }

        let body = match object.get("body") {
            Some(Value::String(text)) => ResponseBody::Text(text.clone()),
            Some(other) => ResponseBody::Json(other.clone()),
            None => return Err(malformed("missing body")),
        };

        Ok(Self {
            status_code,
            headers,
            body,
            raw_response: reply,
        })
    }

    /// Get the status code.
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// `true` when the status code is below 200 or at least 400.
    pub fn is_error(&self) -> bool {
        self.status_code < 200 || self.status_code >= 400
    }

    /// Check if the response indicates success (2xx status).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Get the response headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Get a header value, matching the name case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Get the response body.
    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    /// Get the body when the server sent a string.
    pub fn body_text(&self) -> Option<&str> {
        match &self.body {
            ResponseBody::Text(text) => Some(text),
            ResponseBody::Json(_) => None,
        }
    }

    /// Deserialize the body.
    ///
    /// JSON bodies are converted directly; string bodies are parsed as JSON text.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        match &self.body {
            ResponseBody::Json(value) => Ok(serde_json::from_value(value.clone())?),
            ResponseBody::Text(text) => Ok(serde_json::from_str(text)?),
        }
    }

    /// Get the acknowledgment exactly as it was received.
    pub fn raw_response(&self) -> &Value {
        &self.raw_response
    }
}

impl fmt::Display for ResponseEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} headers): {}",
            self.status_code,
            self.headers.len(),
            self.body
        )
    }
}

fn malformed(reason: &str) -> SocketError {
    SocketError::MalformedResponse(reason.to_string())
}
