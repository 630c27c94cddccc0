//! Virtual HTTP requests over a persistent socket.
//!
//! This crate lets an application issue request/response calls (GET, POST,
//! PUT, DELETE) to a server over one long-lived message socket instead of
//! individual HTTP connections:
//!
//! - **Offline queueing**: requests issued while disconnected are held and
//!   replayed, in order, once the socket connects or reconnects
//! - **Header scopes**: global, per-connection, and per-request headers are
//!   merged on every request, and a per-request `None` removes a header
//! - **Acknowledgment correlation**: each request's reply is parsed into a
//!   [`ResponseEnvelope`] and handed to that request's completion only
//!
//! # Usage
//!
//! ```
//! use sockreq::SocketConnection;
//! use sockreq::transport::LoopbackFactory;
//!
//! let factory = LoopbackFactory::new().manual_connect();
//! let socket = SocketConnection::new("http://localhost:1337", &factory).unwrap();
//!
//! socket.get(Some("startup"), "/hello", None, |result| match result {
//!     Ok(response) if !response.is_error() => println!("{}", response.body()),
//!     Ok(response) => eprintln!("server error {}", response.status_code()),
//!     Err(err) => eprintln!("{err}"),
//! });
//! assert_eq!(socket.queued_requests(), 1);
//!
//! socket.connect().unwrap();
//! factory.last().unwrap().simulate_connect();
//! assert_eq!(socket.queued_requests(), 0);
//! ```
//!
//! # Async
//!
//! Every verb has an `_async` variant returning a [`PendingResponse`] future:
//!
//! ```ignore
//! let response = socket.get_async(None, "/hello", None).await?;
//! ```
//!
//! # Transports
//!
//! The socket itself (framing, handshakes, reconnection backoff) is supplied
//! through the [`transport::Transport`] trait. [`transport::LoopbackTransport`]
//! keeps everything in memory for tests.
//!
//! # Logging
//!
//! Instrumented with `tracing`; see [`sockreq_core::logging::targets`] for
//! the target names.

pub mod connection;
mod error;
pub mod headers;
pub mod options;
pub mod queue;
pub mod registry;
pub mod request;
pub mod response;
pub mod transport;

pub use error::{Result, SocketError};

// Re-export commonly used types at the crate root
pub use connection::{ConnectionState, PendingResponse, SocketConnection};
pub use options::{SDK_VERSION_KEY, SDK_VERSION_VALUE, TransportOptions};
pub use queue::RequestQueue;
pub use registry::ConnectionRegistry;
pub use request::{Completion, Method, VirtualRequest};
pub use response::{ResponseBody, ResponseEnvelope};
