//! Core event plumbing for sockreq.
//!
//! This crate provides the pieces shared by transports and the
//! virtual-request client:
//!
//! - **Signals**: [`Signal<Args>`] with [`ListenerId`]-based disconnection
//! - **Event emitter**: [`EventEmitter`], a set of named signals carrying
//!   JSON payloads, with `on` / `once` / `off` semantics
//! - **Logging**: tracing target names in [`logging::targets`]
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use sockreq_core::EventEmitter;
//! use serde_json::Value;
//!
//! let emitter = EventEmitter::new();
//! emitter.once("connect", Arc::new(|_: &Value| println!("connected")));
//! emitter.emit("connect", &Value::Null);
//! ```

pub mod emitter;
pub mod logging;
pub mod signal;

pub use emitter::{EventEmitter, Listener};
pub use signal::{ListenerId, Signal};
