//! Named event emitter built on [`Signal`].
//!
//! Transports publish lifecycle notifications (`connect`, `disconnect`, ...)
//! and server-pushed custom events through an [`EventEmitter`]. Every event
//! carries a JSON payload; lifecycle events without data use
//! `serde_json::Value::Null`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::logging::targets;
use crate::signal::{ListenerId, Signal};

/// A shared event handler.
pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

/// A set of named signals carrying JSON payloads.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use sockreq_core::EventEmitter;
/// use serde_json::{Value, json};
///
/// let emitter = EventEmitter::new();
/// let id = emitter.on("user", Arc::new(|payload: &Value| println!("user event: {payload}")));
///
/// assert_eq!(emitter.emit("user", &json!({"id": 1})), 1);
/// assert!(emitter.off("user", id));
/// ```
#[derive(Default)]
pub struct EventEmitter {
    events: Mutex<HashMap<String, Arc<Signal<Value>>>>,
}

impl EventEmitter {
    /// Create an emitter with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    fn signal(&self, event: &str) -> Arc<Signal<Value>> {
        self.events
            .lock()
            .entry(event.to_string())
            .or_default()
            .clone()
    }

    /// Register a listener for every occurrence of `event`.
    pub fn on(&self, event: &str, listener: Listener) -> ListenerId {
        self.signal(event).connect(listener, false)
    }

    /// Register a listener for the next occurrence of `event` only.
    pub fn once(&self, event: &str, listener: Listener) -> ListenerId {
        self.signal(event).connect(listener, true)
    }

    /// Remove a listener previously registered for `event`.
    ///
    /// Returns `true` if the listener was registered.
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        let signal = self.events.lock().get(event).cloned();
        signal.is_some_and(|signal| signal.disconnect(id))
    }

    /// Deliver `payload` to every listener of `event`.
    ///
    /// Returns the number of listeners invoked.
    pub fn emit(&self, event: &str, payload: &Value) -> usize {
        // Clone the signal out so listeners can re-enter the emitter.
        let signal = self.events.lock().get(event).cloned();
        match signal {
            Some(signal) => signal.emit(payload.clone()),
            None => {
                tracing::trace!(target: targets::EMITTER, event, "no listeners for event");
                0
            }
        }
    }

    /// Number of listeners currently registered for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.events
            .lock()
            .get(event)
            .map_or(0, |signal| signal.connection_count())
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let events: Vec<String> = self.events.lock().keys().cloned().collect();
        f.debug_struct("EventEmitter").field("events", &events).finish()
    }
}
