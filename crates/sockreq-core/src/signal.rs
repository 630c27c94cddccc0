//! Signal/slot primitive used for transport and connection events.
//!
//! A [`Signal<Args>`] holds any number of connected slots (closures). Emitting
//! the signal invokes every slot with a reference to the arguments. Slots are
//! identified by a [`ListenerId`] so they can be disconnected later.
//!
//! Slots are always invoked directly on the emitting thread. The slot table is
//! snapshotted before invocation, so a slot may freely connect or disconnect
//! other slots (or itself) on the same signal without deadlocking.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use sockreq_core::Signal;
//!
//! let text_changed = Signal::<String>::new();
//!
//! let id = text_changed.connect(Arc::new(|text: &String| {
//!     println!("Text changed to: {}", text);
//! }), false);
//!
//! text_changed.emit("Hello, World!".to_string());
//! text_changed.disconnect(id);
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use crate::logging::targets;

new_key_type! {
    /// A unique identifier for a connected slot.
    ///
    /// Returned by [`Signal::connect`]; pass it to [`Signal::disconnect`] to
    /// remove the slot. The ID stays valid until the slot is disconnected,
    /// fires as a one-shot, or the signal is dropped.
    pub struct ListenerId;
}

/// Internal storage for a single slot.
struct Slot<Args> {
    callback: Arc<dyn Fn(&Args) + Send + Sync>,
    /// Removed from the table the first time it is invoked.
    once: bool,
}

/// A type-safe signal that can have multiple connected slots.
///
/// `Signal<Args>` is `Send + Sync` whenever `Args` is, and may be shared
/// between threads behind an `Arc`.
pub struct Signal<Args> {
    slots: Mutex<SlotMap<ListenerId, Slot<Args>>>,
}

impl<Args> Default for Signal<Args> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args> Signal<Args> {
    /// Create a new signal with no connections.
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(SlotMap::with_key()),
        }
    }

    /// Connect a slot.
    ///
    /// A `once` slot is removed the first time it fires.
    pub fn connect(&self, slot: Arc<dyn Fn(&Args) + Send + Sync>, once: bool) -> ListenerId {
        self.slots.lock().insert(Slot {
            callback: slot,
            once,
        })
    }

    /// Disconnect a specific slot by its ID.
    ///
    /// Returns `true` if the slot was found and removed.
    pub fn disconnect(&self, id: ListenerId) -> bool {
        self.slots.lock().remove(id).is_some()
    }

    /// Get the number of connected slots.
    pub fn connection_count(&self) -> usize {
        self.slots.lock().len()
    }

    /// Emit the signal, invoking all connected slots.
    ///
    /// Returns the number of slots invoked.
    pub fn emit(&self, args: Args) -> usize {
        // Snapshot under the lock, invoke outside it.
        let callbacks: Vec<_> = {
            let mut slots = self.slots.lock();
            let fired_once: Vec<ListenerId> = slots
                .iter()
                .filter(|(_, slot)| slot.once)
                .map(|(id, _)| id)
                .collect();
            let callbacks = slots.values().map(|slot| slot.callback.clone()).collect();
            for id in fired_once {
                slots.remove(id);
            }
            callbacks
        };

        tracing::trace!(target: targets::SIGNAL, connection_count = callbacks.len(), "emitting signal");

        for callback in &callbacks {
            callback(&args);
        }
        callbacks.len()
    }
}

impl<Args> std::fmt::Debug for Signal<Args> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("connections", &self.connection_count())
            .finish()
    }
}
